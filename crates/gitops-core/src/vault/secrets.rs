//! Plaintext secret maps
//!
//! A [`SecretMap`] only exists in memory between decryption and use. Its
//! `Debug` output shows key names and value lengths, never values, and the
//! values are zeroized on drop.

use std::collections::BTreeMap;
use std::fmt;

use gitops_git::GitAuth;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::model::AuthType;
use crate::{Error, Result};

/// Key names used by each [`AuthType`].
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const PRIVATE_KEY: &str = "private_key";
    pub const PASSPHRASE: &str = "passphrase";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
}

/// Decrypted credential fields.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretMap(BTreeMap<String, String>);

impl SecretMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Non-empty value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Canonical encoding: JSON with keys in sorted order.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Encryption(format!("secret map serialization failed: {e}")))
    }

    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Decryption(format!("decrypted credentials are not a secret map: {e}")))
    }

    /// Build the transport credentials for `auth_type`.
    ///
    /// `token_username` pairs with a bare token when the map carries no
    /// `username`. Missing required fields yield [`GitAuth::Anonymous`].
    pub fn to_git_auth(&self, auth_type: AuthType, token_username: &str) -> GitAuth {
        let username = || {
            self.get(keys::USERNAME)
                .unwrap_or(token_username)
                .to_string()
        };
        match auth_type {
            AuthType::Token => match self.get(keys::TOKEN) {
                Some(token) => GitAuth::Token {
                    username: username(),
                    token: token.to_string(),
                },
                None => GitAuth::Anonymous,
            },
            AuthType::Oauth => match self.get(keys::ACCESS_TOKEN).or_else(|| self.get(keys::TOKEN)) {
                Some(token) => GitAuth::Token {
                    username: username(),
                    token: token.to_string(),
                },
                None => GitAuth::Anonymous,
            },
            AuthType::Basic => match (self.get(keys::USERNAME), self.get(keys::PASSWORD)) {
                (Some(username), Some(password)) => GitAuth::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                },
                _ => GitAuth::Anonymous,
            },
            AuthType::SshKey => match self.get(keys::PRIVATE_KEY) {
                Some(private_key) => GitAuth::SshKey {
                    private_key: private_key.to_string(),
                    passphrase: self.get(keys::PASSPHRASE).map(str::to_string),
                },
                None => GitAuth::Anonymous,
            },
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SecretMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Debug for SecretMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretMap({} keys", self.0.len())?;
        for (key, value) in &self.0 {
            write!(f, ", {key}=<{} chars>", value.chars().count())?;
        }
        f.write_str(")")
    }
}

impl Drop for SecretMap {
    fn drop(&mut self) {
        for value in self.0.values_mut() {
            value.zeroize();
        }
    }
}
