//! Credential encryption
//!
//! Secrets are sealed with AES-256-GCM under a key derived from the process
//! master secret. The stored form is base64 of `nonce || ciphertext`.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Size of the derived key in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

const DERIVATION_CONTEXT: &[u8] = b"fabric-gitops/credentials/v1\0";

/// Process-wide credential key. Read-only after startup.
pub struct MasterKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl MasterKey {
    /// Derive the key from a master secret.
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(Error::MasterKey("master secret is empty".into()));
        }
        let mut hasher = Sha256::new();
        hasher.update(DERIVATION_CONTEXT);
        hasher.update(secret.as_bytes());
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&hasher.finalize());
        Ok(Self { key })
    }

    /// Derive the key from the secret held in environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self> {
        let secret = Zeroizing::new(
            std::env::var(var).map_err(|_| Error::MasterKey(format!("environment variable {var} is not set")))?,
        );
        Self::from_secret(&secret)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()))
    }

    /// Seal `plaintext`, returning the storable encoding.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| Error::Encryption(format!("credential encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Open a value produced by [`MasterKey::encrypt`].
    ///
    /// Corrupt encodings, tampering and key mismatch all fail with
    /// [`Error::Decryption`].
    pub fn decrypt(&self, encoded: &str) -> Result<Zeroizing<Vec<u8>>> {
        let sealed = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Decryption(format!("stored credentials are not valid base64: {e}")))?;
        if sealed.len() <= NONCE_SIZE {
            return Err(Error::Decryption("stored credentials are truncated".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Error::Decryption(format!("credential decryption failed: {e}")))?;
        Ok(Zeroizing::new(plaintext))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn wrong_key_fails_decryption() {
        let sealed = MasterKey::from_secret("first").unwrap().encrypt(b"token").unwrap();
        let err = MasterKey::from_secret("second").unwrap().decrypt(&sealed).unwrap_err();
        assert!(matches!(err, Error::Decryption(_)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = MasterKey::from_secret("master").unwrap();
        let sealed = key.encrypt(b"secret").unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        assert!(matches!(
            key.decrypt(&STANDARD.encode(raw)),
            Err(Error::Decryption(_))
        ));
        assert!(matches!(key.decrypt("not base64!"), Err(Error::Decryption(_))));
        assert!(matches!(key.decrypt("AAAA"), Err(Error::Decryption(_))));
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let key = MasterKey::from_secret("master").unwrap();
        assert_ne!(key.encrypt(b"same").unwrap(), key.encrypt(b"same").unwrap());
    }

    #[test]
    fn empty_secret_is_rejected_and_debug_is_redacted() {
        assert!(matches!(MasterKey::from_secret("  "), Err(Error::MasterKey(_))));
        let key = MasterKey::from_secret("hunter2").unwrap();
        assert_eq!(format!("{key:?}"), "MasterKey(<redacted>)");
    }

    proptest! {
        #[test]
        fn decrypt_inverts_encrypt(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let key = MasterKey::from_secret("property").unwrap();
            let sealed = key.encrypt(&payload).unwrap();
            let opened = key.decrypt(&sealed).unwrap();
            prop_assert_eq!(opened.as_slice(), payload.as_slice());
        }
    }
}
