//! Authentication shapes for Git remotes
//!
//! Three shapes are supported: a token embedded in an HTTPS URL, basic
//! credentials embedded in an HTTPS URL, and an SSH private key written to a
//! short-lived key file.

use crate::Result;
use git2::{Cred, CredentialType, RemoteCallbacks};
use std::io::Write;
use tempfile::NamedTempFile;
use url::Url;

/// Credentials for a single Git operation.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum GitAuth {
    #[default]
    Anonymous,
    Token {
        username: String,
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
    SshKey {
        private_key: String,
        passphrase: Option<String>,
    },
}

impl GitAuth {
    pub fn kind(&self) -> &'static str {
        match self {
            GitAuth::Anonymous => "anonymous",
            GitAuth::Token { .. } => "token",
            GitAuth::Basic { .. } => "basic",
            GitAuth::SshKey { .. } => "ssh_key",
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, GitAuth::Anonymous)
    }
}

impl std::fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitAuth::Anonymous => write!(f, "GitAuth::Anonymous"),
            GitAuth::Token { username, token } => {
                write!(f, "GitAuth::Token({username}, <{} chars>)", token.len())
            }
            GitAuth::Basic { username, password } => {
                write!(f, "GitAuth::Basic({username}, <{} chars>)", password.len())
            }
            GitAuth::SshKey { private_key, .. } => {
                write!(f, "GitAuth::SshKey(<{} chars>)", private_key.len())
            }
        }
    }
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Embed token or basic credentials into an HTTP(S) URL.
///
/// SSH, file and scp-style URLs are returned unchanged; their credentials
/// travel through the `git2` credential callback instead.
pub fn authenticated_url(url: &str, auth: &GitAuth) -> String {
    let (username, secret) = match auth {
        GitAuth::Token { username, token } => (username, token),
        GitAuth::Basic { username, password } => (username, password),
        GitAuth::Anonymous | GitAuth::SshKey { .. } => return url.to_string(),
    };

    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if !is_http(&parsed) {
        return url.to_string();
    }
    if parsed.set_username(username).is_err() || parsed.set_password(Some(secret)).is_err() {
        return url.to_string();
    }
    parsed.to_string()
}

/// Mask any userinfo in a URL so it can be logged.
pub fn redact_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.username().is_empty() && parsed.password().is_none() {
        return url.to_string();
    }
    if parsed.set_password(None).is_err() || parsed.set_username("***").is_err() {
        return "<redacted>".to_string();
    }
    parsed.to_string()
}

/// An SSH private key materialized for the duration of one operation.
///
/// The file is created with owner-only permissions and removed on drop.
pub struct SshKeyFile {
    file: NamedTempFile,
}

impl SshKeyFile {
    pub fn write(private_key: &str) -> Result<Self> {
        let mut file = NamedTempFile::new()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(private_key.as_bytes())?;
        if !private_key.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }
}

/// Install a credential callback for `auth` on `callbacks`.
///
/// libgit2 re-invokes the callback after a rejected credential; the second
/// invocation fails so bad credentials are reported once instead of looping.
pub fn install_credentials<'a>(
    callbacks: &mut RemoteCallbacks<'a>,
    auth: &'a GitAuth,
    key_file: Option<&'a SshKeyFile>,
) {
    let mut attempts = 0u32;
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > 1 {
            return Err(git2::Error::from_str(
                "authentication failed: remote rejected the supplied credentials",
            ));
        }
        match auth {
            GitAuth::Token { username, token } => Cred::userpass_plaintext(username, token),
            GitAuth::Basic { username, password } => Cred::userpass_plaintext(username, password),
            GitAuth::SshKey { passphrase, .. } => {
                let Some(key_file) = key_file else {
                    return Err(git2::Error::from_str("ssh key file was not prepared"));
                };
                Cred::ssh_key(
                    username_from_url.unwrap_or("git"),
                    None,
                    key_file.path(),
                    passphrase.as_deref(),
                )
            }
            GitAuth::Anonymous => {
                if allowed.contains(CredentialType::DEFAULT) {
                    Cred::default()
                } else {
                    Err(git2::Error::from_str(
                        "authentication required but no credentials are configured",
                    ))
                }
            }
        }
    });
}
