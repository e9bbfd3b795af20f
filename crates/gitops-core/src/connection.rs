//! Live connectivity checks against a repository's remote
//!
//! A connection test always talks to the remote: it lists the advertised
//! branches through the provider client. Stored credentials are never taken
//! as proof that the remote is reachable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gitops_git::{Deadline, GitAuth, GitTransport, ProviderKind, RemoteListing, provider_client};
use url::Url;

use crate::errors::classify_error;
use crate::model::{AuthType, Repository};
use crate::network::{CloneTarget, run_blocking};
use crate::vault::secrets::keys;
use crate::vault::{ConnectionTestResult, ConnectionTester, SecretMap};
use crate::Result;

/// Usernames providers accept alongside a bare token.
const TOKEN_USERNAMES: &[&str] = &["x-access-token", "oauth2", "x-token-auth", "git"];

/// One way of reaching a remote: a URL and the credentials to present.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionAttempt {
    pub url: String,
    pub auth: GitAuth,
    /// Short description for logs and fallback labels
    pub label: String,
}

/// The attempt a connection test makes first.
pub fn primary_attempt(repository: &Repository, secrets: &SecretMap) -> ConnectionAttempt {
    let kind: ProviderKind = repository.provider.into();
    ConnectionAttempt {
        url: repository.url.clone(),
        auth: secrets.to_git_auth(repository.auth_type, kind.token_username()),
        label: "primary".to_string(),
    }
}

/// Clone parameters for the primary attempt against `repository`.
pub fn clone_target(repository: &Repository, secrets: &SecretMap, depth: u32) -> CloneTarget {
    let attempt = primary_attempt(repository, secrets);
    CloneTarget {
        url: attempt.url,
        auth: attempt.auth,
        depth,
        fallback_branch: repository.default_branch.clone(),
    }
}

fn is_http(url: &str) -> bool {
    Url::parse(url).is_ok_and(|parsed| matches!(parsed.scheme(), "http" | "https"))
}

/// Toggle the `.git` suffix of a repository URL.
fn toggle_git_suffix(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    match trimmed.strip_suffix(".git") {
        Some(bare) => bare.to_string(),
        None => format!("{trimmed}.git"),
    }
}

/// Alternate URL forms tried when the primary attempt is rejected.
///
/// Token credentials over HTTP(S) without an explicit username are retried
/// with the other usernames providers pair with tokens. The URL with its
/// `.git` suffix toggled is always offered last.
pub fn fallback_attempts(repository: &Repository, secrets: &SecretMap) -> Vec<ConnectionAttempt> {
    let primary = primary_attempt(repository, secrets);
    let mut attempts = Vec::new();

    let token_auth = matches!(repository.auth_type, AuthType::Token | AuthType::Oauth);
    if token_auth && is_http(&repository.url) && secrets.get(keys::USERNAME).is_none() {
        if let GitAuth::Token { username, token } = &primary.auth {
            for candidate in TOKEN_USERNAMES.iter().filter(|u| **u != username.as_str()) {
                attempts.push(ConnectionAttempt {
                    url: repository.url.clone(),
                    auth: GitAuth::Token {
                        username: (*candidate).to_string(),
                        token: token.clone(),
                    },
                    label: format!("token username {candidate}"),
                });
            }
        }
    }

    let toggled = toggle_git_suffix(&repository.url);
    if toggled != repository.url {
        attempts.push(ConnectionAttempt {
            url: toggled,
            auth: primary.auth,
            label: "toggled .git suffix".to_string(),
        });
    }
    attempts
}

/// List the remote for `attempt`, bounded by `timeout` and `deadline`.
pub async fn list_remote(
    transport: Arc<dyn GitTransport>,
    repository: &Repository,
    attempt: ConnectionAttempt,
    timeout: Duration,
    deadline: Deadline,
) -> Result<RemoteListing> {
    let client = provider_client(repository.provider.into(), transport);
    run_blocking("list_remote", timeout, deadline, move |deadline| {
        Ok(client.validate_credentials(&attempt.url, &attempt.auth, deadline)?)
    })
    .await
}

/// Report for a successful listing.
pub fn connected_result(listing: &RemoteListing, auth: &GitAuth) -> ConnectionTestResult {
    let latency_ms = u64::try_from(listing.latency.as_millis()).unwrap_or(u64::MAX);
    let message = if listing.is_empty() {
        "Connected; the repository is empty".to_string()
    } else {
        format!("Connected; {} branch(es) advertised", listing.branches.len())
    };
    ConnectionTestResult::connected(message, !auth.is_anonymous(), listing.head_branch.clone(), latency_ms)
}

/// [`ConnectionTester`] that lists the real remote.
pub struct RemoteConnectionTester {
    transport: Arc<dyn GitTransport>,
    default_timeout: Duration,
}

impl RemoteConnectionTester {
    pub fn new(transport: Arc<dyn GitTransport>, default_timeout: Duration) -> Self {
        Self {
            transport,
            default_timeout,
        }
    }
}

#[async_trait]
impl ConnectionTester for RemoteConnectionTester {
    async fn test(&self, repository: &Repository, secrets: &SecretMap) -> ConnectionTestResult {
        let attempt = primary_attempt(repository, secrets);
        let auth = attempt.auth.clone();
        let timeout = repository.timeout(self.default_timeout);
        match list_remote(self.transport.clone(), repository, attempt, timeout, Deadline::none()).await {
            Ok(listing) => connected_result(&listing, &auth),
            Err(e) => {
                let classified = classify_error(&e);
                tracing::debug!(
                    repository_id = %repository.id,
                    code = classified.code,
                    "Connection test failed"
                );
                ConnectionTestResult::failed(&classified)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepositoryId;
    use pretty_assertions::assert_eq;

    fn repository(url: &str, auth_type: AuthType) -> Repository {
        Repository::new(RepositoryId(1), "cfg", url, auth_type)
    }

    #[test]
    fn token_fallbacks_try_other_usernames_then_suffix() {
        let repo = repository("https://github.com/o/r.git", AuthType::Token);
        let secrets = SecretMap::new().with("token", "ghp_abc");
        let labels: Vec<String> = fallback_attempts(&repo, &secrets)
            .into_iter()
            .map(|attempt| attempt.label)
            .collect();
        assert_eq!(
            labels,
            vec![
                "token username oauth2".to_string(),
                "token username x-token-auth".to_string(),
                "token username git".to_string(),
                "toggled .git suffix".to_string(),
            ]
        );
    }

    #[test]
    fn explicit_username_and_ssh_only_toggle_suffix() {
        let repo = repository("https://gitlab.com/o/r", AuthType::Token);
        let secrets = SecretMap::new().with("token", "glpat-x").with("username", "deploy");
        let attempts = fallback_attempts(&repo, &secrets);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].url, "https://gitlab.com/o/r.git");

        let ssh = repository("git@github.com:o/r.git", AuthType::SshKey);
        let attempts = fallback_attempts(&ssh, &SecretMap::new().with("private_key", "k"));
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].url, "git@github.com:o/r");
    }

    #[test]
    fn primary_attempt_uses_provider_token_username() {
        let repo = repository("https://bitbucket.org/o/r.git", AuthType::Token);
        let attempt = primary_attempt(&repo, &SecretMap::new().with("token", "t"));
        assert!(matches!(attempt.auth, GitAuth::Token { ref username, .. } if username == "x-token-auth"));
    }
}
