//! Git hosting providers
//!
//! The provider is derived from the repository URL by [`detect_provider`];
//! [`provider_client`] then picks the matching implementation of
//! [`GitProviderClient`]. The set of providers is closed.

use std::sync::Arc;

use crate::{Deadline, GitAuth, GitTransport, RemoteListing, Result, redact_url};

/// Known Git hosting providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Github,
    Gitlab,
    Bitbucket,
    Generic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Github => "github",
            ProviderKind::Gitlab => "gitlab",
            ProviderKind::Bitbucket => "bitbucket",
            ProviderKind::Generic => "generic",
        }
    }

    /// Username a bare token is paired with in an HTTP(S) URL.
    pub fn token_username(&self) -> &'static str {
        match self {
            ProviderKind::Github => "x-access-token",
            ProviderKind::Gitlab => "oauth2",
            ProviderKind::Bitbucket => "x-token-auth",
            ProviderKind::Generic => "git",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the host from an HTTP(S), SSH or scp-style URL.
fn host_of(url: &str) -> Option<String> {
    if let Ok(parsed) = url::Url::parse(url) {
        return parsed.host_str().map(str::to_lowercase);
    }
    // scp-style: [user@]host:path
    let (before_colon, _) = url.split_once(':')?;
    let host = before_colon.rsplit('@').next()?;
    (!host.is_empty() && !host.contains('/')).then(|| host.to_lowercase())
}

/// Determine the provider from a repository URL.
pub fn detect_provider(url: &str) -> ProviderKind {
    match host_of(url) {
        Some(host) if host.contains("github") => ProviderKind::Github,
        Some(host) if host.contains("gitlab") => ProviderKind::Gitlab,
        Some(host) if host.contains("bitbucket") => ProviderKind::Bitbucket,
        _ => ProviderKind::Generic,
    }
}

/// Split `owner/name` out of a repository URL path.
fn owner_and_name(url: &str) -> (Option<String>, Option<String>) {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split_once(':').map(|(_, p)| p.to_string()).unwrap_or_default(),
    };
    let trimmed = path.trim_matches('/').trim_end_matches(".git");
    match trimmed.rsplit_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
            (Some(owner.to_string()), Some(name.to_string()))
        }
        _ => (None, (!trimmed.is_empty()).then(|| trimmed.to_string())),
    }
}

/// Repository facts gathered from the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub provider: ProviderKind,
    pub owner: Option<String>,
    pub name: Option<String>,
    pub web_url: Option<String>,
    pub default_branch: Option<String>,
    pub branches: Vec<String>,
    pub is_empty: bool,
}

/// Operations every provider supports.
pub trait GitProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Username paired with a bare token when embedding it in a URL.
    fn token_username(&self) -> &'static str;

    /// Browser URL of the repository, if the provider has one.
    fn web_url(&self, url: &str) -> Option<String>;

    fn transport(&self) -> &dyn GitTransport;

    /// Check that `auth` is accepted by the remote.
    fn validate_credentials(&self, url: &str, auth: &GitAuth, deadline: Deadline) -> Result<RemoteListing> {
        self.transport().list_remote(url, auth, deadline)
    }

    fn list_branches(&self, url: &str, auth: &GitAuth, deadline: Deadline) -> Result<Vec<String>> {
        Ok(self.transport().list_remote(url, auth, deadline)?.branches)
    }

    fn repository_info(&self, url: &str, auth: &GitAuth, deadline: Deadline) -> Result<RepositoryInfo> {
        let listing = self.transport().list_remote(url, auth, deadline)?;
        let (owner, name) = owner_and_name(url);
        Ok(RepositoryInfo {
            provider: self.kind(),
            owner,
            name,
            web_url: self.web_url(url),
            default_branch: listing.head_branch.clone(),
            is_empty: listing.is_empty(),
            branches: listing.branches,
        })
    }
}

fn hosted_web_url(host: &str, url: &str) -> Option<String> {
    match owner_and_name(url) {
        (Some(owner), Some(name)) => Some(format!("https://{host}/{owner}/{name}")),
        _ => None,
    }
}

pub struct GithubProvider {
    transport: Arc<dyn GitTransport>,
}

impl GitProviderClient for GithubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Github
    }

    fn token_username(&self) -> &'static str {
        ProviderKind::Github.token_username()
    }

    fn web_url(&self, url: &str) -> Option<String> {
        hosted_web_url(&host_of(url)?, url)
    }

    fn transport(&self) -> &dyn GitTransport {
        self.transport.as_ref()
    }
}

pub struct GitlabProvider {
    transport: Arc<dyn GitTransport>,
}

impl GitProviderClient for GitlabProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gitlab
    }

    fn token_username(&self) -> &'static str {
        ProviderKind::Gitlab.token_username()
    }

    fn web_url(&self, url: &str) -> Option<String> {
        hosted_web_url(&host_of(url)?, url)
    }

    fn transport(&self) -> &dyn GitTransport {
        self.transport.as_ref()
    }
}

pub struct BitbucketProvider {
    transport: Arc<dyn GitTransport>,
}

impl GitProviderClient for BitbucketProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bitbucket
    }

    fn token_username(&self) -> &'static str {
        ProviderKind::Bitbucket.token_username()
    }

    fn web_url(&self, url: &str) -> Option<String> {
        hosted_web_url(&host_of(url)?, url)
    }

    fn transport(&self) -> &dyn GitTransport {
        self.transport.as_ref()
    }
}

pub struct GenericProvider {
    transport: Arc<dyn GitTransport>,
}

impl GitProviderClient for GenericProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Generic
    }

    fn token_username(&self) -> &'static str {
        ProviderKind::Generic.token_username()
    }

    fn web_url(&self, url: &str) -> Option<String> {
        url.starts_with("http").then(|| redact_url(url).trim_end_matches(".git").to_string())
    }

    fn transport(&self) -> &dyn GitTransport {
        self.transport.as_ref()
    }
}

/// Select the client for `kind`.
pub fn provider_client(kind: ProviderKind, transport: Arc<dyn GitTransport>) -> Box<dyn GitProviderClient> {
    match kind {
        ProviderKind::Github => Box::new(GithubProvider { transport }),
        ProviderKind::Gitlab => Box::new(GitlabProvider { transport }),
        ProviderKind::Bitbucket => Box::new(BitbucketProvider { transport }),
        ProviderKind::Generic => Box::new(GenericProvider { transport }),
    }
}
