//! Records the subsystem operates on
//!
//! [`Repository`] and [`Fabric`] are plain records owned by a
//! [`RecordStore`](crate::store::RecordStore). Snapshots and discovered
//! resources are immutable values produced by probes and discovery.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gitops_git::ProviderKind;

/// Identity of a [`Repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(pub u64);

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a [`Fabric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FabricId(pub u64);

impl fmt::Display for FabricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declares a `snake_case` string enum with `as_str`, `Display` and `FromStr`.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {}: '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

string_enum!(
    /// Hosting provider of a repository.
    GitProvider {
        Github => "github",
        Gitlab => "gitlab",
        Bitbucket => "bitbucket",
        Generic => "generic",
    }
);

impl From<ProviderKind> for GitProvider {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Github => GitProvider::Github,
            ProviderKind::Gitlab => GitProvider::Gitlab,
            ProviderKind::Bitbucket => GitProvider::Bitbucket,
            ProviderKind::Generic => GitProvider::Generic,
        }
    }
}

impl From<GitProvider> for ProviderKind {
    fn from(provider: GitProvider) -> Self {
        match provider {
            GitProvider::Github => ProviderKind::Github,
            GitProvider::Gitlab => ProviderKind::Gitlab,
            GitProvider::Bitbucket => ProviderKind::Bitbucket,
            GitProvider::Generic => ProviderKind::Generic,
        }
    }
}

string_enum!(
    /// Shape of the stored secret.
    AuthType {
        Token => "token",
        Basic => "basic",
        SshKey => "ssh_key",
        Oauth => "oauth",
    }
);

string_enum!(
    /// Result of the most recent connectivity check.
    ConnectionStatus {
        Pending => "pending",
        Testing => "testing",
        Connected => "connected",
        Failed => "failed",
    }
);

string_enum!(
    GitOpsTool {
        Manual => "manual",
        Argocd => "argocd",
        Flux => "flux",
    }
);

string_enum!(
    /// Whether the fabric's directory layout has been materialized.
    DirectoryStatus {
        Uninitialized => "uninitialized",
        Initialized => "initialized",
        Error => "error",
    }
);

string_enum!(
    FabricStatus {
        Planned => "planned",
        Active => "active",
        Decommissioned => "decommissioned",
    }
);

/// Health verdict, ordered from best to worst.
///
/// The derived `Ord` is the aggregation order: the worst of a set of checks is
/// its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Critical => "critical",
        }
    }

    /// Healthy and degraded repositories are still usable.
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rotation bookkeeping stored next to the encrypted secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialMeta {
    pub created_at: Option<DateTime<Utc>>,
    pub last_rotated: Option<DateTime<Utc>>,
    pub rotation_count: u32,
}

impl CredentialMeta {
    /// Timestamp credential age is measured from.
    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.last_rotated.or(self.created_at)
    }
}

/// A remote Git endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub name: String,
    pub url: String,
    pub provider: GitProvider,
    pub auth_type: AuthType,
    /// Base64 of `nonce || ciphertext`, never plaintext
    #[serde(default)]
    pub encrypted_credentials: Option<String>,
    #[serde(default)]
    pub credential_meta: CredentialMeta,
    pub connection_status: ConnectionStatus,
    #[serde(default)]
    pub last_validated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validation_error: Option<String>,
    pub default_branch: String,
    pub is_private: bool,
    /// Recomputed by the store from fabric references
    #[serde(default)]
    pub fabric_count: u32,
    /// Overrides the configured network timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Repository {
    /// A new, untested repository. The provider is detected from `url`.
    pub fn new(id: RepositoryId, name: impl Into<String>, url: impl Into<String>, auth_type: AuthType) -> Self {
        let url = url.into();
        Self {
            id,
            name: name.into(),
            provider: gitops_git::detect_provider(&url).into(),
            url,
            auth_type,
            encrypted_credentials: None,
            credential_meta: CredentialMeta::default(),
            connection_status: ConnectionStatus::Pending,
            last_validated: None,
            validation_error: None,
            default_branch: "main".to_string(),
            is_private: true,
            fabric_count: 0,
            timeout_secs: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_privacy(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.encrypted_credentials.is_some()
    }

    /// Network timeout for this repository, falling back to `default`.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }
}

/// A deployment target bound to a repository subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fabric {
    pub id: FabricId,
    pub name: String,
    pub status: FabricStatus,
    #[serde(default)]
    pub repository: Option<RepositoryId>,
    #[serde(default)]
    pub gitops_directory: String,
    pub gitops_tool: GitOpsTool,
    pub sync_enabled: bool,
    pub sync_interval_secs: u64,
    pub directory_status: DirectoryStatus,
}

impl Fabric {
    pub fn new(id: FabricId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: FabricStatus::Planned,
            repository: None,
            gitops_directory: "/".to_string(),
            gitops_tool: GitOpsTool::Manual,
            sync_enabled: false,
            sync_interval_secs: 300,
            directory_status: DirectoryStatus::Uninitialized,
        }
    }

    /// Attach the fabric to `repository` at `directory`.
    pub fn with_repository(mut self, repository: RepositoryId, directory: impl Into<String>) -> Self {
        self.repository = Some(repository);
        self.gitops_directory = directory.into();
        self
    }

    pub fn with_tool(mut self, tool: GitOpsTool) -> Self {
        self.gitops_tool = tool;
        self
    }
}

/// Immutable result of one health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    status: HealthStatus,
    message: String,
    details: serde_json::Value,
    duration: Duration,
    timestamp: DateTime<Utc>,
}

impl HealthSnapshot {
    pub(crate) fn new(
        status: HealthStatus,
        message: impl Into<String>,
        details: serde_json::Value,
        duration: Duration,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            details,
            duration,
            timestamp: Utc::now(),
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &serde_json::Value {
        &self.details
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// One custom resource document found in a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredResource {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub spec: serde_json::Value,
    pub status: serde_json::Value,
}

impl DiscoveredResource {
    /// Read a resource out of a parsed YAML document.
    ///
    /// Returns `None` unless the document has both `kind` and `metadata.name`.
    pub fn from_yaml(doc: &serde_yaml::Value) -> Option<Self> {
        let kind = doc.get("kind")?.as_str()?.to_string();
        let metadata = doc.get("metadata")?;
        let name = metadata.get("name")?.as_str()?.to_string();
        let namespace = metadata
            .get("namespace")
            .and_then(|ns| ns.as_str())
            .map(str::to_string);
        let to_json = |key: &str| {
            doc.get(key)
                .and_then(|value| serde_json::to_value(value).ok())
                .unwrap_or(serde_json::Value::Null)
        };
        Some(Self {
            kind,
            namespace,
            name,
            spec: to_json("spec"),
            status: to_json("status"),
        })
    }
}

/// Parse every non-empty document of a multi-document YAML stream.
pub fn parse_documents(content: &str) -> Result<Vec<serde_yaml::Value>, serde_yaml::Error> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}
