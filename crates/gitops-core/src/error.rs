//! Error types for gitops-core

use std::time::Duration;

use crate::model::{FabricId, RepositoryId};

/// Result type for gitops-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gitops-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Repository {0} not found")]
    RepositoryNotFound(RepositoryId),

    #[error("Fabric {0} not found")]
    FabricNotFound(FabricId),

    /// The fabric has no repository to provision against
    #[error("Fabric {fabric} has no Git repository assigned")]
    FabricUnassigned { fabric: FabricId },

    /// Deleting a repository that fabrics still reference
    #[error("Repository {id} is still referenced by {fabric_count} fabric(s)")]
    RepositoryInUse { id: RepositoryId, fabric_count: usize },

    #[error("Failed to encrypt credentials: {0}")]
    Encryption(String),

    /// Stored credentials could not be decrypted or parsed
    #[error("Failed to decrypt credentials: {0}")]
    Decryption(String),

    #[error("Master key unavailable: {0}")]
    MasterKey(String),

    #[error("Invalid GitOps directory '{directory}': {reason}")]
    InvalidDirectory { directory: String, reason: String },

    #[error("Operation '{operation}' timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The caller's deadline passed before or during the operation
    #[error("Operation '{operation}' was cancelled")]
    Cancelled { operation: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    State(String),

    /// A blocking worker panicked or was aborted
    #[error("Background task failed: {0}")]
    Task(String),

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from gitops-fs
    #[error(transparent)]
    Fs(#[from] gitops_fs::Error),

    /// Git error from gitops-git
    #[error(transparent)]
    Git(#[from] gitops_git::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether the error is the result of a timeout or cancellation.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::Cancelled { .. } => true,
            Error::Git(inner) => inner.is_deadline(),
            _ => false,
        }
    }
}
