//! Error types for gitops-git

/// Result type for gitops-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gitops-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Filesystem error: {0}")]
    Fs(#[from] gitops_fs::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote '{name}' not found")]
    RemoteNotFound { name: String },

    #[error("Branch '{name}' not found")]
    BranchNotFound { name: String },

    #[error("Clone of {url} failed: {message}")]
    CloneFailed { url: String, message: String },

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Operation '{operation}' cancelled: deadline exceeded")]
    DeadlineExceeded { operation: String },

    #[error("Invalid repository URL: {url}")]
    InvalidUrl { url: String },
}

impl Error {
    /// Whether the error came from an expired [`crate::Deadline`].
    pub fn is_deadline(&self) -> bool {
        matches!(self, Error::DeadlineExceeded { .. })
    }
}
