//! Git transport contract
//!
//! The orchestration layer only talks to remotes through [`GitTransport`], so
//! tests can substitute a fake and production uses [`crate::Git2Transport`].

use crate::{Deadline, GitAuth, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Parameters of a clone.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    /// URL as stored on the repository record (safe to log)
    pub url: String,
    /// URL with embedded credentials, used for the actual transfer
    pub authenticated_url: String,
    /// Directory to clone into; must not exist or be empty
    pub target_dir: PathBuf,
    /// Branch to check out, remote HEAD when `None`
    pub branch: Option<String>,
    /// History depth, `0` for full history
    pub depth: u32,
}

/// Result of a successful clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOutcome {
    /// Commit checked out, `None` for an empty remote
    pub commit_sha: Option<String>,
    /// Branch checked out
    pub branch: Option<String>,
}

/// Result of a commit-and-push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// Commit created, `None` when the tree had no changes
    pub commit_sha: Option<String>,
    /// Whether anything was pushed upstream
    pub pushed: bool,
}

/// What a remote advertises, as seen by `git ls-remote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteListing {
    /// Branch the remote HEAD points at
    pub head_branch: Option<String>,
    /// Branch names (without `refs/heads/`)
    pub branches: Vec<String>,
    /// Commit of the remote HEAD
    pub head_commit: Option<String>,
    /// Time taken to connect and list
    pub latency: Duration,
}

impl RemoteListing {
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

/// Blocking Git operations against a remote.
///
/// Implementations must honour `deadline`: once it expires the operation is
/// abandoned and [`crate::Error::DeadlineExceeded`] returned.
pub trait GitTransport: Send + Sync {
    /// Clone `request.authenticated_url` into `request.target_dir`.
    fn clone_repository(
        &self,
        request: &CloneRequest,
        auth: &GitAuth,
        deadline: Deadline,
    ) -> Result<CloneOutcome>;

    /// Stage everything under `dir`, commit it and push to `branch` on `origin`.
    fn commit_and_push(
        &self,
        dir: &std::path::Path,
        message: &str,
        branch: &str,
        auth: &GitAuth,
        deadline: Deadline,
    ) -> Result<PushOutcome>;

    /// Connect to `url` and list its branches without cloning.
    fn list_remote(&self, url: &str, auth: &GitAuth, deadline: Deadline) -> Result<RemoteListing>;
}
