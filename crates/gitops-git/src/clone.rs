//! Short-lived working copies
//!
//! No clone outlives the operation that needed it. A [`TransientClone`] owns
//! its temporary directory; dropping it (on success, error or cancellation)
//! removes the working tree, so a half-written checkout is never reused.

use tempfile::TempDir;

use crate::{CloneRequest, Deadline, GitAuth, GitTransport, PushOutcome, Result, authenticated_url};
use gitops_fs::NormalizedPath;

/// A clone living in a temporary directory.
pub struct TransientClone {
    _dir: TempDir,
    root: NormalizedPath,
    commit_sha: Option<String>,
    branch: String,
}

impl TransientClone {
    /// Clone `url` into a fresh temporary directory.
    ///
    /// `fallback_branch` names the branch to push to when neither `branch` nor
    /// the remote HEAD identifies one (an empty remote).
    pub fn create(
        transport: &dyn GitTransport,
        url: &str,
        auth: &GitAuth,
        branch: Option<&str>,
        depth: u32,
        fallback_branch: &str,
        deadline: Deadline,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("gitops-clone-").tempdir()?;
        let target = dir.path().join("repo");

        let request = CloneRequest {
            url: url.to_string(),
            authenticated_url: authenticated_url(url, auth),
            target_dir: target.clone(),
            branch: branch.map(str::to_string),
            depth,
        };
        let outcome = transport.clone_repository(&request, auth, deadline)?;

        Ok(Self {
            _dir: dir,
            root: NormalizedPath::new(&target),
            commit_sha: outcome.commit_sha,
            branch: outcome
                .branch
                .or_else(|| branch.map(str::to_string))
                .unwrap_or_else(|| fallback_branch.to_string()),
        })
    }

    /// Root of the working tree.
    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    /// Commit checked out by the clone.
    pub fn commit_sha(&self) -> Option<&str> {
        self.commit_sha.as_deref()
    }

    /// Branch the clone tracks and pushes to.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Branches the clone fetched from `origin`, sorted.
    pub fn remote_branches(&self) -> Result<Vec<String>> {
        let repo = git2::Repository::open(self.root.to_native())?;
        let mut names = Vec::new();
        for entry in repo.branches(Some(git2::BranchType::Remote))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()?
                && let Some(short) = name.strip_prefix("origin/")
                && short != "HEAD"
            {
                names.push(short.to_string());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Commit every change in the working tree and push it upstream.
    pub fn commit_and_push(
        &self,
        transport: &dyn GitTransport,
        message: &str,
        auth: &GitAuth,
        deadline: Deadline,
    ) -> Result<PushOutcome> {
        transport.commit_and_push(&self.root.to_native(), message, &self.branch, auth, deadline)
    }
}
