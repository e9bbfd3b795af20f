//! `git2`-backed implementation of [`GitTransport`]

use std::path::Path;
use std::time::Instant;

use git2::{
    Direction, ErrorCode, FetchOptions, IndexAddOption, PushOptions, Remote, RemoteCallbacks,
    Repository, Signature,
};

use crate::auth::{SshKeyFile, install_credentials};
use crate::transport::{CloneOutcome, CloneRequest, GitTransport, PushOutcome, RemoteListing};
use crate::{Deadline, Error, GitAuth, Result, authenticated_url, redact_url};

const ORIGIN: &str = "origin";

/// Transport that clones, commits and pushes with libgit2.
#[derive(Debug, Clone)]
pub struct Git2Transport {
    author_name: String,
    author_email: String,
}

impl Default for Git2Transport {
    fn default() -> Self {
        Self::new("Fabric GitOps", "gitops@localhost")
    }
}

impl Git2Transport {
    /// Create a transport that signs commits as `author_name <author_email>`.
    pub fn new(author_name: impl Into<String>, author_email: impl Into<String>) -> Self {
        Self {
            author_name: author_name.into(),
            author_email: author_email.into(),
        }
    }

    fn signature(&self) -> Result<Signature<'static>> {
        Ok(Signature::now(&self.author_name, &self.author_email)?)
    }
}

/// Prepare an SSH key file when the auth shape needs one.
fn key_file_for(auth: &GitAuth) -> Result<Option<SshKeyFile>> {
    match auth {
        GitAuth::SshKey { private_key, .. } => Ok(Some(SshKeyFile::write(private_key)?)),
        _ => Ok(None),
    }
}

/// Callbacks carrying credentials and deadline-based cancellation.
fn callbacks<'a>(
    auth: &'a GitAuth,
    key_file: Option<&'a SshKeyFile>,
    deadline: Deadline,
) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    install_credentials(&mut callbacks, auth, key_file);
    callbacks.transfer_progress(move |_| !deadline.expired());
    callbacks.sideband_progress(move |_| !deadline.expired());
    callbacks
}

/// Shallow fetches are only supported by network transports.
fn supports_shallow(url: &str) -> bool {
    ["http://", "https://", "ssh://", "git://"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
        || (url.contains('@') && url.contains(':') && !url.contains("://"))
}

/// Translate a `git2` failure, preferring a deadline error when one applies.
fn map_git_error(err: git2::Error, deadline: Deadline, operation: &str) -> Error {
    if deadline.expired() || err.code() == ErrorCode::User {
        return Error::DeadlineExceeded {
            operation: operation.to_string(),
        };
    }
    Error::Git(err)
}

impl GitTransport for Git2Transport {
    fn clone_repository(
        &self,
        request: &CloneRequest,
        auth: &GitAuth,
        deadline: Deadline,
    ) -> Result<CloneOutcome> {
        deadline.check("clone")?;
        let key_file = key_file_for(auth)?;

        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(callbacks(auth, key_file.as_ref(), deadline));
        if request.depth > 0 && supports_shallow(&request.url) {
            fetch.depth(i32::try_from(request.depth).unwrap_or(i32::MAX));
        }

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch);
        if let Some(branch) = &request.branch {
            builder.branch(branch);
        }

        tracing::debug!(
            url = %redact_url(&request.url),
            branch = ?request.branch,
            depth = request.depth,
            "Cloning repository"
        );

        let repo = builder
            .clone(&request.authenticated_url, &request.target_dir)
            .map_err(|e| {
                if let Some(branch) = &request.branch
                    && e.code() == ErrorCode::NotFound
                    && e.message().contains(branch.as_str())
                {
                    return Error::BranchNotFound {
                        name: branch.clone(),
                    };
                }
                map_git_error(e, deadline, "clone")
            })?;

        let (commit_sha, branch) = match repo.head() {
            Ok(head) => (
                head.target().map(|oid| oid.to_string()),
                head.shorthand().map(str::to_string),
            ),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                (None, request.branch.clone())
            }
            Err(e) => return Err(e.into()),
        };

        Ok(CloneOutcome { commit_sha, branch })
    }

    fn commit_and_push(
        &self,
        dir: &Path,
        message: &str,
        branch: &str,
        auth: &GitAuth,
        deadline: Deadline,
    ) -> Result<PushOutcome> {
        deadline.check("push")?;
        let repo = Repository::open(dir)?;

        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        // Picks up files moved away from their original location
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_id = index.write_tree()?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(parent) = &parent
            && parent.tree_id() == tree_id
        {
            tracing::debug!(dir = %dir.display(), "Nothing to commit");
            return Ok(PushOutcome {
                commit_sha: None,
                pushed: false,
            });
        }

        let tree = repo.find_tree(tree_id)?;
        let signature = self.signature()?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;

        let head_ref = repo
            .head()?
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("refs/heads/{branch}"));

        let mut remote = repo.find_remote(ORIGIN).map_err(|_| Error::RemoteNotFound {
            name: ORIGIN.to_string(),
        })?;

        let key_file = key_file_for(auth)?;
        let mut push_callbacks = callbacks(auth, key_file.as_ref(), deadline);
        push_callbacks.push_update_reference(|refname, status| match status {
            Some(reason) => Err(git2::Error::from_str(&format!(
                "remote rejected {refname}: {reason}"
            ))),
            None => Ok(()),
        });
        // Last point at which a push can still be abandoned without touching the remote
        push_callbacks.push_negotiation(move |_| {
            if deadline.expired() {
                return Err(git2::Error::from_str("push abandoned at its deadline"));
            }
            Ok(())
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(push_callbacks);

        let refspec = format!("{head_ref}:refs/heads/{branch}");
        deadline.check("push")?;
        remote
            .push(&[refspec.as_str()], Some(&mut options))
            .map_err(|e| match map_git_error(e, deadline, "push") {
                Error::Git(inner) => Error::PushFailed {
                    message: inner.message().to_string(),
                },
                other => other,
            })?;

        tracing::info!(commit = %oid, branch = %branch, "Pushed commit");

        Ok(PushOutcome {
            commit_sha: Some(oid.to_string()),
            pushed: true,
        })
    }

    fn list_remote(&self, url: &str, auth: &GitAuth, deadline: Deadline) -> Result<RemoteListing> {
        deadline.check("ls-remote")?;
        let key_file = key_file_for(auth)?;
        let target = authenticated_url(url, auth);
        let started = Instant::now();

        let mut remote = Remote::create_detached(target.as_str()).map_err(|_| Error::InvalidUrl {
            url: redact_url(url),
        })?;
        let connection = remote
            .connect_auth(
                Direction::Fetch,
                Some(callbacks(auth, key_file.as_ref(), deadline)),
                None,
            )
            .map_err(|e| map_git_error(e, deadline, "ls-remote"))?;

        let mut head_branch = None;
        let mut head_commit = None;
        let mut branches = Vec::new();
        for head in connection.list()? {
            if head.name() == "HEAD" {
                head_branch = head
                    .symref_target()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                    .map(str::to_string);
                if !head.oid().is_zero() {
                    head_commit = Some(head.oid().to_string());
                }
            } else if let Some(branch) = head.name().strip_prefix("refs/heads/") {
                branches.push(branch.to_string());
            }
        }
        drop(connection);
        branches.sort();

        Ok(RemoteListing {
            head_branch,
            branches,
            head_commit,
            latency: started.elapsed(),
        })
    }
}
