//! Bounded execution of blocking Git work
//!
//! Every clone, push and remote listing runs on the blocking pool under a
//! timeout. The same bound is handed to the transport as a [`Deadline`], so
//! an overrunning transfer aborts at its next progress callback and the
//! transient clone is dropped. The caller only resumes once the blocking work
//! has stopped, so a repository lock held around the call covers all of it.

use std::sync::Arc;
use std::time::Duration;

use gitops_git::{Deadline, GitAuth, GitTransport, PushOutcome, TransientClone};

use crate::{Error, Result};

/// Run `work` on the blocking pool, bounded by `timeout` and `caller`.
///
/// Expiry of `timeout` yields [`Error::Timeout`]; expiry of the caller's
/// deadline yields [`Error::Cancelled`]. Work that overruns the bound is
/// awaited until it stops: a failure is reported as the expiry, while work
/// that still completed reports its real result.
pub async fn run_blocking<T, F>(
    operation: &str,
    timeout: Duration,
    caller: Deadline,
    work: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(Deadline) -> Result<T> + Send + 'static,
{
    if caller.expired() {
        return Err(Error::Cancelled {
            operation: operation.to_string(),
        });
    }

    let (bound, cancelled) = match caller.remaining() {
        Some(remaining) if remaining < timeout => (remaining, true),
        _ => (timeout, false),
    };
    let expired = || {
        if cancelled {
            Error::Cancelled {
                operation: operation.to_string(),
            }
        } else {
            Error::Timeout {
                operation: operation.to_string(),
                after: timeout,
            }
        }
    };

    let deadline = Deadline::after(bound);
    let mut handle = tokio::task::spawn_blocking(move || work(deadline));

    let joined = match tokio::time::timeout(bound, &mut handle).await {
        Ok(joined) => joined,
        Err(_) => {
            let timeout_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(operation, timeout_ms, "Network operation timed out; waiting for it to stop");
            return match handle.await {
                Ok(Ok(value)) => {
                    tracing::warn!(operation, timeout_ms, "Network operation completed after its deadline");
                    Ok(value)
                }
                Ok(Err(e)) => {
                    tracing::debug!(operation, error = %e, "Overrunning network operation stopped");
                    Err(expired())
                }
                Err(join) => Err(Error::Task(join.to_string())),
            };
        }
    };

    match joined {
        Ok(Err(Error::Git(err))) if err.is_deadline() => Err(expired()),
        Ok(result) => result,
        Err(join) => Err(Error::Task(join.to_string())),
    }
}

/// Where and how to clone a repository.
#[derive(Debug, Clone)]
pub struct CloneTarget {
    pub url: String,
    pub auth: GitAuth,
    /// History depth, `0` for full history
    pub depth: u32,
    /// Branch to push to when the remote has none yet
    pub fallback_branch: String,
}

/// A transient clone handed to work running on the blocking pool.
pub struct CloneSession<'a> {
    pub clone: &'a TransientClone,
    transport: &'a dyn GitTransport,
    auth: &'a GitAuth,
    deadline: Deadline,
}

impl CloneSession<'_> {
    /// Commit everything in the working tree and push it upstream.
    pub fn commit_and_push(&self, message: &str) -> Result<PushOutcome> {
        Ok(self
            .clone
            .commit_and_push(self.transport, message, self.auth, self.deadline)?)
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }
}

/// Clone `target` into a temporary directory and run `work` against it.
///
/// The working tree is removed when `work` returns, fails or is abandoned at
/// the deadline.
pub async fn with_transient_clone<T, F>(
    operation: &str,
    transport: Arc<dyn GitTransport>,
    target: CloneTarget,
    timeout: Duration,
    caller: Deadline,
    work: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&CloneSession<'_>) -> Result<T> + Send + 'static,
{
    run_blocking(operation, timeout, caller, move |deadline| {
        let clone = TransientClone::create(
            transport.as_ref(),
            &target.url,
            &target.auth,
            None,
            target.depth,
            &target.fallback_branch,
            deadline,
        )?;
        let session = CloneSession {
            clone: &clone,
            transport: transport.as_ref(),
            auth: &target.auth,
            deadline,
        };
        work(&session)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn returns_the_work_result() {
        let value = run_blocking("noop", Duration::from_secs(5), Deadline::none(), |_| Ok(7))
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn slow_work_times_out() {
        let err = run_blocking("clone", Duration::from_millis(20), Deadline::none(), |deadline| {
            std::thread::sleep(Duration::from_millis(300));
            deadline.check("clone")?;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { ref operation, .. } if operation == "clone"));
    }

    #[tokio::test]
    async fn timed_out_work_has_stopped_before_the_caller_resumes() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let err = run_blocking("push", Duration::from_millis(20), Deadline::none(), move |deadline| {
            std::thread::sleep(Duration::from_millis(200));
            flag.store(true, Ordering::SeqCst);
            deadline.check("push")?;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn work_completing_after_the_bound_reports_its_result() {
        let value = run_blocking("push", Duration::from_millis(20), Deadline::none(), |_| {
            std::thread::sleep(Duration::from_millis(150));
            Ok("pushed")
        })
        .await
        .unwrap();
        assert_eq!(value, "pushed");
    }

    #[tokio::test]
    async fn transport_deadline_maps_to_timeout() {
        let err = run_blocking::<(), _>("push", Duration::from_secs(5), Deadline::none(), |_| {
            Err(gitops_git::Error::DeadlineExceeded {
                operation: "push".into(),
            }
            .into())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn expired_caller_deadline_cancels_before_starting() {
        let err = run_blocking("clone", Duration::from_secs(5), Deadline::after(Duration::ZERO), |_| {
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
