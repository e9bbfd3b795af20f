//! Caller-supplied deadlines for network operations

use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Point in time after which a network operation must give up.
///
/// `git2` consults the deadline from its progress callbacks, so an expired
/// deadline aborts a clone or push mid-transfer instead of waiting for the
/// transport to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// No deadline at all.
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Fail with [`Error::DeadlineExceeded`] if the deadline has passed.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.expired() {
            return Err(Error::DeadlineExceeded {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
