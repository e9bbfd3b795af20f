//! Per-repository mutual exclusion
//!
//! Rotation, directory initialization, pushes and any probe that writes its
//! verdict back take the repository's write lock. Read-only clone inspections
//! take its read lock. Work on different repositories never contends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::model::RepositoryId;

/// Registry of one async read/write lock per repository.
#[derive(Debug, Default)]
pub struct RepositoryLocks {
    locks: Mutex<HashMap<RepositoryId, Arc<RwLock<()>>>>,
}

impl RepositoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: RepositoryId) -> Arc<RwLock<()>> {
        // The map only holds Arcs; a poisoned guard is still consistent.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id).or_default().clone()
    }

    /// Exclusive access for a mutating operation.
    pub async fn write(&self, id: RepositoryId) -> OwnedRwLockWriteGuard<()> {
        let guard = self.entry(id).write_owned().await;
        tracing::trace!(repository_id = %id, "Acquired repository write lock");
        guard
    }

    /// Shared access for a read-only inspection.
    pub async fn read(&self, id: RepositoryId) -> OwnedRwLockReadGuard<()> {
        self.entry(id).read_owned().await
    }

    /// Exclusive access if nobody holds the lock right now.
    pub fn try_write(&self, id: RepositoryId) -> Option<OwnedRwLockWriteGuard<()>> {
        self.entry(id).try_write_owned().ok()
    }

    /// Shared access if no mutation is in progress right now.
    pub fn try_read(&self, id: RepositoryId) -> Option<OwnedRwLockReadGuard<()>> {
        self.entry(id).try_read_owned().ok()
    }
}
