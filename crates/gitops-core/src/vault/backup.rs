//! Credential backups for rotation rollback
//!
//! Backups are kept in memory, per repository, newest last. Only the
//! encrypted form is ever held.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ConnectionStatus, CredentialMeta, Repository, RepositoryId};

/// Snapshot of a repository's credential state before a rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBackup {
    /// Encrypted secret as stored before the rotation
    pub encrypted: Option<String>,
    pub meta: CredentialMeta,
    pub connection_status: ConnectionStatus,
    pub validation_error: Option<String>,
    /// When the backup was taken
    pub taken_at: DateTime<Utc>,
}

impl CredentialBackup {
    /// Capture the credential state of `repository`
    pub fn capture(repository: &Repository) -> Self {
        Self {
            encrypted: repository.encrypted_credentials.clone(),
            meta: repository.credential_meta.clone(),
            connection_status: repository.connection_status,
            validation_error: repository.validation_error.clone(),
            taken_at: Utc::now(),
        }
    }
}

/// Bounded per-repository backup history
#[derive(Debug)]
pub struct BackupStore {
    retention: usize,
    backups: Mutex<HashMap<RepositoryId, VecDeque<CredentialBackup>>>,
}

impl BackupStore {
    /// Keep the newest `retention` backups per repository (at least one)
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            backups: Mutex::new(HashMap::new()),
        }
    }

    fn backups(&self) -> MutexGuard<'_, HashMap<RepositoryId, VecDeque<CredentialBackup>>> {
        self.backups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a backup, dropping the oldest beyond the retention limit
    pub fn push(&self, repository: RepositoryId, backup: CredentialBackup) {
        let mut backups = self.backups();
        let history = backups.entry(repository).or_default();
        history.push_back(backup);
        while history.len() > self.retention {
            history.pop_front();
        }
    }

    /// Most recent backup
    pub fn latest(&self, repository: RepositoryId) -> Option<CredentialBackup> {
        self.backups()
            .get(&repository)
            .and_then(|history| history.back().cloned())
    }

    /// Check if any backup exists for a repository
    pub fn has_backup(&self, repository: RepositoryId) -> bool {
        self.backups()
            .get(&repository)
            .is_some_and(|history| !history.is_empty())
    }

    /// Backups for a repository, oldest first
    pub fn list(&self, repository: RepositoryId) -> Vec<CredentialBackup> {
        self.backups()
            .get(&repository)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuthType;

    fn backup(marker: &str) -> CredentialBackup {
        let mut repository =
            Repository::new(RepositoryId(1), "cfg", "https://github.com/o/r.git", AuthType::Token);
        repository.encrypted_credentials = Some(marker.to_string());
        CredentialBackup::capture(&repository)
    }

    #[test]
    fn retains_newest_backups() {
        let store = BackupStore::new(2);
        for marker in ["a", "b", "c"] {
            store.push(RepositoryId(1), backup(marker));
        }
        let kept: Vec<_> = store
            .list(RepositoryId(1))
            .into_iter()
            .filter_map(|b| b.encrypted)
            .collect();
        assert_eq!(kept, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(
            store.latest(RepositoryId(1)).and_then(|b| b.encrypted).as_deref(),
            Some("c")
        );
    }

    #[test]
    fn zero_retention_still_keeps_one() {
        let store = BackupStore::new(0);
        store.push(RepositoryId(3), backup("only"));
        assert!(store.has_backup(RepositoryId(3)));
        assert!(!store.has_backup(RepositoryId(4)));
    }
}
