//! Persistence contract for repositories and fabrics
//!
//! The subsystem does not mandate a storage engine. It needs record reads and
//! a handful of individually atomic field writes, expressed by
//! [`RecordStore`]. [`MemoryStore`] is the in-process implementation and can
//! snapshot itself to a JSON file.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use gitops_fs::{NormalizedPath, io};
use serde::{Deserialize, Serialize};

use crate::model::{
    ConnectionStatus, CredentialMeta, DirectoryStatus, Fabric, FabricId, FabricStatus, Repository,
    RepositoryId,
};
use crate::{Error, Result};

/// Record storage used by every component.
///
/// Each `set_*` call is one atomic field write; callers needing several
/// writes to appear together serialize through
/// [`RepositoryLocks`](crate::lock::RepositoryLocks).
pub trait RecordStore: Send + Sync {
    /// Fetch a repository; `fabric_count` is always freshly recomputed.
    fn repository(&self, id: RepositoryId) -> Result<Repository>;
    fn repositories(&self) -> Result<Vec<Repository>>;
    fn fabric(&self, id: FabricId) -> Result<Fabric>;
    fn fabrics(&self) -> Result<Vec<Fabric>>;
    /// Fabrics currently referencing `id`.
    fn fabrics_for_repository(&self, id: RepositoryId) -> Result<Vec<Fabric>>;

    /// Insert or replace a repository record.
    fn insert_repository(&self, repository: Repository) -> Result<()>;
    /// Insert or replace a fabric record, recomputing affected usage counters.
    fn insert_fabric(&self, fabric: Fabric) -> Result<()>;
    /// Delete a repository; fails with [`Error::RepositoryInUse`] while referenced.
    fn delete_repository(&self, id: RepositoryId) -> Result<()>;
    fn delete_fabric(&self, id: FabricId) -> Result<()>;

    fn set_connection_status(
        &self,
        id: RepositoryId,
        status: ConnectionStatus,
        error: Option<String>,
    ) -> Result<()>;
    fn set_last_validated(&self, id: RepositoryId, at: DateTime<Utc>) -> Result<()>;
    fn set_default_branch(&self, id: RepositoryId, branch: &str) -> Result<()>;
    /// Replace the encrypted secret and its rotation metadata together.
    fn set_credentials(
        &self,
        id: RepositoryId,
        encrypted: Option<String>,
        meta: CredentialMeta,
    ) -> Result<()>;
    /// Point a fabric at a repository directory, recomputing usage counters.
    fn set_fabric_assignment(
        &self,
        fabric: FabricId,
        repository: Option<RepositoryId>,
        directory: &str,
    ) -> Result<()>;
    fn set_directory_status(&self, fabric: FabricId, status: DirectoryStatus) -> Result<()>;
    fn set_fabric_status(&self, fabric: FabricId, status: FabricStatus) -> Result<()>;
    /// Recount fabrics referencing `id` and store the result.
    fn recompute_fabric_count(&self, id: RepositoryId) -> Result<u32>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Records {
    repositories: BTreeMap<RepositoryId, Repository>,
    fabrics: BTreeMap<FabricId, Fabric>,
}

impl Records {
    fn usage(&self, id: RepositoryId) -> u32 {
        let count = self
            .fabrics
            .values()
            .filter(|fabric| fabric.repository == Some(id))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn recount(&mut self, id: RepositoryId) -> u32 {
        let count = self.usage(id);
        if let Some(repository) = self.repositories.get_mut(&id) {
            repository.fabric_count = count;
        }
        count
    }

    fn repository_mut(&mut self, id: RepositoryId) -> Result<&mut Repository> {
        self.repositories
            .get_mut(&id)
            .ok_or(Error::RepositoryNotFound(id))
    }

    fn fabric_mut(&mut self, id: FabricId) -> Result<&mut Fabric> {
        self.fabrics.get_mut(&id).ok_or(Error::FabricNotFound(id))
    }
}

/// In-memory [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|_| Error::State("record store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|_| Error::State("record store lock poisoned".into()))
    }

    /// Write every record to `path` as JSON, atomically.
    pub fn save_snapshot(&self, path: &NormalizedPath) -> Result<()> {
        let content = serde_json::to_string_pretty(&*self.read()?)?;
        io::write_text(path, &content)?;
        tracing::debug!(path = %path, "Saved record snapshot");
        Ok(())
    }

    /// Load a store from a snapshot written by [`MemoryStore::save_snapshot`].
    ///
    /// Usage counters are recomputed rather than trusted.
    pub fn load_snapshot(path: &NormalizedPath) -> Result<Self> {
        let content = io::read_text(path)?;
        let mut records: Records = serde_json::from_str(&content)?;
        let ids: Vec<RepositoryId> = records.repositories.keys().copied().collect();
        for id in ids {
            records.recount(id);
        }
        Ok(Self {
            records: RwLock::new(records),
        })
    }
}

impl RecordStore for MemoryStore {
    fn repository(&self, id: RepositoryId) -> Result<Repository> {
        let records = self.read()?;
        let mut repository = records
            .repositories
            .get(&id)
            .cloned()
            .ok_or(Error::RepositoryNotFound(id))?;
        repository.fabric_count = records.usage(id);
        Ok(repository)
    }

    fn repositories(&self) -> Result<Vec<Repository>> {
        let records = self.read()?;
        Ok(records
            .repositories
            .values()
            .map(|repository| {
                let mut repository = repository.clone();
                repository.fabric_count = records.usage(repository.id);
                repository
            })
            .collect())
    }

    fn fabric(&self, id: FabricId) -> Result<Fabric> {
        self.read()?
            .fabrics
            .get(&id)
            .cloned()
            .ok_or(Error::FabricNotFound(id))
    }

    fn fabrics(&self) -> Result<Vec<Fabric>> {
        Ok(self.read()?.fabrics.values().cloned().collect())
    }

    fn fabrics_for_repository(&self, id: RepositoryId) -> Result<Vec<Fabric>> {
        Ok(self
            .read()?
            .fabrics
            .values()
            .filter(|fabric| fabric.repository == Some(id))
            .cloned()
            .collect())
    }

    fn insert_repository(&self, repository: Repository) -> Result<()> {
        let mut records = self.write()?;
        let id = repository.id;
        records.repositories.insert(id, repository);
        records.recount(id);
        Ok(())
    }

    fn insert_fabric(&self, fabric: Fabric) -> Result<()> {
        let mut records = self.write()?;
        let previous = records.fabrics.insert(fabric.id, fabric.clone());
        if let Some(old) = previous.and_then(|f| f.repository) {
            records.recount(old);
        }
        if let Some(new) = fabric.repository {
            records.recount(new);
        }
        Ok(())
    }

    fn delete_repository(&self, id: RepositoryId) -> Result<()> {
        let mut records = self.write()?;
        if !records.repositories.contains_key(&id) {
            return Err(Error::RepositoryNotFound(id));
        }
        let fabric_count = records.usage(id) as usize;
        if fabric_count > 0 {
            return Err(Error::RepositoryInUse { id, fabric_count });
        }
        records.repositories.remove(&id);
        Ok(())
    }

    fn delete_fabric(&self, id: FabricId) -> Result<()> {
        let mut records = self.write()?;
        let removed = records.fabrics.remove(&id).ok_or(Error::FabricNotFound(id))?;
        if let Some(repository) = removed.repository {
            records.recount(repository);
        }
        Ok(())
    }

    fn set_connection_status(
        &self,
        id: RepositoryId,
        status: ConnectionStatus,
        error: Option<String>,
    ) -> Result<()> {
        let mut records = self.write()?;
        let repository = records.repository_mut(id)?;
        repository.connection_status = status;
        repository.validation_error = error;
        Ok(())
    }

    fn set_last_validated(&self, id: RepositoryId, at: DateTime<Utc>) -> Result<()> {
        self.write()?.repository_mut(id)?.last_validated = Some(at);
        Ok(())
    }

    fn set_default_branch(&self, id: RepositoryId, branch: &str) -> Result<()> {
        self.write()?.repository_mut(id)?.default_branch = branch.to_string();
        Ok(())
    }

    fn set_credentials(
        &self,
        id: RepositoryId,
        encrypted: Option<String>,
        meta: CredentialMeta,
    ) -> Result<()> {
        let mut records = self.write()?;
        let repository = records.repository_mut(id)?;
        repository.encrypted_credentials = encrypted;
        repository.credential_meta = meta;
        Ok(())
    }

    fn set_fabric_assignment(
        &self,
        fabric: FabricId,
        repository: Option<RepositoryId>,
        directory: &str,
    ) -> Result<()> {
        let mut records = self.write()?;
        if let Some(id) = repository
            && !records.repositories.contains_key(&id)
        {
            return Err(Error::RepositoryNotFound(id));
        }
        let record = records.fabric_mut(fabric)?;
        let previous = record.repository;
        let moved = previous != repository || record.gitops_directory != directory;
        record.repository = repository;
        record.gitops_directory = directory.to_string();
        if moved {
            record.directory_status = DirectoryStatus::Uninitialized;
        }
        for id in previous.into_iter().chain(repository) {
            records.recount(id);
        }
        Ok(())
    }

    fn set_directory_status(&self, fabric: FabricId, status: DirectoryStatus) -> Result<()> {
        self.write()?.fabric_mut(fabric)?.directory_status = status;
        Ok(())
    }

    fn set_fabric_status(&self, fabric: FabricId, status: FabricStatus) -> Result<()> {
        self.write()?.fabric_mut(fabric)?.status = status;
        Ok(())
    }

    fn recompute_fabric_count(&self, id: RepositoryId) -> Result<u32> {
        let mut records = self.write()?;
        records.repository_mut(id)?;
        Ok(records.recount(id))
    }
}
