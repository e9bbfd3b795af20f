//! Layout maintenance against a fabric's repository
//!
//! Each operation clones the repository transiently, works on the fabric's
//! subtree and pushes once when something changed. Mutations hold the
//! repository's write lock; inspections hold its read lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gitops_git::{Deadline, GitTransport};

use super::ingest::{IngestionPipeline, IngestionReport};
use super::layout::{
    InitializationResult, LayoutValidation, UnmanagedAction, UnmanagedReport, apply_layout, handle_unmanaged_in,
    inspect_layout,
};
use super::validator::{discover_candidates, normalize_directory, suggest_directories};
use crate::config::GitSettings;
use crate::connection::clone_target;
use crate::lock::RepositoryLocks;
use crate::model::{DirectoryStatus, Fabric, FabricId, Repository, RepositoryId};
use crate::network::{CloneTarget, with_transient_clone};
use crate::store::RecordStore;
use crate::vault::CredentialVault;
use crate::{Error, Result};

/// Everything an operation on one fabric's subtree needs.
struct Workspace {
    fabric: Fabric,
    repository: Repository,
    target: CloneTarget,
    /// Fabric directory relative to the repository root, empty for the root
    relative: String,
}

pub struct DirectoryManager {
    store: Arc<dyn RecordStore>,
    vault: Arc<CredentialVault>,
    transport: Arc<dyn GitTransport>,
    locks: Arc<RepositoryLocks>,
    git: GitSettings,
}

impl DirectoryManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        vault: Arc<CredentialVault>,
        transport: Arc<dyn GitTransport>,
        locks: Arc<RepositoryLocks>,
        git: GitSettings,
    ) -> Self {
        Self {
            store,
            vault,
            transport,
            locks,
            git,
        }
    }

    fn workspace(&self, fabric_id: FabricId) -> Result<Workspace> {
        let fabric = self.store.fabric(fabric_id)?;
        let repository_id = fabric.repository.ok_or(Error::FabricUnassigned { fabric: fabric_id })?;
        let repository = self.store.repository(repository_id)?;
        let directory = normalize_directory(&fabric.gitops_directory)?;
        let secrets = self.vault.decrypt(&repository)?;
        Ok(Workspace {
            target: clone_target(&repository, &secrets, self.git.clone_depth),
            relative: directory.trim_matches('/').to_string(),
            fabric,
            repository,
        })
    }

    fn timeout(&self, repository: &Repository) -> Duration {
        repository.timeout(self.git.timeout())
    }

    fn repository_of(&self, fabric_id: FabricId) -> Result<RepositoryId> {
        self.store
            .fabric(fabric_id)?
            .repository
            .ok_or(Error::FabricUnassigned { fabric: fabric_id })
    }

    /// Materialize the layout in the fabric's directory and push it.
    ///
    /// A push failure is reported in the result's errors while the created
    /// directories stay listed. The fabric's directory status follows the
    /// outcome.
    pub async fn initialize(&self, fabric_id: FabricId, force: bool, deadline: Deadline) -> Result<InitializationResult> {
        let _guard = self.locks.write(self.repository_of(fabric_id)?).await;
        let workspace = self.workspace(fabric_id)?;
        let timeout = self.timeout(&workspace.repository);
        let fabric = workspace.fabric.clone();
        let relative = workspace.relative.clone();

        let outcome = with_transient_clone(
            "initialize_directories",
            self.transport.clone(),
            workspace.target,
            timeout,
            deadline,
            move |session| {
                let base = session.clone.root().join(&relative);
                let mut result = apply_layout(&base, &fabric, force, Utc::now());
                if result.needs_commit() {
                    let message = format!("Initialize GitOps structure for fabric {}", fabric.name);
                    match session.commit_and_push(&message) {
                        Ok(push) => {
                            result.commit_sha = push.commit_sha;
                            result.pushed = push.pushed;
                        }
                        Err(e) => {
                            result.errors.push(format!("push failed: {e}"));
                            result.success = false;
                        }
                    }
                }
                Ok(result)
            },
        )
        .await;

        let status = match &outcome {
            Ok(result) if result.success => DirectoryStatus::Initialized,
            _ => DirectoryStatus::Error,
        };
        self.store.set_directory_status(fabric_id, status)?;

        match &outcome {
            Ok(result) => tracing::info!(
                fabric = %workspace.fabric.name,
                repository_id = %workspace.repository.id,
                created = result.directories_created.len(),
                errors = result.errors.len(),
                pushed = result.pushed,
                "GitOps structure initialized"
            ),
            Err(e) => tracing::warn!(
                fabric = %workspace.fabric.name,
                repository_id = %workspace.repository.id,
                error = %e,
                "GitOps structure initialization failed"
            ),
        }
        outcome
    }

    /// Check the fabric's directory against the layout.
    pub async fn validate(&self, fabric_id: FabricId, deadline: Deadline) -> Result<LayoutValidation> {
        let _guard = self.locks.read(self.repository_of(fabric_id)?).await;
        let workspace = self.workspace(fabric_id)?;
        let timeout = self.timeout(&workspace.repository);
        let relative = workspace.relative;

        with_transient_clone("validate_directories", self.transport.clone(), workspace.target, timeout, deadline, move |session| {
            inspect_layout(&session.clone.root().join(&relative))
        })
        .await
    }

    /// Promote pending raw files through `pipeline`, pushing once.
    pub async fn ingest_raw(
        &self,
        fabric_id: FabricId,
        pipeline: Arc<dyn IngestionPipeline>,
        deadline: Deadline,
    ) -> Result<IngestionReport> {
        let _guard = self.locks.write(self.repository_of(fabric_id)?).await;
        let workspace = self.workspace(fabric_id)?;
        let timeout = self.timeout(&workspace.repository);
        let relative = workspace.relative;
        let name = workspace.fabric.name;

        let report = with_transient_clone("ingest_raw", self.transport.clone(), workspace.target, timeout, deadline, move |session| {
            let report = pipeline.ingest(&session.clone.root().join(&relative))?;
            if report.changed() {
                let message = format!(
                    "Ingest {} raw file(s) for fabric {name}",
                    report.processed.len() + report.failed.len()
                );
                session.commit_and_push(&message)?;
            }
            Ok(report)
        })
        .await?;

        tracing::info!(
            fabric_id = %fabric_id,
            processed = report.processed.len(),
            failed = report.failed.len(),
            "Raw files ingested"
        );
        Ok(report)
    }

    /// Apply `action` to files outside the layout's zones.
    pub async fn handle_unmanaged(
        &self,
        fabric_id: FabricId,
        action: UnmanagedAction,
        deadline: Deadline,
    ) -> Result<UnmanagedReport> {
        let _guard = self.locks.write(self.repository_of(fabric_id)?).await;
        let workspace = self.workspace(fabric_id)?;
        let timeout = self.timeout(&workspace.repository);
        let relative = workspace.relative;
        let name = workspace.fabric.name;

        with_transient_clone("handle_unmanaged", self.transport.clone(), workspace.target, timeout, deadline, move |session| {
            let report = handle_unmanaged_in(&session.clone.root().join(&relative), action, Utc::now())?;
            if report.changed() {
                let verb = match action {
                    UnmanagedAction::Archive => "Archive",
                    _ => "Preserve",
                };
                session.commit_and_push(&format!("{verb} {} unmanaged file(s) for fabric {name}", report.moved.len()))?;
            }
            Ok(report)
        })
        .await
    }

    /// Unused directories for a new fabric on `repository_id`.
    ///
    /// Combines the standard candidates with GitOps-looking directories found
    /// in a transient clone, excluding anything an existing fabric uses.
    pub async fn suggest_available(&self, repository_id: RepositoryId, deadline: Deadline) -> Result<Vec<String>> {
        let _guard = self.locks.read(repository_id).await;
        let repository = self.store.repository(repository_id)?;
        let secrets = self.vault.decrypt(&repository)?;
        let target = clone_target(&repository, &secrets, self.git.clone_depth);

        let discovered = with_transient_clone(
            "suggest_directories",
            self.transport.clone(),
            target,
            self.timeout(&repository),
            deadline,
            |session| discover_candidates(session.clone.root()),
        )
        .await?;

        let used: Vec<String> = self
            .store
            .fabrics_for_repository(repository_id)?
            .iter()
            .map(|fabric| normalize_directory(&fabric.gitops_directory).unwrap_or_else(|_| fabric.gitops_directory.clone()))
            .collect();
        Ok(suggest_directories(&used, &discovered))
    }
}
