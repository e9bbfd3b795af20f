//! Caller-facing facade over the subsystem
//!
//! [`GitOpsService`] wires every component around one record store, one lock
//! registry and one transport, and exposes the operations a CLI, API or UI
//! layer calls.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gitops_git::{Deadline, GitTransport, RemoteListing};

use crate::config::GitOpsConfig;
use crate::connection::{
    ConnectionAttempt, RemoteConnectionTester, connected_result, fallback_attempts, list_remote, primary_attempt,
};
use crate::directory::{
    DirectoryManager, DirectoryValidation, IngestionPipeline, IngestionReport, InitializationResult,
    KindRoutingPipeline, LayoutValidation, UnmanagedAction, UnmanagedReport, normalize_directory,
    validate_assignment,
};
use crate::errors::{ErrorScope, classify_error};
use crate::health::{BranchCheck, HealthMonitor, HealthReport, StructureValidation};
use crate::lock::RepositoryLocks;
use crate::metrics::{MetricsAggregator, MetricsSummary};
use crate::model::{ConnectionStatus, Fabric, FabricId, Repository, RepositoryId};
use crate::orchestrator::{FabricGitIntegration, IntegrationResult};
use crate::recovery::{ActionResult, BoxFuture, RecoveryActions, RecoveryEngine, RecoveryPlan};
use crate::store::RecordStore;
use crate::vault::{
    ConnectionTestResult, ConnectionTester, CredentialHealth, CredentialVault, MasterKey, RotationResult, SecretMap,
};
use crate::{Error, Result};

type Listed = (RemoteListing, ConnectionAttempt);

/// Recovery action listing the remote with one connection attempt.
fn listing_action(
    transport: Arc<dyn GitTransport>,
    repository: Repository,
    attempt: ConnectionAttempt,
    timeout: Duration,
    deadline: Deadline,
) -> impl FnMut() -> BoxFuture<'static, ActionResult<Listed>> + Send + 'static {
    move || {
        let transport = transport.clone();
        let repository = repository.clone();
        let attempt = attempt.clone();
        Box::pin(async move {
            let listing = list_remote(transport, &repository, attempt.clone(), timeout, deadline)
                .await
                .map_err(|e| classify_error(&e))?;
            Ok((listing, attempt))
        })
    }
}

pub struct GitOpsService {
    config: GitOpsConfig,
    store: Arc<dyn RecordStore>,
    locks: Arc<RepositoryLocks>,
    transport: Arc<dyn GitTransport>,
    vault: Arc<CredentialVault>,
    monitor: Arc<HealthMonitor>,
    directories: Arc<DirectoryManager>,
    recovery: Arc<RecoveryEngine>,
    metrics: Arc<MetricsAggregator>,
    integration: FabricGitIntegration,
}

impl GitOpsService {
    pub fn new(
        config: GitOpsConfig,
        key: MasterKey,
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn GitTransport>,
    ) -> Self {
        let locks = Arc::new(RepositoryLocks::new());
        let metrics = Arc::new(MetricsAggregator::new(config.metrics.capacity_per_repository));
        let vault = Arc::new(CredentialVault::new(
            Arc::new(key),
            store.clone(),
            locks.clone(),
            config.vault.clone(),
            config.health.stale_validation_days,
        ));
        let monitor = Arc::new(HealthMonitor::new(
            store.clone(),
            vault.clone(),
            transport.clone(),
            metrics.clone(),
            locks.clone(),
            config.git.clone(),
            config.health.clone(),
        ));
        let directories = Arc::new(DirectoryManager::new(
            store.clone(),
            vault.clone(),
            transport.clone(),
            locks.clone(),
            config.git.clone(),
        ));
        let recovery = Arc::new(RecoveryEngine::new(&config.recovery, metrics.clone()));
        let integration = FabricGitIntegration::new(
            store.clone(),
            vault.clone(),
            monitor.clone(),
            directories.clone(),
            recovery.clone(),
        );

        Self {
            config,
            store,
            locks,
            transport,
            vault,
            monitor,
            directories,
            recovery,
            metrics,
            integration,
        }
    }

    pub fn config(&self) -> &GitOpsConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    pub fn recovery(&self) -> &RecoveryEngine {
        &self.recovery
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    fn timeout(&self, repository: &Repository) -> Duration {
        repository.timeout(self.config.git.timeout())
    }

    /// Live connectivity check that records its verdict on the repository.
    ///
    /// The status moves to `testing`, then `connected` or `failed`. A
    /// rejected first attempt is remediated by the recovery engine: transient
    /// failures are retried, authentication and not-found failures try the
    /// alternate URL forms.
    pub async fn test_connection(&self, id: RepositoryId, deadline: Deadline) -> Result<ConnectionTestResult> {
        let _guard = self.locks.write(id).await;
        let repository = self.store.repository(id)?;
        let scope = ErrorScope::repository(id, "test_connection");

        let secrets = match self.vault.decrypt(&repository) {
            Ok(secrets) => secrets,
            Err(e) => {
                let outcome = self
                    .recovery
                    .handle(classify_error(&e), &scope, RecoveryActions::<()>::new())
                    .await;
                self.store
                    .set_connection_status(id, ConnectionStatus::Failed, Some(outcome.error.message.clone()))?;
                return Ok(ConnectionTestResult::failed(&outcome.error));
            }
        };

        let previous = (repository.connection_status, repository.validation_error.clone());
        self.store.set_connection_status(id, ConnectionStatus::Testing, None)?;

        let timeout = self.timeout(&repository);
        let primary = primary_attempt(&repository, &secrets);
        let first = list_remote(self.transport.clone(), &repository, primary.clone(), timeout, deadline).await;

        let listed: ActionResult<Listed> = match first {
            Ok(listing) => Ok((listing, primary)),
            Err(e @ Error::Cancelled { .. }) => {
                self.store.set_connection_status(id, previous.0, previous.1)?;
                return Err(e);
            }
            Err(e) => {
                let mut actions = RecoveryActions::new().retry(listing_action(
                    self.transport.clone(),
                    repository.clone(),
                    primary,
                    timeout,
                    deadline,
                ));
                for attempt in fallback_attempts(&repository, &secrets) {
                    let label = attempt.label.clone();
                    actions = actions.fallback(
                        label,
                        listing_action(self.transport.clone(), repository.clone(), attempt, timeout, deadline),
                    );
                }
                self.recovery.handle(classify_error(&e), &scope, actions).await.into_result()
            }
        };

        match listed {
            Ok((listing, attempt)) => {
                self.store.set_connection_status(id, ConnectionStatus::Connected, None)?;
                self.store.set_last_validated(id, Utc::now())?;
                if let Some(branch) = &listing.head_branch {
                    self.store.set_default_branch(id, branch)?;
                }
                let result = connected_result(&listing, &attempt.auth);
                self.metrics.record_latency(id, result.latency_ms.unwrap_or_default());
                tracing::info!(
                    repository_id = %id,
                    attempt = %attempt.label,
                    latency_ms = result.latency_ms.unwrap_or_default(),
                    "Connection test succeeded"
                );
                Ok(result)
            }
            Err(error) => {
                self.store
                    .set_connection_status(id, ConnectionStatus::Failed, Some(error.message.clone()))?;
                tracing::warn!(repository_id = %id, code = error.code, "Connection test failed");
                Ok(ConnectionTestResult::failed(&error))
            }
        }
    }

    /// Rotate credentials, verifying them against the live remote.
    pub async fn rotate_credentials(&self, id: RepositoryId, new_secrets: &SecretMap) -> RotationResult {
        let tester = RemoteConnectionTester::new(self.transport.clone(), self.config.git.timeout());
        self.vault.rotate(id, new_secrets, &tester).await
    }

    /// Rotate credentials, verifying them with `tester`.
    pub async fn rotate_credentials_with(
        &self,
        id: RepositoryId,
        new_secrets: &SecretMap,
        tester: &dyn ConnectionTester,
    ) -> RotationResult {
        self.vault.rotate(id, new_secrets, tester).await
    }

    pub async fn set_credentials(&self, id: RepositoryId, secrets: &SecretMap) -> Result<()> {
        self.vault.set_credentials(id, secrets).await
    }

    pub fn credential_health(&self, id: RepositoryId) -> Result<CredentialHealth> {
        self.vault.health(id)
    }

    pub async fn get_health_report(&self, id: RepositoryId, deadline: Deadline) -> Result<HealthReport> {
        self.monitor.probe(id, deadline).await
    }

    pub async fn check_branches(&self, id: RepositoryId, names: &[String], deadline: Deadline) -> Result<BranchCheck> {
        self.monitor.check_branches(id, names, deadline).await
    }

    pub async fn validate_directory_structure(
        &self,
        id: RepositoryId,
        paths: &[String],
        deadline: Deadline,
    ) -> Result<StructureValidation> {
        self.monitor.validate_directory_structure(id, paths, deadline).await
    }

    /// Check assigning `directory` on `repository_id`, ignoring `exclude`.
    pub fn validate_directory_assignment(
        &self,
        repository_id: RepositoryId,
        directory: &str,
        exclude: Option<FabricId>,
    ) -> Result<DirectoryValidation> {
        self.store.repository(repository_id)?;
        let others: Vec<Fabric> = self
            .store
            .fabrics_for_repository(repository_id)?
            .into_iter()
            .filter(|fabric| Some(fabric.id) != exclude)
            .collect();
        Ok(validate_assignment(directory, &others))
    }

    pub async fn suggest_available_directories(&self, repository_id: RepositoryId, deadline: Deadline) -> Result<Vec<String>> {
        self.directories.suggest_available(repository_id, deadline).await
    }

    /// Point `fabric_id` at `directory` of `repository_id`, or detach it.
    ///
    /// The assignment is only written when validation passes; the returned
    /// validation says which happened.
    pub async fn assign_fabric_directory(
        &self,
        fabric_id: FabricId,
        repository_id: Option<RepositoryId>,
        directory: &str,
    ) -> Result<DirectoryValidation> {
        self.store.fabric(fabric_id)?;
        let Some(repository_id) = repository_id else {
            self.store.set_fabric_assignment(fabric_id, None, "/")?;
            tracing::info!(fabric_id = %fabric_id, "Fabric detached from its repository");
            return Ok(DirectoryValidation {
                is_valid: true,
                normalized_directory: None,
                conflicts: Vec::new(),
                suggestions: Vec::new(),
            });
        };

        let _guard = self.locks.write(repository_id).await;
        let validation = self.validate_directory_assignment(repository_id, directory, Some(fabric_id))?;
        if validation.is_valid {
            let normalized = normalize_directory(directory)?;
            self.store
                .set_fabric_assignment(fabric_id, Some(repository_id), &normalized)?;
            tracing::info!(
                fabric_id = %fabric_id,
                repository_id = %repository_id,
                directory = %normalized,
                warnings = validation.warnings().count(),
                "Fabric directory assigned"
            );
        }
        Ok(validation)
    }

    /// Delete a repository no fabric references.
    pub async fn delete_repository(&self, id: RepositoryId) -> Result<()> {
        let _guard = self.locks.write(id).await;
        self.store.delete_repository(id)?;
        tracing::info!(repository_id = %id, "Repository deleted");
        Ok(())
    }

    pub async fn provision_fabric_git_integration(
        &self,
        fabric_id: FabricId,
        deadline: Deadline,
    ) -> Result<IntegrationResult> {
        self.integration.provision(fabric_id, deadline).await
    }

    pub async fn initialize_directories(
        &self,
        fabric_id: FabricId,
        force: bool,
        deadline: Deadline,
    ) -> Result<InitializationResult> {
        self.directories.initialize(fabric_id, force, deadline).await
    }

    pub async fn validate_directories(&self, fabric_id: FabricId, deadline: Deadline) -> Result<LayoutValidation> {
        self.directories.validate(fabric_id, deadline).await
    }

    /// Ingest pending raw files with the kind-routing pipeline.
    pub async fn ingest_raw(&self, fabric_id: FabricId, deadline: Deadline) -> Result<IngestionReport> {
        self.ingest_raw_with(fabric_id, Arc::new(KindRoutingPipeline), deadline).await
    }

    pub async fn ingest_raw_with(
        &self,
        fabric_id: FabricId,
        pipeline: Arc<dyn IngestionPipeline>,
        deadline: Deadline,
    ) -> Result<IngestionReport> {
        self.directories.ingest_raw(fabric_id, pipeline, deadline).await
    }

    pub async fn handle_unmanaged(
        &self,
        fabric_id: FabricId,
        action: UnmanagedAction,
        deadline: Deadline,
    ) -> Result<UnmanagedReport> {
        self.directories.handle_unmanaged(fabric_id, action, deadline).await
    }

    pub fn create_recovery_plan(&self) -> RecoveryPlan {
        self.recovery.create_recovery_plan(Utc::now())
    }

    pub fn metrics_summary(&self, id: RepositoryId, window: Option<usize>) -> MetricsSummary {
        self.metrics.aggregate(id, window)
    }

    pub fn dashboard(&self) -> Vec<MetricsSummary> {
        self.metrics.dashboard()
    }
}
