//! End-to-end provisioning of a fabric's Git integration
//!
//! Steps run strictly in order: credential, health, directory validation,
//! directory initialization. A failing step goes through the recovery engine
//! with a retry of the step before the provisioning gives up. Initialization
//! failures are recorded on the fabric but never fail the provisioning.

use std::future::Future;
use std::sync::Arc;

use gitops_git::Deadline;
use serde::Serialize;

use crate::directory::{DirectoryManager, DirectoryValidation, InitializationResult, validate_assignment};
use crate::errors::{ErrorDetails, ErrorScope, classify_error};
use crate::health::{HealthMonitor, HealthReport};
use crate::model::{Fabric, FabricId, FabricStatus, HealthStatus, RepositoryId};
use crate::recovery::{ActionResult, RecoveryActions, RecoveryEngine};
use crate::store::RecordStore;
use crate::vault::{CredentialHealth, CredentialVault, StrengthReport};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    Credential,
    Health,
    DirectoryValidation,
    DirectoryInitialization,
}

impl ProvisionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStep::Credential => "credential",
            ProvisionStep::Health => "health",
            ProvisionStep::DirectoryValidation => "directory_validation",
            ProvisionStep::DirectoryInitialization => "directory_initialization",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialStatus {
    pub has_credentials: bool,
    /// Strength of the stored secret, when there is one
    pub strength: Option<StrengthReport>,
    pub health: CredentialHealth,
}

/// Outcome of provisioning one fabric.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationResult {
    pub fabric_id: FabricId,
    pub repository_id: RepositoryId,
    pub success: bool,
    pub message: String,
    pub credential_status: Option<CredentialStatus>,
    pub health_status: Option<HealthStatus>,
    pub health_report: Option<HealthReport>,
    pub directory_validation: Option<DirectoryValidation>,
    pub gitops_initialization: Option<InitializationResult>,
    /// Step that stopped the provisioning
    pub failed_step: Option<ProvisionStep>,
    /// Failure of the stopping step, or of a non-fatal initialization
    pub error: Option<ErrorDetails>,
}

impl IntegrationResult {
    fn new(fabric_id: FabricId, repository_id: RepositoryId) -> Self {
        Self {
            fabric_id,
            repository_id,
            success: false,
            message: String::new(),
            credential_status: None,
            health_status: None,
            health_report: None,
            directory_validation: None,
            gitops_initialization: None,
            failed_step: None,
            error: None,
        }
    }

    fn stop(mut self, step: ProvisionStep, message: impl Into<String>, error: Option<ErrorDetails>) -> Self {
        self.success = false;
        self.failed_step = Some(step);
        self.message = message.into();
        self.error = error;
        tracing::warn!(
            fabric_id = %self.fabric_id,
            repository_id = %self.repository_id,
            step = step.as_str(),
            message = %self.message,
            "Fabric provisioning stopped"
        );
        self
    }
}

/// Composes the vault, monitor, validator and manager for one fabric.
pub struct FabricGitIntegration {
    store: Arc<dyn RecordStore>,
    vault: Arc<CredentialVault>,
    monitor: Arc<HealthMonitor>,
    directories: Arc<DirectoryManager>,
    recovery: Arc<RecoveryEngine>,
}

impl FabricGitIntegration {
    pub fn new(
        store: Arc<dyn RecordStore>,
        vault: Arc<CredentialVault>,
        monitor: Arc<HealthMonitor>,
        directories: Arc<DirectoryManager>,
        recovery: Arc<RecoveryEngine>,
    ) -> Self {
        Self {
            store,
            vault,
            monitor,
            directories,
            recovery,
        }
    }

    /// Run `step`, remediating a failure through the recovery engine.
    ///
    /// Cancellation is never remediated.
    async fn run_step<T, F, Fut>(&self, fabric: &Fabric, step: ProvisionStep, mut run: F) -> ActionResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let error = match run().await {
            Ok(value) => return Ok(value),
            Err(e @ Error::Cancelled { .. }) => return Err(classify_error(&e)),
            Err(e) => classify_error(&e),
        };

        let scope = ErrorScope::fabric(fabric.id, fabric.repository, step.as_str());
        let actions = RecoveryActions::new().retry(move || {
            let attempt = run();
            async move { attempt.await.map_err(|e| classify_error(&e)) }
        });
        self.recovery.handle(error, &scope, actions).await.into_result()
    }

    fn credential_status(&self, repository_id: RepositoryId) -> Result<CredentialStatus> {
        let repository = self.store.repository(repository_id)?;
        let secrets = self.vault.decrypt(&repository)?;
        let strength = (!secrets.is_empty()).then(|| self.vault.validate_strength(&secrets, repository.auth_type));
        Ok(CredentialStatus {
            has_credentials: !secrets.is_empty(),
            strength,
            health: self.vault.health_of(&repository, chrono::Utc::now()),
        })
    }

    /// Provision the Git integration of `fabric_id`.
    ///
    /// Fails outright only when the fabric or its repository cannot be found;
    /// step failures are reported in the result.
    pub async fn provision(&self, fabric_id: FabricId, deadline: Deadline) -> Result<IntegrationResult> {
        let fabric = self.store.fabric(fabric_id)?;
        let repository_id = fabric.repository.ok_or(Error::FabricUnassigned { fabric: fabric_id })?;
        self.store.repository(repository_id)?;
        let mut result = IntegrationResult::new(fabric_id, repository_id);

        tracing::info!(fabric_id = %fabric_id, repository_id = %repository_id, "Provisioning fabric Git integration");

        // Credential
        let credentials = self
            .run_step(&fabric, ProvisionStep::Credential, move || async move {
                self.credential_status(repository_id)
            })
            .await;
        match credentials {
            Ok(status) => result.credential_status = Some(status),
            Err(e) => {
                let message = format!("Credential check failed: {}", e.message);
                return Ok(result.stop(ProvisionStep::Credential, message, Some(e.details())));
            }
        }

        // Health
        let report = self
            .run_step(&fabric, ProvisionStep::Health, move || self.monitor.probe(repository_id, deadline))
            .await;
        match report {
            Ok(report) => {
                let status = report.overall_status;
                result.health_status = Some(status);
                result.health_report = Some(report);
                if !status.is_operational() {
                    let message = format!("Repository is {status}; provisioning stopped");
                    return Ok(result.stop(ProvisionStep::Health, message, None));
                }
            }
            Err(e) => {
                let message = format!("Health probe failed: {}", e.message);
                return Ok(result.stop(ProvisionStep::Health, message, Some(e.details())));
            }
        }

        // Directory validation
        let others: Vec<Fabric> = self
            .store
            .fabrics_for_repository(repository_id)?
            .into_iter()
            .filter(|other| other.id != fabric_id)
            .collect();
        let validation = validate_assignment(&fabric.gitops_directory, &others);
        let valid = validation.is_valid;
        result.directory_validation = Some(validation);
        if !valid {
            let message = format!("Directory {} conflicts with another fabric", fabric.gitops_directory);
            return Ok(result.stop(ProvisionStep::DirectoryValidation, message, None));
        }

        // Directory initialization, non-fatal
        let initialization = self
            .run_step(&fabric, ProvisionStep::DirectoryInitialization, move || {
                self.directories.initialize(fabric_id, false, deadline)
            })
            .await;
        match initialization {
            Ok(outcome) => {
                if !outcome.success {
                    tracing::warn!(fabric_id = %fabric_id, errors = ?outcome.errors, "Directory initialization incomplete");
                }
                result.gitops_initialization = Some(outcome);
            }
            Err(e) => {
                tracing::warn!(fabric_id = %fabric_id, code = e.code, "Directory initialization failed; continuing");
                result.error = Some(e.details());
            }
        }

        self.store.set_fabric_status(fabric_id, FabricStatus::Active)?;
        result.success = true;
        result.message = match &result.gitops_initialization {
            Some(init) if init.success => "Fabric Git integration provisioned".to_string(),
            _ => "Fabric Git integration provisioned; directory initialization needs attention".to_string(),
        };
        tracing::info!(fabric_id = %fabric_id, repository_id = %repository_id, "Fabric Git integration provisioned");
        Ok(result)
    }
}
