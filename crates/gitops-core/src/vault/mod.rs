//! Credential vault
//!
//! Stores each repository's secret encrypted under the process master key,
//! judges credential strength and age, and rotates credentials atomically:
//! back up, apply, verify, and restore the backup when verification fails.
//! Rotation holds the repository's write lock for its whole duration.

pub mod backup;
pub mod crypto;
pub mod secrets;
pub mod strength;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitops_fs::checksum::short_fingerprint;
use serde::{Deserialize, Serialize};

use crate::config::VaultSettings;
use crate::errors::{ClassifiedError, ErrorDetails, classify_error};
use crate::lock::RepositoryLocks;
use crate::model::{ConnectionStatus, CredentialMeta, Repository, RepositoryId};
use crate::store::RecordStore;
use crate::{Error, Result};

pub use backup::{BackupStore, CredentialBackup};
pub use crypto::MasterKey;
pub use secrets::SecretMap;
pub use strength::{Strength, StrengthReport, validate_strength};

/// Outcome of a live connectivity check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    /// Whether credentials were presented and accepted
    pub authenticated: bool,
    pub default_branch: Option<String>,
    pub latency_ms: Option<u64>,
    pub details: Option<ErrorDetails>,
}

impl ConnectionTestResult {
    pub fn connected(
        message: impl Into<String>,
        authenticated: bool,
        default_branch: Option<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            success: true,
            message: message.into(),
            authenticated,
            default_branch,
            latency_ms: Some(latency_ms),
            details: None,
        }
    }

    pub fn failed(error: &ClassifiedError) -> Self {
        Self {
            success: false,
            message: error.message.clone(),
            authenticated: false,
            default_branch: None,
            latency_ms: None,
            details: Some(error.details()),
        }
    }
}

/// Verifies that a repository is reachable with a given secret.
#[async_trait]
pub trait ConnectionTester: Send + Sync {
    async fn test(&self, repository: &Repository, secrets: &SecretMap) -> ConnectionTestResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStatus {
    Success,
    Failed,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationResult {
    pub status: RotationStatus,
    pub message: String,
    pub strength: Option<StrengthReport>,
    pub backup_created: bool,
    pub connection: Option<ConnectionTestResult>,
    pub details: Option<ErrorDetails>,
}

impl RotationResult {
    fn failed(message: impl Into<String>, error: Option<&ClassifiedError>) -> Self {
        Self {
            status: RotationStatus::Failed,
            message: message.into(),
            strength: None,
            backup_created: false,
            connection: None,
            details: error.map(ClassifiedError::details),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RotationStatus::Success
    }
}

/// Age and upkeep assessment of a repository's credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialHealth {
    pub repository_id: RepositoryId,
    pub has_credentials: bool,
    pub age_days: i64,
    pub rotation_due: bool,
    /// 0-100, higher is better
    pub health_score: u8,
    pub recommendations: Vec<String>,
}

/// Score credential upkeep for `repository` as of `now`.
pub fn credential_health(
    repository: &Repository,
    now: DateTime<Utc>,
    rotation_days: i64,
    stale_validation_days: i64,
) -> CredentialHealth {
    let reference = repository
        .credential_meta
        .reference_time()
        .unwrap_or(repository.created_at);
    let age_days = (now - reference).num_days().max(0);
    let rotation_due = age_days > rotation_days;
    let mut score: i32 = 100;
    let mut recommendations = Vec::new();

    score -= match age_days {
        d if d > 365 => 50,
        d if d > 180 => 30,
        d if d > 90 => 15,
        _ => 0,
    };
    if rotation_due {
        recommendations.push(format!(
            "Rotate the credentials: they are {age_days} days old (rotation is due every {rotation_days} days)"
        ));
    }

    if repository.connection_status != ConnectionStatus::Connected {
        score -= 20;
        recommendations.push("Run a connection test to confirm the credentials work".to_string());
    }

    match repository.last_validated {
        None => {
            score -= 10;
            recommendations.push("Validate the repository connection; it has never been validated".to_string());
        }
        Some(at) if (now - at).num_days() > stale_validation_days => {
            score -= 5;
            recommendations.push(format!(
                "Re-validate the repository connection; the last validation is older than {stale_validation_days} days"
            ));
        }
        Some(_) => {}
    }

    if !repository.has_credentials() && repository.is_private {
        recommendations.push("Store credentials for this private repository".to_string());
    }

    CredentialHealth {
        repository_id: repository.id,
        has_credentials: repository.has_credentials(),
        age_days,
        rotation_due,
        health_score: u8::try_from(score.clamp(0, 100)).unwrap_or(0),
        recommendations,
    }
}

/// Encrypted credential storage bound to a record store.
pub struct CredentialVault {
    key: Arc<MasterKey>,
    store: Arc<dyn RecordStore>,
    locks: Arc<RepositoryLocks>,
    backups: BackupStore,
    settings: VaultSettings,
    stale_validation_days: i64,
}

impl CredentialVault {
    pub fn new(
        key: Arc<MasterKey>,
        store: Arc<dyn RecordStore>,
        locks: Arc<RepositoryLocks>,
        settings: VaultSettings,
        stale_validation_days: i64,
    ) -> Self {
        Self {
            key,
            store,
            locks,
            backups: BackupStore::new(settings.backup_retention),
            settings,
            stale_validation_days,
        }
    }

    /// Encrypt and store `secrets` as the repository's credentials.
    pub async fn set_credentials(&self, id: RepositoryId, secrets: &SecretMap) -> Result<()> {
        let _guard = self.locks.write(id).await;
        let repository = self.store.repository(id)?;
        let encrypted = self.key.encrypt(&secrets.to_canonical_bytes()?)?;
        let fingerprint = short_fingerprint(encrypted.as_bytes());
        let meta = CredentialMeta {
            created_at: Some(Utc::now()),
            last_rotated: None,
            rotation_count: repository.credential_meta.rotation_count,
        };
        self.store.set_credentials(id, Some(encrypted), meta)?;
        tracing::info!(repository_id = %id, secrets = ?secrets, fingerprint = %fingerprint, "Stored repository credentials");
        Ok(())
    }

    /// Decrypt the repository's credentials; empty when none are stored.
    pub fn get_credentials(&self, id: RepositoryId) -> Result<SecretMap> {
        self.decrypt(&self.store.repository(id)?)
    }

    /// Decrypt the credentials carried by a repository record.
    pub fn decrypt(&self, repository: &Repository) -> Result<SecretMap> {
        match &repository.encrypted_credentials {
            None => Ok(SecretMap::new()),
            Some(encrypted) => {
                let plaintext = self.key.decrypt(encrypted)?;
                SecretMap::from_canonical_bytes(&plaintext)
            }
        }
    }

    pub fn validate_strength(&self, secrets: &SecretMap, auth_type: crate::model::AuthType) -> StrengthReport {
        validate_strength(secrets, auth_type)
    }

    /// Replace the repository's credentials, verifying them with `tester`.
    ///
    /// A failed verification restores the previous secret and connection
    /// status and reports [`RotationStatus::Rollback`]. Failures before the
    /// new secret is applied leave the record untouched.
    pub async fn rotate(
        &self,
        id: RepositoryId,
        new_secrets: &SecretMap,
        tester: &dyn ConnectionTester,
    ) -> RotationResult {
        let _guard = self.locks.write(id).await;

        let repository = match self.store.repository(id) {
            Ok(repository) => repository,
            Err(e) => return RotationResult::failed(e.to_string(), Some(&classify_error(&e))),
        };

        let strength = validate_strength(new_secrets, repository.auth_type);
        if !strength.valid {
            tracing::warn!(repository_id = %id, issues = ?strength.issues, "Rejected credentials for rotation");
            return RotationResult {
                message: format!("New credentials rejected: {}", strength.issues.join("; ")),
                strength: Some(strength),
                ..RotationResult::failed("", None)
            };
        }

        let encrypted = match new_secrets
            .to_canonical_bytes()
            .and_then(|bytes| self.key.encrypt(&bytes))
        {
            Ok(encrypted) => encrypted,
            Err(e) => {
                return RotationResult {
                    strength: Some(strength),
                    ..RotationResult::failed(e.to_string(), Some(&classify_error(&e)))
                };
            }
        };

        let fingerprint = short_fingerprint(encrypted.as_bytes());
        let backup = CredentialBackup::capture(&repository);
        self.backups.push(id, backup.clone());

        let now = Utc::now();
        let meta = CredentialMeta {
            created_at: repository.credential_meta.created_at.or(Some(now)),
            last_rotated: Some(now),
            rotation_count: repository.credential_meta.rotation_count.saturating_add(1),
        };
        let applied = self
            .store
            .set_credentials(id, Some(encrypted.clone()), meta.clone())
            .and_then(|_| self.store.set_connection_status(id, ConnectionStatus::Testing, None));
        if let Err(e) = applied {
            return self.abort(id, &backup, strength, &e);
        }

        let mut candidate = repository;
        candidate.encrypted_credentials = Some(encrypted);
        candidate.credential_meta = meta;
        candidate.connection_status = ConnectionStatus::Testing;
        let test = tester.test(&candidate, new_secrets).await;

        if test.success {
            let committed = self
                .store
                .set_connection_status(id, ConnectionStatus::Connected, None)
                .and_then(|_| self.store.set_last_validated(id, Utc::now()));
            if let Err(e) = committed {
                return self.abort(id, &backup, strength, &e);
            }
            tracing::info!(
                repository_id = %id,
                rotation_count = candidate.credential_meta.rotation_count,
                fingerprint = %fingerprint,
                "Rotated repository credentials"
            );
            return RotationResult {
                status: RotationStatus::Success,
                message: "Credentials rotated and verified".to_string(),
                strength: Some(strength),
                backup_created: true,
                connection: Some(test),
                details: None,
            };
        }

        match self.restore(id, &backup) {
            Ok(()) => {
                tracing::warn!(
                    repository_id = %id,
                    error = %test.message,
                    "Rotated credentials failed verification; restored previous credentials"
                );
                RotationResult {
                    status: RotationStatus::Rollback,
                    message: format!("New credentials failed verification: {}", test.message),
                    strength: Some(strength),
                    backup_created: true,
                    details: test.details.clone(),
                    connection: Some(test),
                }
            }
            Err(e) => {
                tracing::error!(repository_id = %id, error = %e, "Restoring credential backup failed");
                RotationResult {
                    strength: Some(strength),
                    backup_created: true,
                    connection: Some(test),
                    ..RotationResult::failed(
                        format!("Rollback failed after verification failure: {e}"),
                        Some(&classify_error(&e)),
                    )
                }
            }
        }
    }

    /// Put back a backup after a failed write and report the failure.
    fn abort(&self, id: RepositoryId, backup: &CredentialBackup, strength: StrengthReport, cause: &Error) -> RotationResult {
        if let Err(e) = self.restore(id, backup) {
            tracing::error!(repository_id = %id, error = %e, "Restoring credential backup failed");
        }
        RotationResult {
            strength: Some(strength),
            backup_created: true,
            ..RotationResult::failed(cause.to_string(), Some(&classify_error(cause)))
        }
    }

    fn restore(&self, id: RepositoryId, backup: &CredentialBackup) -> Result<()> {
        self.store
            .set_credentials(id, backup.encrypted.clone(), backup.meta.clone())?;
        self.store
            .set_connection_status(id, backup.connection_status, backup.validation_error.clone())
    }

    /// Credential age and upkeep of a stored repository.
    pub fn health(&self, id: RepositoryId) -> Result<CredentialHealth> {
        let repository = self.store.repository(id)?;
        Ok(self.health_of(&repository, Utc::now()))
    }

    pub fn health_of(&self, repository: &Repository, now: DateTime<Utc>) -> CredentialHealth {
        credential_health(
            repository,
            now,
            self.settings.rotation_days,
            self.stale_validation_days,
        )
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }
}
