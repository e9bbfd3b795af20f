//! Subsystem settings
//!
//! Every section is optional in the settings file; missing values fall back
//! to the defaults below. Files are read through [`gitops_fs::ConfigStore`],
//! so TOML, JSON and YAML are all accepted.

use std::time::Duration;

use gitops_fs::{ConfigStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Network and commit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    /// Default timeout for every network operation
    pub timeout_secs: u64,
    /// History depth of transient clones, `0` for full history
    pub clone_depth: u32,
    /// Branch used when the remote does not advertise one
    pub default_branch: String,
    pub author_name: String,
    pub author_email: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            clone_depth: 1,
            default_branch: "main".to_string(),
            author_name: "Fabric GitOps".to_string(),
            author_email: "gitops@localhost".to_string(),
        }
    }
}

impl GitSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSettings {
    /// Environment variable holding the master secret
    pub master_key_env: String,
    /// Credential backups kept per repository
    pub backup_retention: usize,
    /// Credential age after which rotation is due
    pub rotation_days: i64,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            master_key_env: "GITOPS_MASTER_KEY".to_string(),
            backup_retention: 5,
            rotation_days: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Latency samples averaged by the performance check
    pub latency_window: usize,
    /// Days after which a successful validation counts as stale
    pub stale_validation_days: i64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            latency_window: 10,
            stale_validation_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Error records kept for pattern analysis
    pub history_capacity: usize,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            history_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub capacity_per_repository: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            capacity_per_repository: 1000,
        }
    }
}

/// Complete subsystem configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitOpsConfig {
    pub git: GitSettings,
    pub vault: VaultSettings,
    pub health: HealthSettings,
    pub recovery: RecoverySettings,
    pub metrics: MetricsSettings,
}

impl GitOpsConfig {
    /// Load and validate settings from a `.toml`, `.json` or `.yaml` file.
    pub fn load(path: &NormalizedPath) -> Result<Self> {
        let config: Self = ConfigStore::new().load(path)?;
        config.validate()?;
        tracing::debug!(path = %path, "Loaded GitOps configuration");
        Ok(config)
    }

    /// Reject settings the subsystem cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.git.timeout_secs == 0 {
            return Err(Error::Config("git.timeout_secs must be greater than zero".into()));
        }
        if self.vault.backup_retention == 0 {
            return Err(Error::Config("vault.backup_retention must keep at least one backup".into()));
        }
        if self.vault.rotation_days <= 0 {
            return Err(Error::Config("vault.rotation_days must be positive".into()));
        }
        if self.recovery.max_retries == 0 {
            return Err(Error::Config("recovery.max_retries must be at least one".into()));
        }
        if self.recovery.multiplier.is_nan() || self.recovery.multiplier < 1.0 {
            return Err(Error::Config("recovery.multiplier must be at least 1.0".into()));
        }
        if self.recovery.max_delay_ms < self.recovery.base_delay_ms {
            return Err(Error::Config("recovery.max_delay_ms must not be below base_delay_ms".into()));
        }
        if self.metrics.capacity_per_repository == 0 || self.recovery.history_capacity == 0 {
            return Err(Error::Config("buffer capacities must be greater than zero".into()));
        }
        Ok(())
    }
}
