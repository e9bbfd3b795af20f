//! Repository health and directory management for fabric GitOps
//!
//! This crate coordinates the Layer 0 crates into the subsystem that keeps
//! each fabric's GitOps repository usable:
//!
//! - **CredentialVault**: encrypted per-repository secrets, strength checks, atomic rotation
//! - **HealthMonitor**: layered connection, authentication, performance and usage checks
//! - **Directory validation and management**: conflict-free fabric directories with a fixed
//!   raw/unmanaged/managed layout
//! - **Error classification and recovery**: a typed failure taxonomy with retry, fallback,
//!   rollback and escalation
//! - **MetricsAggregator**: rolling latency, health and recovery figures per repository
//!
//! # Architecture
//!
//! ```text
//!                  CLI / API / UI
//!                        |
//!                  GitOpsService
//!                        |
//!               FabricGitIntegration
//!                        |
//!   +--------+--------+--+-------+-----------+
//!   |        |        |          |           |
//! vault   health  directory  recovery    metrics
//!   |        |        |
//!   +--------+--------+
//!            |
//!     gitops-fs  gitops-git
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gitops_core::{GitOpsConfig, GitOpsService, MasterKey, MemoryStore};
//! use gitops_git::{Deadline, Git2Transport};
//!
//! async fn example() -> gitops_core::Result<()> {
//!     let config = GitOpsConfig::default();
//!     let key = MasterKey::from_env(&config.vault.master_key_env)?;
//!     let transport = Arc::new(Git2Transport::new(&config.git.author_name, &config.git.author_email));
//!     let service = GitOpsService::new(config, key, Arc::new(MemoryStore::new()), transport);
//!     let report = service.get_health_report(gitops_core::RepositoryId(1), Deadline::none()).await?;
//!     println!("{}", report.overall_status);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod errors;
pub mod health;
pub mod lock;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod network;
pub mod orchestrator;
pub mod recovery;
pub mod service;
pub mod store;
pub mod vault;

pub use config::GitOpsConfig;
pub use directory::{
    ConflictSeverity, ConflictType, DirectoryConflict, DirectoryManager, DirectoryValidation, InitializationResult,
    UnmanagedAction,
};
pub use error::{Error, Result};
pub use errors::{ClassifiedError, ErrorCategory, ErrorDetails, ErrorRecord, Severity, classify_error, classify_message};
pub use health::{HealthCheck, HealthMonitor, HealthReport};
pub use lock::RepositoryLocks;
pub use metrics::{MetricsAggregator, MetricsSummary};
pub use model::{
    AuthType, ConnectionStatus, DirectoryStatus, Fabric, FabricId, FabricStatus, GitProvider, HealthStatus, Repository,
    RepositoryId,
};
pub use orchestrator::{FabricGitIntegration, IntegrationResult};
pub use recovery::{RecoveryEngine, RecoveryOutcome, RecoveryPlan, RecoveryStatus, RecoveryStrategy};
pub use service::GitOpsService;
pub use store::{MemoryStore, RecordStore};
pub use vault::{CredentialVault, MasterKey, RotationResult, RotationStatus, SecretMap};
