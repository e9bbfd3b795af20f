//! Error taxonomy
//!
//! Failures are turned into a [`ClassifiedError`] by the [`classifier`] and
//! then handed to the [`RecoveryEngine`](crate::recovery::RecoveryEngine).
//! Only [`ErrorDetails`], which omits the internal detail text, ever reaches a
//! caller.

pub mod classifier;
pub mod codes;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{FabricId, RepositoryId};

pub use classifier::{classify_error, classify_message};

/// What kind of failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Connection,
    Authentication,
    Permission,
    Timeout,
    Repository,
    Network,
    Configuration,
    Validation,
    State,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 10] = [
        ErrorCategory::Connection,
        ErrorCategory::Authentication,
        ErrorCategory::Permission,
        ErrorCategory::Timeout,
        ErrorCategory::Repository,
        ErrorCategory::Network,
        ErrorCategory::Configuration,
        ErrorCategory::Validation,
        ErrorCategory::State,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Connection => "connection",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Repository => "repository",
            ErrorCategory::Network => "network",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Validation => "validation",
            ErrorCategory::State => "state",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Transient categories that an automatic retry may fix.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Connection | ErrorCategory::Timeout | ErrorCategory::Network
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure mapped onto the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub code: &'static str,
    /// Canonical, user-safe description
    pub message: String,
    /// Auxiliary fields pulled out of the raw failure
    pub context: BTreeMap<String, String>,
    pub recommendations: Vec<String>,
    /// Raw failure text; written to the audit log only
    pub detail: String,
}

impl ClassifiedError {
    /// The projection safe to return to callers.
    pub fn details(&self) -> ErrorDetails {
        ErrorDetails {
            category: self.category,
            severity: self.severity,
            code: self.code.to_string(),
            message: self.message.clone(),
            context: self.context.clone(),
            recommendations: self.recommendations.clone(),
        }
    }

    /// Attach a context entry, keeping an existing value.
    pub fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.entry(key.to_string()).or_insert_with(|| value.into());
        self
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ClassifiedError {}

impl From<crate::Error> for ClassifiedError {
    fn from(err: crate::Error) -> Self {
        classify_error(&err)
    }
}

/// User-facing description of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub recommendations: Vec<String>,
}

/// One occurrence of a classified failure, kept for pattern analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub repository: Option<RepositoryId>,
    pub fabric: Option<FabricId>,
    pub operation: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub resolution_attempted: bool,
    pub resolved: bool,
    pub occurred_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ErrorRecord {
    pub fn new(error: &ClassifiedError, scope: &ErrorScope) -> Self {
        Self {
            id: Uuid::new_v4(),
            repository: scope.repository,
            fabric: scope.fabric,
            operation: scope.operation.clone(),
            category: error.category,
            severity: error.severity,
            code: error.code.to_string(),
            message: error.message.clone(),
            context: error.context.clone(),
            resolution_attempted: false,
            resolved: false,
            occurred_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Record the outcome of a remediation attempt.
    pub fn mark_attempted(&mut self, resolved: bool) {
        self.resolution_attempted = true;
        self.resolved = resolved;
        if resolved {
            self.resolved_at = Some(Utc::now());
        }
    }
}

/// Where a failure happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorScope {
    pub repository: Option<RepositoryId>,
    pub fabric: Option<FabricId>,
    pub operation: String,
}

impl ErrorScope {
    pub fn repository(id: RepositoryId, operation: impl Into<String>) -> Self {
        Self {
            repository: Some(id),
            fabric: None,
            operation: operation.into(),
        }
    }

    pub fn fabric(fabric: FabricId, repository: Option<RepositoryId>, operation: impl Into<String>) -> Self {
        Self {
            repository,
            fabric: Some(fabric),
            operation: operation.into(),
        }
    }

    /// Human-readable entity reference for logs.
    pub fn entity(&self) -> String {
        match (self.fabric, self.repository) {
            (Some(fabric), Some(repository)) => format!("fabric {fabric} (repository {repository})"),
            (Some(fabric), None) => format!("fabric {fabric}"),
            (None, Some(repository)) => format!("repository {repository}"),
            (None, None) => "subsystem".to_string(),
        }
    }
}
