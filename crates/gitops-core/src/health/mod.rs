//! Repository health
//!
//! A probe runs the connection check first. Only when the remote answered do
//! the authentication, performance and usage checks run; otherwise the
//! connection verdict stands alone. The overall status is the worst status of
//! the checks that ran.

pub mod monitor;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ClassifiedError;
use crate::model::{HealthSnapshot, HealthStatus, RepositoryId};

pub use monitor::HealthMonitor;

/// Result of one check within a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    pub details: serde_json::Value,
    pub duration: Duration,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl HealthCheck {
    pub fn new(name: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            details: serde_json::Value::Null,
            duration: Duration::ZERO,
            recommendations: Vec::new(),
        }
    }

    /// A check that failed with a classified error.
    pub fn failed(name: &str, status: HealthStatus, error: &ClassifiedError) -> Self {
        Self {
            details: serde_json::to_value(error.details()).unwrap_or(serde_json::Value::Null),
            recommendations: error.recommendations.clone(),
            ..Self::new(name, status, error.message.clone())
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn recommend(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendations.push(recommendation.into());
        self
    }
}

/// Worst status present; healthy when there is nothing to judge.
pub fn worst_status(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
    statuses.into_iter().max().unwrap_or(HealthStatus::Healthy)
}

/// Overall status of a set of checks.
pub fn aggregate(checks: &[HealthCheck]) -> HealthStatus {
    worst_status(checks.iter().map(|check| check.status))
}

/// Classify a rolling average latency.
pub fn classify_latency(average_ms: f64) -> (HealthStatus, &'static str) {
    if average_ms < 1000.0 {
        (HealthStatus::Healthy, "excellent")
    } else if average_ms < 3000.0 {
        (HealthStatus::Healthy, "good")
    } else if average_ms < 5000.0 {
        (HealthStatus::Degraded, "slow")
    } else {
        (HealthStatus::Unhealthy, "very slow")
    }
}

/// Classify how many fabrics depend on a repository.
pub fn classify_usage(fabrics: usize) -> (HealthStatus, String) {
    match fabrics {
        0 => (HealthStatus::Degraded, "repository not in use".to_string()),
        1..=4 => (HealthStatus::Healthy, format!("used by {fabrics} fabric(s)")),
        _ => (HealthStatus::Healthy, format!("heavily used by {fabrics} fabrics")),
    }
}

/// Latency figures gathered during a probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Latency of this probe's connection
    pub connection_latency_ms: Option<u64>,
    /// Rolling average including this probe
    pub average_latency_ms: Option<f64>,
    /// Readings behind the average
    pub samples: usize,
    pub probe_duration_ms: u64,
}

/// Full result of a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub repository_id: RepositoryId,
    pub overall_status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    pub performance_metrics: PerformanceMetrics,
    pub recommendations: Vec<String>,
    pub snapshot: HealthSnapshot,
}

impl HealthReport {
    pub fn check(&self, name: &str) -> Option<&HealthCheck> {
        self.checks.iter().find(|check| check.name == name)
    }
}

/// Recommendations of every non-healthy check, deduplicated in order.
pub fn collect_recommendations(checks: &[HealthCheck]) -> Vec<String> {
    let mut recommendations: Vec<String> = Vec::new();
    for check in checks.iter().filter(|c| c.status != HealthStatus::Healthy) {
        for recommendation in &check.recommendations {
            if !recommendations.contains(recommendation) {
                recommendations.push(recommendation.clone());
            }
        }
    }
    recommendations
}

/// Branch availability on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCheck {
    pub available: Vec<String>,
    pub missing: Vec<String>,
    pub current_branch: String,
    pub current_commit: Option<String>,
}

/// Presence and content of expected directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureValidation {
    pub valid: Vec<String>,
    pub missing: Vec<String>,
    /// Files holding at least one custom resource, per valid directory
    pub crd_files_by_dir: BTreeMap<String, Vec<String>>,
    pub errors: Vec<String>,
}
