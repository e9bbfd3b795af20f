//! Recovery planning from recent failure patterns
//!
//! Looks at the newest [`PLAN_WINDOW`] error records, names the recurring
//! patterns among them and proposes an ordered list of operator steps.
//! Authentication failures are counted over every retained record.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorCategory, ErrorRecord};

/// Number of recent records analysed for a plan.
pub const PLAN_WINDOW: usize = 50;

/// Share of one category above which it counts as recurring.
const RECURRING_SHARE: f64 = 0.30;
/// Errors within the last hour above which they count as a burst.
const BURST_THRESHOLD: usize = 5;
/// Authentication errors above which access is considered broken.
const AUTH_THRESHOLD: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
    /// `recurring_<category>_errors`, `error_burst` or `persistent_auth_issues`
    pub name: String,
    pub category: Option<ErrorCategory>,
    pub occurrences: usize,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStep {
    pub order: u32,
    pub action: String,
    pub description: String,
    pub estimated_duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub created_at: DateTime<Utc>,
    pub analyzed_errors: usize,
    pub patterns: Vec<ErrorPattern>,
    pub steps: Vec<RecoveryStep>,
    /// Between 0.3 and 0.9
    pub estimated_success_probability: f64,
    pub estimated_duration: Duration,
}

/// Detect recurring patterns in `records` as of `now`.
///
/// Category shares and bursts use the newest [`PLAN_WINDOW`] records; the
/// authentication total uses all of `records`.
pub fn detect_patterns(records: &[ErrorRecord], now: DateTime<Utc>) -> Vec<ErrorPattern> {
    let window = &records[records.len().saturating_sub(PLAN_WINDOW)..];
    let mut patterns = Vec::new();
    if window.is_empty() {
        return patterns;
    }

    let mut by_category: BTreeMap<ErrorCategory, usize> = BTreeMap::new();
    for record in window {
        *by_category.entry(record.category).or_default() += 1;
    }
    for (category, count) in &by_category {
        let share = *count as f64 / window.len() as f64;
        if share > RECURRING_SHARE {
            patterns.push(ErrorPattern {
                name: format!("recurring_{}_errors", category.as_str()),
                category: Some(*category),
                occurrences: *count,
                description: format!(
                    "{:.0}% of recent errors are {} errors",
                    share * 100.0,
                    category.as_str()
                ),
            });
        }
    }

    let hour_ago = now - chrono::Duration::hours(1);
    let recent = window.iter().filter(|r| r.occurred_at >= hour_ago).count();
    if recent > BURST_THRESHOLD {
        patterns.push(ErrorPattern {
            name: "error_burst".to_string(),
            category: None,
            occurrences: recent,
            description: format!("{recent} errors in the last hour"),
        });
    }

    let auth = records
        .iter()
        .filter(|record| record.category == ErrorCategory::Authentication)
        .count();
    if auth > AUTH_THRESHOLD {
        patterns.push(ErrorPattern {
            name: "persistent_auth_issues".to_string(),
            category: Some(ErrorCategory::Authentication),
            occurrences: auth,
            description: format!("{auth} authentication failures"),
        });
    }

    patterns
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// Step that addresses `pattern`, as `(action, description, estimate)`.
fn step_for(pattern: &ErrorPattern) -> (&'static str, &'static str, Duration) {
    if pattern.name == "error_burst" {
        return (
            "throttle_operations",
            "Pause automated probes and provisioning until the burst settles",
            minutes(2),
        );
    }
    match pattern.category {
        Some(ErrorCategory::Authentication) => (
            "rotate_credentials",
            "Verify the stored credentials and rotate any that are expired or revoked",
            minutes(10),
        ),
        Some(ErrorCategory::Connection | ErrorCategory::Network | ErrorCategory::Timeout) => (
            "check_network",
            "Check DNS, proxies and connectivity to the Git hosts; raise timeouts for slow remotes",
            minutes(5),
        ),
        Some(ErrorCategory::Permission) => (
            "review_access",
            "Review repository and RBAC permissions granted to the service account",
            minutes(15),
        ),
        Some(ErrorCategory::Repository) => (
            "verify_repositories",
            "Confirm repository URLs and branches still exist",
            minutes(5),
        ),
        Some(ErrorCategory::Configuration | ErrorCategory::Validation) => (
            "review_configuration",
            "Review subsystem configuration and the YAML documents being processed",
            minutes(10),
        ),
        Some(ErrorCategory::State) => (
            "reconcile_records",
            "Reconcile repository and fabric records with the Git remotes",
            minutes(10),
        ),
        Some(ErrorCategory::Unknown) | None => (
            "investigate_logs",
            "Inspect the audit log for the failing operations",
            minutes(15),
        ),
    }
}

/// Build a plan from `records` as of `now`.
pub fn create_plan(records: &[ErrorRecord], now: DateTime<Utc>) -> RecoveryPlan {
    let analyzed_errors = records.len().min(PLAN_WINDOW);
    let patterns = detect_patterns(records, now);

    let mut steps: Vec<RecoveryStep> = Vec::new();
    for pattern in &patterns {
        let (action, description, estimate) = step_for(pattern);
        if steps.iter().any(|step| step.action == action) {
            continue;
        }
        steps.push(RecoveryStep {
            order: 0,
            action: action.to_string(),
            description: description.to_string(),
            estimated_duration: estimate,
        });
    }
    if !patterns.is_empty() {
        steps.push(RecoveryStep {
            order: 0,
            action: "verify_recovery".to_string(),
            description: "Re-run health probes on the affected repositories".to_string(),
            estimated_duration: minutes(3),
        });
    }
    for (index, step) in steps.iter_mut().enumerate() {
        step.order = u32::try_from(index + 1).unwrap_or(u32::MAX);
    }

    let estimated_success_probability = (0.9 - 0.15 * patterns.len() as f64).max(0.3);
    let estimated_duration = steps.iter().map(|step| step.estimated_duration).sum();

    RecoveryPlan {
        created_at: now,
        analyzed_errors,
        patterns,
        steps,
        estimated_success_probability,
        estimated_duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorScope, classify_message};
    use pretty_assertions::assert_eq;

    fn record(message: &str, occurred_at: DateTime<Utc>) -> ErrorRecord {
        let mut record = ErrorRecord::new(&classify_message(message), &ErrorScope::default());
        record.occurred_at = occurred_at;
        record
    }

    #[test]
    fn quiet_history_has_no_patterns() {
        let plan = create_plan(&[], Utc::now());
        assert!(plan.patterns.is_empty());
        assert!(plan.steps.is_empty());
        assert_eq!(plan.estimated_success_probability, 0.9);
    }

    #[test]
    fn detects_recurring_burst_and_auth() {
        let now = Utc::now();
        let records: Vec<ErrorRecord> = (0..6)
            .map(|_| record("authentication failed", now))
            .chain((0..2).map(|_| record("connection refused", now - chrono::Duration::hours(3))))
            .collect();

        let names: Vec<String> = detect_patterns(&records, now)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "recurring_authentication_errors".to_string(),
                "error_burst".to_string(),
                "persistent_auth_issues".to_string(),
            ]
        );

        let plan = create_plan(&records, now);
        let actions: Vec<&str> = plan.steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["rotate_credentials", "throttle_operations", "verify_recovery"]);
        assert!((plan.estimated_success_probability - 0.45).abs() < 1e-9);
        assert_eq!(plan.estimated_duration, minutes(15));
        assert_eq!(plan.steps[2].order, 3);
    }

    #[test]
    fn only_the_newest_window_is_analysed() {
        let now = Utc::now();
        let old = now - chrono::Duration::days(2);
        let mut records: Vec<ErrorRecord> = (0..60).map(|_| record("connection refused", old)).collect();
        records.extend((0..PLAN_WINDOW).map(|_| record("repository not found", old)));
        let patterns = detect_patterns(&records, now);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].name, "recurring_repository_errors");
    }

    #[test]
    fn authentication_failures_count_beyond_the_window() {
        let now = Utc::now();
        let old = now - chrono::Duration::days(2);
        let mut records: Vec<ErrorRecord> = (0..4).map(|_| record("authentication failed", old)).collect();
        records.extend((0..PLAN_WINDOW).map(|_| record("connection refused", old)));

        let patterns = detect_patterns(&records, now);
        let auth = patterns.iter().find(|p| p.name == "persistent_auth_issues").unwrap();
        assert_eq!(auth.occurrences, 4);
        assert!(!patterns.iter().any(|p| p.name == "recurring_authentication_errors"));
    }

    #[test]
    fn probability_is_floored() {
        let now = Utc::now();
        let records: Vec<ErrorRecord> = (0..4)
            .map(|_| record("authentication failed", now))
            .chain((0..4).map(|_| record("connection refused", now)))
            .collect();
        let plan = create_plan(&records, now);
        assert_eq!(plan.patterns.len(), 4);
        assert!((plan.estimated_success_probability - 0.3).abs() < 1e-9);
    }
}
