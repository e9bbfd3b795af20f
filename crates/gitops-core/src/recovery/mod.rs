//! Remediation of classified failures
//!
//! Each handled failure moves through classify, select strategy and execute,
//! ending either recovered or escalated. The strategy is looked up by error
//! code, then by category. Recovery actions are supplied by the caller as
//! closures, so the decision of what to run is plain data.
//!
//! Every outcome is written to the error history, recorded as a metric and
//! emitted as one audit event.

pub mod history;
pub mod plan;
pub mod strategy;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::RecoverySettings;
use crate::errors::{ClassifiedError, ErrorCategory, ErrorDetails, ErrorRecord, ErrorScope, codes};
use crate::logging::AUDIT_TARGET;
use crate::metrics::MetricsAggregator;
use crate::{Error, Result};

pub use history::ErrorHistory;
pub use plan::{ErrorPattern, RecoveryPlan, RecoveryStep, create_plan};
pub use strategy::{RecoveryStrategy, RetryPolicy, StrategyKind};

/// Future returned by a recovery action.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a recovery action.
pub type ActionResult<T> = std::result::Result<T, ClassifiedError>;

type Action<'a, T> = Box<dyn FnMut() -> BoxFuture<'a, ActionResult<T>> + Send + 'a>;

fn boxed<'a, T, F, Fut>(mut action: F) -> Action<'a, T>
where
    T: 'a,
    F: FnMut() -> Fut + Send + 'a,
    Fut: Future<Output = ActionResult<T>> + Send + 'a,
{
    Box::new(move || -> BoxFuture<'a, ActionResult<T>> { Box::pin(action()) })
}

/// Actions a caller offers for remediating one failure.
pub struct RecoveryActions<'a, T> {
    retry: Option<Action<'a, T>>,
    fallbacks: Vec<(String, Action<'a, T>)>,
    rollback: Option<Action<'a, ()>>,
}

impl<'a, T> Default for RecoveryActions<'a, T> {
    fn default() -> Self {
        Self {
            retry: None,
            fallbacks: Vec::new(),
            rollback: None,
        }
    }
}

impl<'a, T> RecoveryActions<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-run the failed operation.
    pub fn retry<F, Fut>(mut self, action: F) -> Self
    where
        T: 'a,
        F: FnMut() -> Fut + Send + 'a,
        Fut: Future<Output = ActionResult<T>> + Send + 'a,
    {
        self.retry = Some(boxed(action));
        self
    }

    /// Append an alternative, tried in insertion order.
    pub fn fallback<F, Fut>(mut self, label: impl Into<String>, action: F) -> Self
    where
        T: 'a,
        F: FnMut() -> Fut + Send + 'a,
        Fut: Future<Output = ActionResult<T>> + Send + 'a,
    {
        self.fallbacks.push((label.into(), boxed(action)));
        self
    }

    /// Undo the partial effects of the failed operation.
    pub fn rollback<F, Fut>(mut self, action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'a,
        Fut: Future<Output = ActionResult<()>> + Send + 'a,
    {
        self.rollback = Some(boxed(action));
        self
    }

    fn supports(&self, strategy: &RecoveryStrategy) -> bool {
        match strategy {
            RecoveryStrategy::Retry(_) => self.retry.is_some(),
            RecoveryStrategy::Fallback => !self.fallbacks.is_empty(),
            RecoveryStrategy::Rollback => self.rollback.is_some(),
            RecoveryStrategy::Escalate => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Recovered,
    RetryExhausted,
    FallbackExhausted,
    RolledBack,
    RollbackFailed,
    Escalated,
}

impl RecoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStatus::Recovered => "recovered",
            RecoveryStatus::RetryExhausted => "retry_exhausted",
            RecoveryStatus::FallbackExhausted => "fallback_exhausted",
            RecoveryStatus::RolledBack => "rolled_back",
            RecoveryStatus::RollbackFailed => "rollback_failed",
            RecoveryStatus::Escalated => "escalated",
        }
    }
}

/// What happened while remediating one failure.
#[derive(Debug)]
pub struct RecoveryOutcome<T> {
    pub status: RecoveryStatus,
    pub strategy: StrategyKind,
    /// Recovery actions invoked
    pub attempts: u32,
    pub escalated: bool,
    /// Delays slept before each retry
    pub delays: Vec<Duration>,
    /// Value produced by the action that recovered
    pub value: Option<T>,
    /// The failure still standing, or the one that was recovered from
    pub error: ClassifiedError,
}

impl<T> RecoveryOutcome<T> {
    pub fn success(&self) -> bool {
        self.status == RecoveryStatus::Recovered
    }

    /// The recovered value, or the failure that remains.
    pub fn into_result(self) -> ActionResult<T> {
        match self.value {
            Some(value) if self.status == RecoveryStatus::Recovered => Ok(value),
            _ => Err(self.error),
        }
    }

    /// Caller-facing details of the remaining failure.
    pub fn details(&self) -> Option<ErrorDetails> {
        (!self.success()).then(|| self.error.details())
    }
}

/// Strategy registry plus failure history.
pub struct RecoveryEngine {
    overrides: RwLock<HashMap<String, RecoveryStrategy>>,
    retry_policy: RetryPolicy,
    history: ErrorHistory,
    metrics: Arc<MetricsAggregator>,
}

impl RecoveryEngine {
    pub fn new(settings: &RecoverySettings, metrics: Arc<MetricsAggregator>) -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
            retry_policy: RetryPolicy::from_settings(settings),
            history: ErrorHistory::new(settings.history_capacity),
            metrics,
        }
    }

    /// Register `strategy` for an error code, replacing the default.
    ///
    /// Decryption failures always escalate and cannot be re-registered.
    pub fn register(&self, code: &str, strategy: RecoveryStrategy) -> Result<()> {
        if code == codes::CREDENTIAL_DECRYPTION_FAILED {
            return Err(Error::Config(format!(
                "the recovery strategy for {code} is fixed to escalate"
            )));
        }
        self.overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code.to_string(), strategy);
        Ok(())
    }

    /// Strategy applied to `error`.
    pub fn strategy_for(&self, error: &ClassifiedError) -> RecoveryStrategy {
        if error.code == codes::CREDENTIAL_DECRYPTION_FAILED {
            return RecoveryStrategy::Escalate;
        }
        if let Some(strategy) = self
            .overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(error.code)
        {
            return strategy.clone();
        }
        if error.code == codes::REPOSITORY_NOT_FOUND {
            return RecoveryStrategy::Fallback;
        }
        match error.category {
            ErrorCategory::Timeout | ErrorCategory::Connection | ErrorCategory::Network => {
                RecoveryStrategy::Retry(self.retry_policy.clone())
            }
            ErrorCategory::Authentication => RecoveryStrategy::Fallback,
            ErrorCategory::State => RecoveryStrategy::Rollback,
            _ => RecoveryStrategy::Escalate,
        }
    }

    fn is_retryable(&self, error: &ClassifiedError) -> bool {
        matches!(self.strategy_for(error), RecoveryStrategy::Retry(_))
    }

    pub fn history(&self) -> &ErrorHistory {
        &self.history
    }

    /// Plan operator steps from the retained failure history.
    pub fn create_recovery_plan(&self, now: DateTime<Utc>) -> RecoveryPlan {
        create_plan(&self.history.recent(usize::MAX), now)
    }

    /// Remediate `error` with the actions the caller offers.
    ///
    /// A strategy whose action was not supplied escalates.
    pub async fn handle<'a, T>(
        &self,
        error: ClassifiedError,
        scope: &ErrorScope,
        mut actions: RecoveryActions<'a, T>,
    ) -> RecoveryOutcome<T> {
        let mut record = ErrorRecord::new(&error, scope);
        let mut strategy = self.strategy_for(&error);
        if !actions.supports(&strategy) {
            tracing::debug!(
                code = error.code,
                strategy = %strategy.kind(),
                "No action supplied for strategy; escalating"
            );
            strategy = RecoveryStrategy::Escalate;
        }

        let outcome = match strategy {
            RecoveryStrategy::Retry(policy) => self.run_retry(error, &policy, &mut actions).await,
            RecoveryStrategy::Fallback => Self::run_fallbacks(error, &mut actions).await,
            RecoveryStrategy::Rollback => Self::run_rollback(error, &mut actions).await,
            RecoveryStrategy::Escalate => RecoveryOutcome {
                status: RecoveryStatus::Escalated,
                strategy: StrategyKind::Escalate,
                attempts: 0,
                escalated: true,
                delays: Vec::new(),
                value: None,
                error,
            },
        };

        if outcome.strategy != StrategyKind::Escalate {
            record.mark_attempted(outcome.success());
        }
        self.audit(&outcome, scope);
        if let Some(repository) = scope.repository {
            self.metrics
                .record_recovery(repository, outcome.success(), outcome.attempts);
        }
        self.history.push(record);
        outcome
    }

    async fn run_retry<'a, T>(
        &self,
        error: ClassifiedError,
        policy: &RetryPolicy,
        actions: &mut RecoveryActions<'a, T>,
    ) -> RecoveryOutcome<T> {
        let mut outcome = RecoveryOutcome {
            status: RecoveryStatus::RetryExhausted,
            strategy: StrategyKind::Retry,
            attempts: 0,
            escalated: true,
            delays: Vec::new(),
            value: None,
            error,
        };
        let Some(action) = actions.retry.as_mut() else {
            outcome.status = RecoveryStatus::Escalated;
            return outcome;
        };

        for (attempt, delay) in (1..).zip(policy.delays()) {
            outcome.delays.push(delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome.attempts = attempt;

            match action().await {
                Ok(value) => {
                    outcome.status = RecoveryStatus::Recovered;
                    outcome.escalated = false;
                    outcome.value = Some(value);
                    return outcome;
                }
                Err(next) => {
                    let retryable = self.is_retryable(&next);
                    tracing::debug!(attempt, code = next.code, retryable, "Retry attempt failed");
                    outcome.error = next;
                    if !retryable {
                        outcome.status = RecoveryStatus::Escalated;
                        return outcome;
                    }
                }
            }
        }
        outcome
    }

    async fn run_fallbacks<'a, T>(
        error: ClassifiedError,
        actions: &mut RecoveryActions<'a, T>,
    ) -> RecoveryOutcome<T> {
        let mut outcome = RecoveryOutcome {
            status: RecoveryStatus::FallbackExhausted,
            strategy: StrategyKind::Fallback,
            attempts: 0,
            escalated: true,
            delays: Vec::new(),
            value: None,
            error,
        };
        for (label, action) in actions.fallbacks.iter_mut() {
            outcome.attempts += 1;
            match action().await {
                Ok(value) => {
                    tracing::info!(fallback = %label, "Fallback succeeded");
                    outcome.status = RecoveryStatus::Recovered;
                    outcome.escalated = false;
                    outcome.value = Some(value);
                    return outcome;
                }
                Err(next) => {
                    tracing::debug!(fallback = %label, code = next.code, "Fallback failed");
                    outcome.error = next;
                }
            }
        }
        outcome
    }

    /// A failed rollback is escalated, never retried.
    async fn run_rollback<'a, T>(
        error: ClassifiedError,
        actions: &mut RecoveryActions<'a, T>,
    ) -> RecoveryOutcome<T> {
        let mut outcome = RecoveryOutcome {
            status: RecoveryStatus::RolledBack,
            strategy: StrategyKind::Rollback,
            attempts: 1,
            escalated: false,
            delays: Vec::new(),
            value: None,
            error,
        };
        let Some(action) = actions.rollback.as_mut() else {
            outcome.status = RecoveryStatus::Escalated;
            outcome.escalated = true;
            return outcome;
        };
        if let Err(next) = action().await {
            outcome.status = RecoveryStatus::RollbackFailed;
            outcome.escalated = true;
            outcome.error = next;
        }
        outcome
    }

    fn audit<T>(&self, outcome: &RecoveryOutcome<T>, scope: &ErrorScope) {
        let error = &outcome.error;
        if outcome.escalated {
            tracing::error!(
                target: AUDIT_TARGET,
                entity = %scope.entity(),
                operation = %scope.operation,
                category = %error.category,
                severity = %error.severity,
                code = error.code,
                strategy = %outcome.strategy,
                status = outcome.status.as_str(),
                attempts = outcome.attempts,
                escalated = true,
                message = %error.message,
                detail = %error.detail,
                "Recovery escalated"
            );
        } else {
            tracing::info!(
                target: AUDIT_TARGET,
                entity = %scope.entity(),
                operation = %scope.operation,
                category = %error.category,
                code = error.code,
                strategy = %outcome.strategy,
                status = outcome.status.as_str(),
                attempts = outcome.attempts,
                escalated = false,
                "Recovery finished"
            );
        }
    }
}
