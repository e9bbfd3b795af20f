//! Remediation strategies and retry timing

use std::fmt;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use serde::{Deserialize, Serialize};

use crate::config::RecoverySettings;

/// Bounded exponential retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Number of times the retry action is invoked
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Upper bound of a single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RecoverySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            multiplier: settings.multiplier,
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }

    /// Deterministic backoff: no jitter and no elapsed-time limit.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_randomization_factor(0.0)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build()
    }

    /// The delay slept before each retry attempt.
    ///
    /// The first retry runs immediately; backoff applies between retries.
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = self.backoff();
        (0..self.max_retries)
            .map(|n| {
                if n == 0 {
                    Duration::ZERO
                } else {
                    backoff.next_backoff().unwrap_or(self.max_delay)
                }
            })
            .collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RecoverySettings::default())
    }
}

/// How a classified failure is remediated.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStrategy {
    Retry(RetryPolicy),
    Fallback,
    Rollback,
    Escalate,
}

impl RecoveryStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            RecoveryStrategy::Retry(_) => StrategyKind::Retry,
            RecoveryStrategy::Fallback => StrategyKind::Fallback,
            RecoveryStrategy::Rollback => StrategyKind::Rollback,
            RecoveryStrategy::Escalate => StrategyKind::Escalate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Retry,
    Fallback,
    Rollback,
    Escalate,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Retry => "retry",
            StrategyKind::Fallback => "fallback",
            StrategyKind::Rollback => "rollback",
            StrategyKind::Escalate => "escalate",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
