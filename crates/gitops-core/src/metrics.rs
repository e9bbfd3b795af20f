//! Rolling health and performance metrics
//!
//! Each repository owns a bounded ring buffer of time-stamped samples.
//! Recording is an O(1) push; aggregates are computed on read.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{HealthStatus, RepositoryId};

/// What a sample measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricKind {
    /// Round trip of a remote operation
    Latency { millis: u64 },
    /// Overall verdict of a health probe
    Health { status: HealthStatus },
    /// Outcome of a remediation
    Recovery { success: bool, attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub kind: MetricKind,
}

impl MetricSample {
    pub fn now(kind: MetricKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Direction of latency over the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
    InsufficientData,
}

/// Aggregates over a repository's recent samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub repository_id: RepositoryId,
    pub samples: usize,
    pub avg_latency_ms: Option<f64>,
    pub min_latency_ms: Option<u64>,
    pub max_latency_ms: Option<u64>,
    pub p95_latency_ms: Option<u64>,
    /// Share of health probes that ended healthy or degraded
    pub success_rate: Option<f64>,
    pub status_distribution: BTreeMap<String, usize>,
    pub recovery_success_rate: Option<f64>,
    pub trend: Trend,
    pub last_sample_at: Option<DateTime<Utc>>,
}

/// Per-repository sample buffers.
#[derive(Debug)]
pub struct MetricsAggregator {
    capacity: usize,
    buffers: Mutex<HashMap<RepositoryId, VecDeque<MetricSample>>>,
}

impl MetricsAggregator {
    /// Keep at most `capacity` samples per repository.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    fn buffers(&self) -> MutexGuard<'_, HashMap<RepositoryId, VecDeque<MetricSample>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample, evicting the oldest when the buffer is full.
    pub fn record(&self, repository: RepositoryId, sample: MetricSample) {
        let mut buffers = self.buffers();
        let buffer = buffers.entry(repository).or_default();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(sample);
    }

    pub fn record_latency(&self, repository: RepositoryId, millis: u64) {
        self.record(repository, MetricSample::now(MetricKind::Latency { millis }));
    }

    pub fn record_health(&self, repository: RepositoryId, status: HealthStatus) {
        self.record(repository, MetricSample::now(MetricKind::Health { status }));
    }

    pub fn record_recovery(&self, repository: RepositoryId, success: bool, attempts: u32) {
        self.record(
            repository,
            MetricSample::now(MetricKind::Recovery { success, attempts }),
        );
    }

    /// The newest `window` samples, oldest first.
    pub fn samples(&self, repository: RepositoryId, window: Option<usize>) -> Vec<MetricSample> {
        let buffers = self.buffers();
        let Some(buffer) = buffers.get(&repository) else {
            return Vec::new();
        };
        let take = window.unwrap_or(buffer.len()).min(buffer.len());
        buffer.iter().skip(buffer.len() - take).copied().collect()
    }

    /// The newest `count` latency readings, oldest first.
    pub fn recent_latencies(&self, repository: RepositoryId, count: usize) -> Vec<u64> {
        let buffers = self.buffers();
        let Some(buffer) = buffers.get(&repository) else {
            return Vec::new();
        };
        let mut latest: Vec<u64> = buffer
            .iter()
            .rev()
            .filter_map(|sample| match sample.kind {
                MetricKind::Latency { millis } => Some(millis),
                _ => None,
            })
            .take(count)
            .collect();
        latest.reverse();
        latest
    }

    /// Mean of the newest `count` latency readings.
    pub fn recent_average_latency(&self, repository: RepositoryId, count: usize) -> Option<f64> {
        mean(&self.recent_latencies(repository, count))
    }

    /// Aggregate the newest `window` samples (all when `None`).
    pub fn aggregate(&self, repository: RepositoryId, window: Option<usize>) -> MetricsSummary {
        summarize(repository, &self.samples(repository, window))
    }

    /// Summaries of every repository observed so far.
    pub fn dashboard(&self) -> Vec<MetricsSummary> {
        let mut ids: Vec<RepositoryId> = self.buffers().keys().copied().collect();
        ids.sort();
        ids.into_iter().map(|id| self.aggregate(id, None)).collect()
    }
}

fn mean(values: &[u64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<u64>() as f64 / values.len() as f64)
}

/// Nearest-rank percentile of sorted values.
fn percentile(sorted: &[u64], pct: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}

/// Compare the mean latency of the older and newer halves.
fn trend(latencies: &[u64]) -> Trend {
    if latencies.len() < 4 {
        return Trend::InsufficientData;
    }
    let (older, newer) = latencies.split_at(latencies.len() / 2);
    let (Some(before), Some(after)) = (mean(older), mean(newer)) else {
        return Trend::InsufficientData;
    };
    if after > before * 1.1 {
        Trend::Degrading
    } else if after < before * 0.9 {
        Trend::Improving
    } else {
        Trend::Stable
    }
}

fn summarize(repository_id: RepositoryId, samples: &[MetricSample]) -> MetricsSummary {
    let mut latencies = Vec::new();
    let mut statuses = BTreeMap::new();
    let mut operational = 0usize;
    let mut probes = 0usize;
    let mut recoveries = 0usize;
    let mut recovered = 0usize;

    for sample in samples {
        match sample.kind {
            MetricKind::Latency { millis } => latencies.push(millis),
            MetricKind::Health { status } => {
                probes += 1;
                if status.is_operational() {
                    operational += 1;
                }
                *statuses.entry(status.as_str().to_string()).or_insert(0) += 1;
            }
            MetricKind::Recovery { success, .. } => {
                recoveries += 1;
                if success {
                    recovered += 1;
                }
            }
        }
    }

    let trend = trend(&latencies);
    let avg_latency_ms = mean(&latencies);
    let mut sorted = latencies;
    sorted.sort_unstable();
    let ratio = |hits: usize, total: usize| (total > 0).then(|| hits as f64 / total as f64);

    MetricsSummary {
        repository_id,
        samples: samples.len(),
        avg_latency_ms,
        min_latency_ms: sorted.first().copied(),
        max_latency_ms: sorted.last().copied(),
        p95_latency_ms: percentile(&sorted, 95.0),
        success_rate: ratio(operational, probes),
        status_distribution: statuses,
        recovery_success_rate: ratio(recovered, recoveries),
        trend,
        last_sample_at: samples.last().map(|sample| sample.timestamp),
    }
}
