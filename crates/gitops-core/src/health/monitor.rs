//! Health probes against live remotes

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gitops_fs::{NormalizedPath, io};
use gitops_git::{Deadline, GitTransport, RemoteListing};
use serde_json::json;

use super::{
    BranchCheck, HealthCheck, HealthReport, PerformanceMetrics, StructureValidation, aggregate,
    classify_latency, classify_usage, collect_recommendations,
};
use crate::config::{GitSettings, HealthSettings};
use crate::connection::{clone_target, list_remote, primary_attempt};
use crate::errors::classify_error;
use crate::lock::RepositoryLocks;
use crate::metrics::MetricsAggregator;
use crate::model::{ConnectionStatus, DiscoveredResource, HealthSnapshot, HealthStatus, Repository, RepositoryId, parse_documents};
use crate::network::with_transient_clone;
use crate::store::RecordStore;
use crate::vault::{CredentialVault, SecretMap};
use crate::{Error, Result};

pub const CONNECTION_CHECK: &str = "connection";
pub const AUTHENTICATION_CHECK: &str = "authentication";
pub const PERFORMANCE_CHECK: &str = "performance";
pub const USAGE_CHECK: &str = "usage";

/// Credential health score below which authentication counts as degraded.
const CREDENTIAL_SCORE_FLOOR: u8 = 50;

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Runs probes and auxiliary checks for repositories.
pub struct HealthMonitor {
    store: Arc<dyn RecordStore>,
    vault: Arc<CredentialVault>,
    transport: Arc<dyn GitTransport>,
    metrics: Arc<MetricsAggregator>,
    locks: Arc<RepositoryLocks>,
    git: GitSettings,
    settings: HealthSettings,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        vault: Arc<CredentialVault>,
        transport: Arc<dyn GitTransport>,
        metrics: Arc<MetricsAggregator>,
        locks: Arc<RepositoryLocks>,
        git: GitSettings,
        settings: HealthSettings,
    ) -> Self {
        Self {
            store,
            vault,
            transport,
            metrics,
            locks,
            git,
            settings,
        }
    }

    fn timeout_for(&self, repository: &Repository) -> Duration {
        repository.timeout(self.git.timeout())
    }

    /// Probe `id` and write the verdict back to its connection status.
    ///
    /// A cancelled probe returns [`Error::Cancelled`] and writes nothing.
    /// The verdict is written back, so probes of one repository run one at a
    /// time under its write lock.
    pub async fn probe(&self, id: RepositoryId, deadline: Deadline) -> Result<HealthReport> {
        let _guard = self.locks.write(id).await;
        let started = Instant::now();
        let repository = self.store.repository(id)?;

        let (connection, remote) = self.connection_check(&repository, deadline).await?;
        let connection_failure = (connection.status != HealthStatus::Healthy).then(|| connection.message.clone());
        let mut checks = vec![connection];
        let mut performance = PerformanceMetrics::default();

        if let Some((_secrets, listing)) = remote {
            checks.push(self.authentication_check(&repository));
            let (check, metrics) = self.performance_check(&repository, &listing);
            checks.push(check);
            performance = metrics;
            checks.push(self.usage_check(&repository)?);
        }

        let overall = aggregate(&checks);
        let (status, error) = if overall.is_operational() {
            (ConnectionStatus::Connected, None)
        } else {
            (ConnectionStatus::Failed, connection_failure.or_else(|| Some(format!("health probe reported {overall}"))))
        };
        self.store.set_connection_status(id, status, error)?;
        self.metrics.record_health(id, overall);

        let elapsed = started.elapsed();
        performance.probe_duration_ms = millis(elapsed);
        let recommendations = collect_recommendations(&checks);
        let summary: Vec<serde_json::Value> = checks
            .iter()
            .map(|check| json!({ "name": check.name, "status": check.status }))
            .collect();
        let snapshot = HealthSnapshot::new(
            overall,
            format!("Repository '{}' is {overall}", repository.name),
            json!({ "checks": summary }),
            elapsed,
        );

        tracing::info!(
            repository_id = %id,
            status = %overall,
            checks = checks.len(),
            duration_ms = millis(elapsed),
            "Health probe finished"
        );

        Ok(HealthReport {
            repository_id: id,
            overall_status: overall,
            checks,
            performance_metrics: performance,
            recommendations,
            snapshot,
        })
    }

    async fn connection_check(
        &self,
        repository: &Repository,
        deadline: Deadline,
    ) -> Result<(HealthCheck, Option<(SecretMap, RemoteListing)>)> {
        let started = Instant::now();
        let secrets = match self.vault.decrypt(repository) {
            Ok(secrets) => secrets,
            Err(e) => {
                let classified = classify_error(&e);
                tracing::error!(repository_id = %repository.id, code = classified.code, "Stored credentials unusable");
                let check = HealthCheck::failed(CONNECTION_CHECK, HealthStatus::Critical, &classified)
                    .with_duration(started.elapsed());
                return Ok((check, None));
            }
        };

        let attempt = primary_attempt(repository, &secrets);
        let result = list_remote(
            self.transport.clone(),
            repository,
            attempt,
            self.timeout_for(repository),
            deadline,
        )
        .await;

        match result {
            Ok(listing) => {
                let latency = millis(listing.latency);
                let check = HealthCheck::new(CONNECTION_CHECK, HealthStatus::Healthy, format!("Remote answered in {latency} ms"))
                    .with_details(json!({
                        "latency_ms": latency,
                        "head_branch": listing.head_branch,
                        "branches": listing.branches.len(),
                        "empty": listing.is_empty(),
                    }))
                    .with_duration(started.elapsed());
                Ok((check, Some((secrets, listing))))
            }
            Err(e @ Error::Cancelled { .. }) => Err(e),
            Err(e) => {
                let status = if e.is_timeout() {
                    HealthStatus::Unhealthy
                } else {
                    HealthStatus::Critical
                };
                let classified = classify_error(&e);
                tracing::warn!(
                    repository_id = %repository.id,
                    category = %classified.category,
                    code = classified.code,
                    "Connection check failed"
                );
                let check = HealthCheck::failed(CONNECTION_CHECK, status, &classified).with_duration(started.elapsed());
                Ok((check, None))
            }
        }
    }

    fn authentication_check(&self, repository: &Repository) -> HealthCheck {
        if !repository.has_credentials() {
            return if repository.is_private {
                HealthCheck::new(
                    AUTHENTICATION_CHECK,
                    HealthStatus::Unhealthy,
                    "Private repository has no stored credentials",
                )
                .recommend("Store credentials for this private repository")
            } else {
                HealthCheck::new(AUTHENTICATION_CHECK, HealthStatus::Healthy, "Public repository; anonymous access")
            };
        }

        let credential = self.vault.health_of(repository, Utc::now());
        let details = serde_json::to_value(&credential).unwrap_or(serde_json::Value::Null);
        let message = format!("Credential health score {}/100", credential.health_score);
        let status = if credential.health_score < CREDENTIAL_SCORE_FLOOR {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        let mut check = HealthCheck::new(AUTHENTICATION_CHECK, status, message).with_details(details);
        check.recommendations = credential.recommendations;
        check
    }

    fn performance_check(&self, repository: &Repository, listing: &RemoteListing) -> (HealthCheck, PerformanceMetrics) {
        let current = millis(listing.latency);
        let window = self.settings.latency_window.max(1);
        let mut readings = self.metrics.recent_latencies(repository.id, window - 1);
        readings.push(current);
        self.metrics.record_latency(repository.id, current);

        let average = readings.iter().sum::<u64>() as f64 / readings.len() as f64;
        let (status, label) = classify_latency(average);
        let mut check = HealthCheck::new(
            PERFORMANCE_CHECK,
            status,
            format!("Average latency {average:.0} ms ({label})"),
        )
        .with_details(json!({ "average_latency_ms": average, "samples": readings.len(), "rating": label }));
        if status != HealthStatus::Healthy {
            check = check.recommend("Investigate network latency to the Git host or raise the repository timeout");
        }

        let metrics = PerformanceMetrics {
            connection_latency_ms: Some(current),
            average_latency_ms: Some(average),
            samples: readings.len(),
            probe_duration_ms: 0,
        };
        (check, metrics)
    }

    fn usage_check(&self, repository: &Repository) -> Result<HealthCheck> {
        let fabrics = self.store.fabrics_for_repository(repository.id)?.len();
        let (status, message) = classify_usage(fabrics);
        let mut check = HealthCheck::new(USAGE_CHECK, status, message).with_details(json!({ "fabric_count": fabrics }));
        if fabrics == 0 {
            check = check.recommend("Assign the repository to a fabric or remove it");
        }
        Ok(check)
    }

    /// Which of `names` exist on the remote, from a transient clone.
    pub async fn check_branches(&self, id: RepositoryId, names: &[String], deadline: Deadline) -> Result<BranchCheck> {
        let _guard = self.locks.read(id).await;
        let repository = self.store.repository(id)?;
        let secrets = self.vault.decrypt(&repository)?;
        let target = clone_target(&repository, &secrets, self.git.clone_depth);
        let names = names.to_vec();

        with_transient_clone("check_branches", self.transport.clone(), target, self.timeout_for(&repository), deadline, move |session| {
            let remote: BTreeSet<String> = session.clone.remote_branches()?.into_iter().collect();
            let (available, missing): (Vec<String>, Vec<String>) =
                names.into_iter().partition(|name| remote.contains(name));
            Ok(BranchCheck {
                available,
                missing,
                current_branch: session.clone.branch().to_string(),
                current_commit: session.clone.commit_sha().map(str::to_string),
            })
        })
        .await
    }

    /// Check that `paths` exist in the repository and count custom resource files in each.
    pub async fn validate_directory_structure(
        &self,
        id: RepositoryId,
        paths: &[String],
        deadline: Deadline,
    ) -> Result<StructureValidation> {
        let _guard = self.locks.read(id).await;
        let repository = self.store.repository(id)?;
        let secrets = self.vault.decrypt(&repository)?;
        let target = clone_target(&repository, &secrets, self.git.clone_depth);
        let paths = paths.to_vec();

        with_transient_clone(
            "validate_directory_structure",
            self.transport.clone(),
            target,
            self.timeout_for(&repository),
            deadline,
            move |session| Ok(inspect_paths(session.clone.root(), &paths)),
        )
        .await
    }
}

/// Inspect `paths` below `root`.
pub fn inspect_paths(root: &NormalizedPath, paths: &[String]) -> StructureValidation {
    let mut result = StructureValidation::default();
    for path in paths {
        let relative = path.trim_matches('/');
        let dir = if relative.is_empty() { root.clone() } else { root.join(relative) };
        if !dir.starts_with(root) || !dir.is_dir() {
            result.missing.push(path.clone());
            continue;
        }
        result.valid.push(path.clone());

        let files = match io::list_files(&dir, &[".git"]) {
            Ok(files) => files,
            Err(e) => {
                result.errors.push(format!("{path}: {e}"));
                continue;
            }
        };
        let mut crd_files = Vec::new();
        for file in files.iter().filter(|f| matches!(f.extension(), Some("yaml" | "yml"))) {
            let content = match io::read_text(&dir.join(file.as_str())) {
                Ok(content) => content,
                Err(e) => {
                    result.errors.push(format!("{path}/{file}: {e}"));
                    continue;
                }
            };
            match parse_documents(&content) {
                Ok(documents) => {
                    if documents.iter().any(|doc| DiscoveredResource::from_yaml(doc).is_some()) {
                        crd_files.push(file.as_str().to_string());
                    }
                }
                Err(e) => result.errors.push(format!("{path}/{file}: {e}")),
            }
        }
        result.crd_files_by_dir.insert(path.clone(), crd_files);
    }
    result
}
