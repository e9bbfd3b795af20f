//! Shared harness for gitops-core integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gitops_core::errors::classify_message;
use gitops_core::model::{AuthType, Fabric, FabricId, Repository, RepositoryId};
use gitops_core::vault::{ConnectionTestResult, ConnectionTester};
use gitops_core::{GitOpsConfig, GitOpsService, MasterKey, MemoryStore, SecretMap};
use gitops_git::{
    CloneOutcome, CloneRequest, Deadline, Git2Transport, GitAuth, GitTransport, PushOutcome, RemoteListing,
};

/// Settings with millisecond retry delays.
pub fn fast_config() -> GitOpsConfig {
    let mut config = GitOpsConfig::default();
    config.recovery.base_delay_ms = 5;
    config.recovery.max_delay_ms = 40;
    config.git.timeout_secs = 30;
    config
}

pub fn service(transport: Arc<dyn GitTransport>) -> GitOpsService {
    service_with(fast_config(), transport)
}

pub fn service_with(config: GitOpsConfig, transport: Arc<dyn GitTransport>) -> GitOpsService {
    let key = MasterKey::from_secret("integration-master-secret").unwrap();
    GitOpsService::new(config, key, Arc::new(MemoryStore::new()), transport)
}

/// Register a public, credential-less repository at `url`.
pub fn add_repository(service: &GitOpsService, id: u64, url: &str) -> RepositoryId {
    let id = RepositoryId(id);
    let repository = Repository::new(id, format!("repo-{}", id.0), url, AuthType::Token).with_privacy(false);
    service.store().insert_repository(repository).unwrap();
    id
}

pub fn add_fabric(service: &GitOpsService, id: u64, name: &str, repository: RepositoryId, directory: &str) -> FabricId {
    let id = FabricId(id);
    service
        .store()
        .insert_fabric(Fabric::new(id, name).with_repository(repository, directory))
        .unwrap();
    id
}

pub fn strong_token(tag: &str) -> SecretMap {
    SecretMap::new().with("token", format!("ghp_{tag}{}", "a".repeat(40)))
}

pub fn url_of(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

fn failure(message: &str) -> gitops_git::Error {
    gitops_git::Error::Io(std::io::Error::other(message.to_string()))
}

/// A real libgit2 transport that fails on demand.
pub struct FlakyTransport {
    inner: Git2Transport,
    message: String,
    listing_failures: AtomicUsize,
    push_failures: AtomicUsize,
    rejected_url: Option<String>,
    stall: Option<Duration>,
    listing_calls: AtomicUsize,
    clone_calls: AtomicUsize,
}

impl FlakyTransport {
    pub fn new() -> Self {
        Self {
            inner: Git2Transport::default(),
            message: "connection refused".to_string(),
            listing_failures: AtomicUsize::new(0),
            push_failures: AtomicUsize::new(0),
            rejected_url: None,
            stall: None,
            listing_calls: AtomicUsize::new(0),
            clone_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` listings with `message`.
    pub fn failing_listings(mut self, count: usize, message: &str) -> Self {
        self.listing_failures = AtomicUsize::new(count);
        self.message = message.to_string();
        self
    }

    pub fn failing_pushes(mut self, count: usize, message: &str) -> Self {
        self.push_failures = AtomicUsize::new(count);
        self.message = message.to_string();
        self
    }

    /// Answer every listing of exactly `url` with "repository not found".
    pub fn rejecting(mut self, url: &str) -> Self {
        self.rejected_url = Some(url.to_string());
        self
    }

    /// Sleep for `stall` before every listing.
    pub fn stalling(mut self, stall: Duration) -> Self {
        self.stall = Some(stall);
        self
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    pub fn clone_calls(&self) -> usize {
        self.clone_calls.load(Ordering::SeqCst)
    }
}

impl GitTransport for FlakyTransport {
    fn clone_repository(
        &self,
        request: &CloneRequest,
        auth: &GitAuth,
        deadline: Deadline,
    ) -> gitops_git::Result<CloneOutcome> {
        self.clone_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.clone_repository(request, auth, deadline)
    }

    fn commit_and_push(
        &self,
        dir: &Path,
        message: &str,
        branch: &str,
        auth: &GitAuth,
        deadline: Deadline,
    ) -> gitops_git::Result<PushOutcome> {
        if take(&self.push_failures) {
            return Err(gitops_git::Error::PushFailed {
                message: self.message.clone(),
            });
        }
        self.inner.commit_and_push(dir, message, branch, auth, deadline)
    }

    fn list_remote(&self, url: &str, auth: &GitAuth, deadline: Deadline) -> gitops_git::Result<RemoteListing> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if self.rejected_url.as_deref() == Some(url) {
            return Err(failure("repository not found"));
        }
        if take(&self.listing_failures) {
            return Err(failure(&self.message));
        }
        if let Some(stall) = self.stall {
            std::thread::sleep(stall);
        }
        self.inner.list_remote(url, auth, deadline)
    }
}

/// Connection tester with a fixed verdict.
pub struct ScriptedTester {
    succeed: bool,
    calls: AtomicUsize,
}

impl ScriptedTester {
    pub fn accepting() -> Self {
        Self {
            succeed: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            succeed: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionTester for ScriptedTester {
    async fn test(&self, _repository: &Repository, _secrets: &SecretMap) -> ConnectionTestResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            ConnectionTestResult::connected("remote reachable", true, Some("main".to_string()), 12)
        } else {
            ConnectionTestResult::failed(&classify_message("authentication failed for remote"))
        }
    }
}

/// Shared, ordered log of what ran when.
pub type EventLog = Arc<Mutex<Vec<String>>>;

fn log_event(log: &EventLog, event: &str) {
    log.lock().unwrap().push(event.to_string());
}

/// A real libgit2 transport that logs the start and end of listings and
/// pushes, optionally stalling each one without looking at the deadline.
pub struct RecordingTransport {
    inner: Git2Transport,
    events: EventLog,
    listing_stall: Option<Duration>,
    push_stall: Option<Duration>,
}

impl RecordingTransport {
    pub fn new(events: EventLog) -> Self {
        Self {
            inner: Git2Transport::default(),
            events,
            listing_stall: None,
            push_stall: None,
        }
    }

    pub fn stalling_listings(mut self, stall: Duration) -> Self {
        self.listing_stall = Some(stall);
        self
    }

    pub fn stalling_pushes(mut self, stall: Duration) -> Self {
        self.push_stall = Some(stall);
        self
    }
}

impl GitTransport for RecordingTransport {
    fn clone_repository(
        &self,
        request: &CloneRequest,
        auth: &GitAuth,
        deadline: Deadline,
    ) -> gitops_git::Result<CloneOutcome> {
        self.inner.clone_repository(request, auth, deadline)
    }

    fn commit_and_push(
        &self,
        dir: &Path,
        message: &str,
        branch: &str,
        auth: &GitAuth,
        deadline: Deadline,
    ) -> gitops_git::Result<PushOutcome> {
        log_event(&self.events, "push:start");
        if let Some(stall) = self.push_stall {
            std::thread::sleep(stall);
        }
        let outcome = self.inner.commit_and_push(dir, message, branch, auth, deadline);
        log_event(&self.events, "push:end");
        outcome
    }

    fn list_remote(&self, url: &str, auth: &GitAuth, deadline: Deadline) -> gitops_git::Result<RemoteListing> {
        log_event(&self.events, "listing:start");
        if let Some(stall) = self.listing_stall {
            std::thread::sleep(stall);
        }
        let listing = self.inner.list_remote(url, auth, deadline);
        log_event(&self.events, "listing:end");
        listing
    }
}

/// Connection tester that accepts after `delay`, logging around the wait.
pub struct RecordingTester {
    events: EventLog,
    delay: Duration,
}

impl RecordingTester {
    pub fn new(events: EventLog, delay: Duration) -> Self {
        Self { events, delay }
    }
}

#[async_trait]
impl ConnectionTester for RecordingTester {
    async fn test(&self, _repository: &Repository, _secrets: &SecretMap) -> ConnectionTestResult {
        log_event(&self.events, "verify:start");
        tokio::time::sleep(self.delay).await;
        log_event(&self.events, "verify:end");
        ConnectionTestResult::connected("remote reachable", true, Some("main".to_string()), 12)
    }
}
