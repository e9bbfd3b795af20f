//! Fabric lifecycle across crates
//!
//! Settings file -> service -> two fabrics on one remote -> provisioning ->
//! maintenance -> snapshot and reload of the record store.

use std::fs;
use std::sync::Arc;

use gitops_core::model::{AuthType, Fabric, FabricId, Repository, RepositoryId};
use gitops_core::store::RecordStore;
use gitops_core::{
    ConnectionStatus, FabricStatus, GitOpsConfig, GitOpsService, HealthStatus, MasterKey, MemoryStore, SecretMap,
};
use gitops_fs::NormalizedPath;
use gitops_git::{Deadline, Git2Transport};
use gitops_test_utils::{bare_remote_with_commit, clone_for_inspection, seed_remote_files};
use tempfile::TempDir;

const SETTINGS: &str = r#"
[git]
timeout_secs = 20
author_name = "Lifecycle Test"

[recovery]
base_delay_ms = 5
max_delay_ms = 20
"#;

fn load_settings(dir: &TempDir) -> GitOpsConfig {
    let path = dir.path().join("gitops.toml");
    fs::write(&path, SETTINGS).unwrap();
    GitOpsConfig::load(&NormalizedPath::new(&path)).unwrap()
}

fn build(config: GitOpsConfig, secret: &str, store: Arc<MemoryStore>) -> GitOpsService {
    let transport = Arc::new(Git2Transport::new(&config.git.author_name, &config.git.author_email));
    GitOpsService::new(config, MasterKey::from_secret(secret).unwrap(), store, transport)
}

fn commit_count(remote: &std::path::Path) -> usize {
    let repo = git2::Repository::open_bare(remote).unwrap();
    let mut walk = repo.revwalk().unwrap();
    walk.push_head().unwrap();
    walk.count()
}

#[tokio::test]
async fn two_fabrics_share_one_repository() {
    let settings = TempDir::new().unwrap();
    let config = load_settings(&settings);
    assert_eq!(config.git.timeout_secs, 20);
    assert_eq!(config.recovery.max_retries, 3);

    let remote = bare_remote_with_commit();
    let store = Arc::new(MemoryStore::new());
    let service = build(config, "lifecycle-secret", store.clone());

    let repo = RepositoryId(1);
    store
        .insert_repository(Repository::new(repo, "fabrics", remote.url(), AuthType::Token).with_privacy(false))
        .unwrap();
    store.insert_fabric(Fabric::new(FabricId(1), "east")).unwrap();
    store.insert_fabric(Fabric::new(FabricId(2), "west")).unwrap();

    let east = service
        .assign_fabric_directory(FabricId(1), Some(repo), "fabrics/east")
        .await
        .unwrap();
    let west = service
        .assign_fabric_directory(FabricId(2), Some(repo), "fabrics/west")
        .await
        .unwrap();
    assert!(east.is_valid && west.is_valid);
    assert_eq!(store.repository(repo).unwrap().fabric_count, 2);

    let connection = service.test_connection(repo, Deadline::none()).await.unwrap();
    assert!(connection.success, "{}", connection.message);

    for fabric in [FabricId(1), FabricId(2)] {
        let result = service
            .provision_fabric_git_integration(fabric, Deadline::none())
            .await
            .unwrap();
        assert!(result.success, "{}", result.message);
        assert_eq!(store.fabric(fabric).unwrap().status, FabricStatus::Active);
    }

    // Initial commit plus one layout commit per fabric
    assert_eq!(commit_count(remote.path()), 3);
    let checkout = clone_for_inspection(remote.path());
    for name in ["east", "west"] {
        let descriptor = checkout
            .path()
            .join("fabrics")
            .join(name)
            .join("managed/metadata/gitops-structure.json");
        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(descriptor).unwrap()).unwrap();
        assert_eq!(parsed["gitops_directory"], format!("/fabrics/{name}/"));
    }

    seed_remote_files(
        remote.path(),
        &[("fabrics/east/raw/pending/leaf.yaml", "kind: Switch\nmetadata:\n  name: leaf-01\n")],
    );
    let ingested = service.ingest_raw(FabricId(1), Deadline::none()).await.unwrap();
    assert_eq!(ingested.written, vec!["managed/switches/leaf-01.yaml".to_string()]);
    assert_eq!(commit_count(remote.path()), 5);

    let dashboard = service.dashboard();
    let summary = dashboard.iter().find(|s| s.repository_id == repo).unwrap();
    assert!(summary.samples > 0);
    assert_eq!(summary.success_rate, Some(1.0));

    let report = service.get_health_report(repo, Deadline::none()).await.unwrap();
    assert_eq!(report.overall_status, HealthStatus::Healthy);
}

#[tokio::test]
async fn records_and_credentials_survive_a_snapshot() {
    let settings = TempDir::new().unwrap();
    let remote = bare_remote_with_commit();
    let store = Arc::new(MemoryStore::new());
    let service = build(load_settings(&settings), "snapshot-secret", store.clone());

    let repo = RepositoryId(5);
    store
        .insert_repository(Repository::new(repo, "snap", remote.url(), AuthType::Token))
        .unwrap();
    store
        .insert_fabric(Fabric::new(FabricId(9), "edge").with_repository(repo, "/edge/"))
        .unwrap();
    let token = SecretMap::new().with("token", format!("glpat-{}", "z".repeat(40)));
    service.set_credentials(repo, &token).await.unwrap();

    let path = NormalizedPath::new(settings.path().join("records.json"));
    store.save_snapshot(&path).unwrap();
    let raw = fs::read_to_string(path.to_native()).unwrap();
    assert!(!raw.contains("glpat-"));

    let reloaded = Arc::new(MemoryStore::load_snapshot(&path).unwrap());
    assert_eq!(reloaded.repository(repo).unwrap().fabric_count, 1);

    let same_key = build(load_settings(&settings), "snapshot-secret", reloaded.clone());
    assert_eq!(same_key.vault().get_credentials(repo).unwrap(), token);
    let connection = same_key.test_connection(repo, Deadline::none()).await.unwrap();
    assert!(connection.success, "{}", connection.message);

    let other_key = build(load_settings(&settings), "another-secret", reloaded.clone());
    let rejected = other_key.test_connection(repo, Deadline::none()).await.unwrap();
    assert!(!rejected.success);
    assert_eq!(
        reloaded.repository(repo).unwrap().connection_status,
        ConnectionStatus::Failed
    );
}
