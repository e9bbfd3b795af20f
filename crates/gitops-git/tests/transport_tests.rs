//! Tests for the git2 transport against local bare remotes

use std::fs;
use std::time::Duration;

use gitops_git::{
    CloneRequest, Deadline, Git2Transport, GitAuth, GitTransport, TransientClone,
};
use gitops_test_utils::{bare_remote_with_commit, clone_for_inspection, empty_bare_remote};
use tempfile::TempDir;

fn request(url: &str, target: &std::path::Path, branch: Option<&str>) -> CloneRequest {
    CloneRequest {
        url: url.to_string(),
        authenticated_url: url.to_string(),
        target_dir: target.to_path_buf(),
        branch: branch.map(str::to_string),
        depth: 1,
    }
}

#[test]
fn test_clone_reports_commit_and_branch() {
    let remote = bare_remote_with_commit();
    let work = TempDir::new().unwrap();
    let target = work.path().join("clone");

    let outcome = Git2Transport::default()
        .clone_repository(&request(&remote.url(), &target, None), &GitAuth::Anonymous, Deadline::none())
        .unwrap();

    assert_eq!(outcome.branch.as_deref(), Some("main"));
    assert_eq!(outcome.commit_sha.as_ref().map(String::len), Some(40));
    assert!(target.join("README.md").is_file());
}

#[test]
fn test_clone_missing_branch_is_reported() {
    let remote = bare_remote_with_commit();
    let work = TempDir::new().unwrap();

    let err = Git2Transport::default()
        .clone_repository(
            &request(&remote.url(), &work.path().join("clone"), Some("release")),
            &GitAuth::Anonymous,
            Deadline::none(),
        )
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("release"), "unexpected error: {message}");
}

#[test]
fn test_clone_with_expired_deadline_is_cancelled() {
    let remote = bare_remote_with_commit();
    let work = TempDir::new().unwrap();

    let err = Git2Transport::default()
        .clone_repository(
            &request(&remote.url(), &work.path().join("clone"), None),
            &GitAuth::Anonymous,
            Deadline::after(Duration::ZERO),
        )
        .unwrap_err();

    assert!(err.is_deadline());
    assert!(!work.path().join("clone").exists());
}

#[test]
fn test_list_remote_reports_head_and_branches() {
    let remote = bare_remote_with_commit();

    let listing = Git2Transport::default()
        .list_remote(&remote.url(), &GitAuth::Anonymous, Deadline::none())
        .unwrap();

    assert_eq!(listing.branches, vec!["main".to_string()]);
    assert!(listing.head_commit.is_some());
    assert!(!listing.is_empty());
}

#[test]
fn test_list_remote_on_empty_remote() {
    let remote = empty_bare_remote();

    let listing = Git2Transport::default()
        .list_remote(&remote.url(), &GitAuth::Anonymous, Deadline::none())
        .unwrap();

    assert!(listing.is_empty());
    assert!(listing.head_commit.is_none());
}

#[test]
fn test_list_remote_missing_repository_fails() {
    let work = TempDir::new().unwrap();
    let missing = work.path().join("nope.git");

    let result = Git2Transport::default().list_remote(
        &missing.to_string_lossy(),
        &GitAuth::Anonymous,
        Deadline::none(),
    );

    assert!(result.is_err());
}

#[test]
fn test_transient_clone_commit_and_push() {
    let remote = bare_remote_with_commit();
    let transport = Git2Transport::default();

    let clone = TransientClone::create(
        &transport,
        &remote.url(),
        &GitAuth::Anonymous,
        None,
        1,
        "main",
        Deadline::none(),
    )
    .unwrap();
    fs::create_dir_all(clone.root().join("fabric-a/raw").to_native()).unwrap();
    fs::write(clone.root().join("fabric-a/raw/.gitkeep").to_native(), "").unwrap();

    let outcome = clone
        .commit_and_push(&transport, "Add fabric-a", &GitAuth::Anonymous, Deadline::none())
        .unwrap();
    assert!(outcome.pushed);

    let inspection = clone_for_inspection(remote.path());
    assert!(inspection.path().join("fabric-a/raw/.gitkeep").is_file());
}

#[test]
fn test_push_past_its_deadline_leaves_the_remote_untouched() {
    let remote = bare_remote_with_commit();
    let transport = Git2Transport::default();

    let clone = TransientClone::create(
        &transport,
        &remote.url(),
        &GitAuth::Anonymous,
        None,
        1,
        "main",
        Deadline::none(),
    )
    .unwrap();
    fs::create_dir_all(clone.root().join("late/raw").to_native()).unwrap();
    fs::write(clone.root().join("late/raw/.gitkeep").to_native(), "").unwrap();

    let err = clone
        .commit_and_push(&transport, "Too late", &GitAuth::Anonymous, Deadline::after(Duration::ZERO))
        .unwrap_err();
    assert!(err.is_deadline());

    let inspection = clone_for_inspection(remote.path());
    assert!(!inspection.path().join("late").exists());
}

#[test]
fn test_commit_and_push_without_changes_is_noop() {
    let remote = bare_remote_with_commit();
    let transport = Git2Transport::default();

    let clone = TransientClone::create(
        &transport,
        &remote.url(),
        &GitAuth::Anonymous,
        Some("main"),
        1,
        "main",
        Deadline::none(),
    )
    .unwrap();

    let outcome = clone
        .commit_and_push(&transport, "No-op", &GitAuth::Anonymous, Deadline::none())
        .unwrap();
    assert!(!outcome.pushed);
    assert!(outcome.commit_sha.is_none());
}

#[test]
fn test_transient_clone_is_removed_on_drop() {
    let remote = bare_remote_with_commit();
    let transport = Git2Transport::default();

    let clone = TransientClone::create(
        &transport,
        &remote.url(),
        &GitAuth::Anonymous,
        None,
        1,
        "main",
        Deadline::none(),
    )
    .unwrap();
    let root = clone.root().to_native();
    assert!(root.exists());

    drop(clone);
    assert!(!root.exists());
}
