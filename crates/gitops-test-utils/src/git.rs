//! Git remote fixtures.
//!
//! All helpers panic on failure; they are meant for tests only.

use std::fs;
use std::path::{Path, PathBuf};

use git2::{IndexAddOption, PushOptions, Repository, Signature};
use tempfile::TempDir;

/// A bare remote living in its own temporary directory.
pub struct RemoteFixture {
    _dir: TempDir,
    path: PathBuf,
}

impl RemoteFixture {
    /// Filesystem path of the bare repository, usable as a clone URL.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The path as a URL string.
    pub fn url(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

fn signature() -> Signature<'static> {
    Signature::now("Test User", "test@test.com")
        .unwrap_or_else(|e| panic!("fixture: failed to build signature: {e}"))
}

/// Initialises an empty bare repository whose HEAD points at `main`.
///
/// Realism level: **REAL** — valid object store, no history.
pub fn empty_bare_remote() -> RemoteFixture {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("fixture: tempdir: {e}"));
    let path = dir.path().join("remote.git");
    let repo = Repository::init_bare(&path)
        .unwrap_or_else(|e| panic!("empty_bare_remote: init failed at {}: {e}", path.display()));
    repo.set_head("refs/heads/main")
        .unwrap_or_else(|e| panic!("empty_bare_remote: set_head failed: {e}"));
    RemoteFixture { _dir: dir, path }
}

/// Initialises a bare repository with one commit on `main` holding `README.md`.
///
/// Realism level: **REAL WITH HISTORY**.
pub fn bare_remote_with_commit() -> RemoteFixture {
    let remote = empty_bare_remote();
    let repo = Repository::open_bare(remote.path())
        .unwrap_or_else(|e| panic!("bare_remote_with_commit: open failed: {e}"));

    let blob = repo
        .blob(b"# Fabric GitOps\n")
        .unwrap_or_else(|e| panic!("bare_remote_with_commit: blob failed: {e}"));
    let mut builder = repo
        .treebuilder(None)
        .unwrap_or_else(|e| panic!("bare_remote_with_commit: treebuilder failed: {e}"));
    builder
        .insert("README.md", blob, 0o100644)
        .unwrap_or_else(|e| panic!("bare_remote_with_commit: insert failed: {e}"));
    let tree_id = builder
        .write()
        .unwrap_or_else(|e| panic!("bare_remote_with_commit: write tree failed: {e}"));
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = signature();
    repo.commit(Some("refs/heads/main"), &sig, &sig, "Initial commit", &tree, &[])
        .unwrap_or_else(|e| panic!("bare_remote_with_commit: commit failed: {e}"));

    drop(builder);
    drop(tree);
    drop(repo);
    remote
}

/// Clones `remote` into a temporary directory for assertions.
pub fn clone_for_inspection(remote: &Path) -> TempDir {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("fixture: tempdir: {e}"));
    Repository::clone(&remote.to_string_lossy(), dir.path())
        .unwrap_or_else(|e| panic!("clone_for_inspection: clone failed: {e}"));
    dir
}

/// Commits `files` (relative path, content) on top of `main` and pushes them.
pub fn seed_remote_files(remote: &Path, files: &[(&str, &str)]) {
    let work = clone_for_inspection(remote);
    let repo = Repository::open(work.path()).unwrap();

    for (relative, content) in files {
        let path = work.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
    }

    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap_or_else(|e| panic!("seed_remote_files: add failed: {e}"));
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let parent = repo.head().unwrap().peel_to_commit().unwrap();
    let sig = signature();
    repo.commit(Some("HEAD"), &sig, &sig, "Seed files", &tree, &[&parent])
        .unwrap_or_else(|e| panic!("seed_remote_files: commit failed: {e}"));

    let mut origin = repo.find_remote("origin").unwrap();
    origin
        .push(&["refs/heads/main:refs/heads/main"], Some(&mut PushOptions::new()))
        .unwrap_or_else(|e| panic!("seed_remote_files: push failed: {e}"));
}
