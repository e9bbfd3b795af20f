//! Shared test utilities for the fabric-gitops workspace.
//!
//! Dev-dependency only. Fixtures build real bare remotes on local disk so
//! clone, commit and push run through libgit2 without any network access.
//!
//! # Modules
//!
//! - [`git`] — bare remotes with history, seeding and inspection helpers

pub mod git;

pub use git::{RemoteFixture, bare_remote_with_commit, clone_for_inspection, empty_bare_remote, seed_remote_files};
