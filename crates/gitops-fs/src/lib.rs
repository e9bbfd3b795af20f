//! Filesystem helpers for Fabric GitOps
//!
//! Provides forward-slash path handling, atomic I/O and format-agnostic
//! configuration loading for working trees cloned from GitOps repositories.

pub mod checksum;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod path;

pub use config::ConfigStore;
pub use constants::LayoutPath;
pub use error::{Error, Result};
pub use path::NormalizedPath;
