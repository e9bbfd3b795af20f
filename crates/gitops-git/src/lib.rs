//! Git transport for Fabric GitOps
//!
//! Everything that touches a remote lives here: authentication shapes,
//! clone/commit/push through `git2`, deadline-based cancellation and the
//! per-provider interface selected from a repository URL.

pub mod auth;
pub mod clone;
pub mod deadline;
pub mod error;
pub mod git2_transport;
pub mod provider;
pub mod transport;

pub use auth::{GitAuth, authenticated_url, redact_url};
pub use clone::TransientClone;
pub use deadline::Deadline;
pub use error::{Error, Result};
pub use git2_transport::Git2Transport;
pub use provider::{GitProviderClient, ProviderKind, RepositoryInfo, detect_provider, provider_client};
pub use transport::{CloneOutcome, CloneRequest, GitTransport, PushOutcome, RemoteListing};
