//! Tracing setup
//!
//! Audit events from the recovery engine use the [`AUDIT_TARGET`] target so
//! they can be routed separately (`RUST_LOG=gitops::audit=info`).

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target of recovery audit events.
pub const AUDIT_TARGET: &str = "gitops::audit";

/// Install a global subscriber printing compact logs to stdout.
///
/// The level comes from `RUST_LOG`, defaulting to `info`. Fails instead of
/// panicking when a subscriber is already installed.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .compact();

    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
