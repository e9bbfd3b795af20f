//! SHA-256 fingerprints
//!
//! One canonical format (`sha256:<hex>`), used to correlate encrypted
//! credential blobs in logs without revealing them.

use sha2::{Digest, Sha256};

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Compute the checksum of raw bytes in the canonical format.
pub fn compute_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// First twelve hex digits of the checksum, for log fields.
pub fn short_fingerprint(content: &[u8]) -> String {
    compute_checksum(content)[PREFIX.len()..PREFIX.len() + 12].to_string()
}
