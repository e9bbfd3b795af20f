//! Stable error codes
//!
//! Codes key the recovery strategy registry and appear in every user-facing
//! error, so they never change once published.

pub const GIT_CONNECTION_REFUSED: &str = "GIT_CONNECTION_REFUSED";
pub const DNS_RESOLUTION_FAILED: &str = "DNS_RESOLUTION_FAILED";
pub const HOST_UNREACHABLE: &str = "HOST_UNREACHABLE";
pub const CONNECTION_RESET: &str = "CONNECTION_RESET";

pub const AUTHENTICATION_FAILED: &str = "AUTHENTICATION_FAILED";
pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
pub const SSH_KEY_REJECTED: &str = "SSH_KEY_REJECTED";

pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
pub const RBAC_DENIED: &str = "RBAC_DENIED";

pub const OPERATION_TIMEOUT: &str = "OPERATION_TIMEOUT";
pub const OPERATION_CANCELLED: &str = "OPERATION_CANCELLED";

pub const REPOSITORY_NOT_FOUND: &str = "REPOSITORY_NOT_FOUND";
pub const REPOSITORY_EMPTY: &str = "REPOSITORY_EMPTY";
pub const BRANCH_NOT_FOUND: &str = "BRANCH_NOT_FOUND";
pub const MERGE_CONFLICT: &str = "MERGE_CONFLICT";
pub const PUSH_REJECTED: &str = "PUSH_REJECTED";

pub const RATE_LIMITED: &str = "RATE_LIMITED";
pub const TLS_ERROR: &str = "TLS_ERROR";
pub const NETWORK_ERROR: &str = "NETWORK_ERROR";

pub const SSL_CONFIGURATION: &str = "SSL_CONFIGURATION";
pub const INVALID_CONFIGURATION: &str = "INVALID_CONFIGURATION";
pub const CREDENTIAL_DECRYPTION_FAILED: &str = "CREDENTIAL_DECRYPTION_FAILED";
pub const CREDENTIAL_ENCRYPTION_FAILED: &str = "CREDENTIAL_ENCRYPTION_FAILED";
pub const MASTER_KEY_UNAVAILABLE: &str = "MASTER_KEY_UNAVAILABLE";

pub const YAML_PARSE_ERROR: &str = "YAML_PARSE_ERROR";
pub const SCHEMA_VALIDATION_FAILED: &str = "SCHEMA_VALIDATION_FAILED";
pub const INVALID_DIRECTORY: &str = "INVALID_DIRECTORY";

pub const INVALID_STATE_TRANSITION: &str = "INVALID_STATE_TRANSITION";
pub const PERSISTENCE_FAILURE: &str = "PERSISTENCE_FAILURE";
pub const RECORD_NOT_FOUND: &str = "RECORD_NOT_FOUND";
pub const RESOURCE_IN_USE: &str = "RESOURCE_IN_USE";

pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
