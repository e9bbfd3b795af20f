//! Pattern-based error classification
//!
//! An ordered table of `(regex, category, severity, code, message)` rows is
//! matched against the failure text; the first match wins. Rows are grouped
//! by category in priority order (connection, authentication, permission,
//! timeout, repository, network, configuration, validation, state), so the
//! specific connection and authentication detectors always run before the
//! generic network one. Classification performs no I/O and mutates nothing.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::codes;
use super::{ClassifiedError, ErrorCategory, Severity};
use crate::Error;

struct Pattern {
    regex: &'static str,
    category: ErrorCategory,
    severity: Severity,
    code: &'static str,
    message: &'static str,
}

const PATTERNS: &[Pattern] = &[
    // Connection
    Pattern {
        regex: r"(?i)connection refused|econnrefused",
        category: ErrorCategory::Connection,
        severity: Severity::High,
        code: codes::GIT_CONNECTION_REFUSED,
        message: "The Git server refused the connection",
    },
    Pattern {
        regex: r"(?i)could not resolve host|failed to resolve address|name or service not known|nodename nor servname|temporary failure in name resolution|no such host|getaddrinfo",
        category: ErrorCategory::Connection,
        severity: Severity::High,
        code: codes::DNS_RESOLUTION_FAILED,
        message: "The Git server's host name could not be resolved",
    },
    Pattern {
        regex: r"(?i)network is unreachable|no route to host|host is unreachable|failed to connect to",
        category: ErrorCategory::Connection,
        severity: Severity::High,
        code: codes::HOST_UNREACHABLE,
        message: "The Git server is unreachable",
    },
    Pattern {
        regex: r"(?i)connection reset|broken pipe|connection aborted|unexpected eof",
        category: ErrorCategory::Connection,
        severity: Severity::Medium,
        code: codes::CONNECTION_RESET,
        message: "The connection to the Git server was interrupted",
    },
    // Authentication
    Pattern {
        regex: r"(?i)permission denied \(publickey|host key verification failed|invalid private key|failed to authenticate ssh session|error authenticating: .*key",
        category: ErrorCategory::Authentication,
        severity: Severity::High,
        code: codes::SSH_KEY_REJECTED,
        message: "The SSH key was rejected by the Git server",
    },
    Pattern {
        regex: r"(?i)token (has )?expired|expired token|credentials have expired",
        category: ErrorCategory::Authentication,
        severity: Severity::High,
        code: codes::TOKEN_EXPIRED,
        message: "The access token has expired",
    },
    Pattern {
        regex: r"(?i)authentication (failed|required)|invalid (username or password|credentials)|bad credentials|\b401\b|unauthorized|rejected the supplied credentials|too many redirects or authentication replays|no credentials are configured",
        category: ErrorCategory::Authentication,
        severity: Severity::High,
        code: codes::AUTHENTICATION_FAILED,
        message: "Authentication with the Git server failed",
    },
    // Permission
    Pattern {
        regex: r#"(?i)cannot (get|list|watch|create|update|patch|delete) resource ""#,
        category: ErrorCategory::Permission,
        severity: Severity::High,
        code: codes::RBAC_DENIED,
        message: "The service account lacks the required RBAC permission",
    },
    Pattern {
        regex: r"(?i)\b403\b|forbidden|permission denied|access denied|insufficient permissions|not authorized to",
        category: ErrorCategory::Permission,
        severity: Severity::High,
        code: codes::PERMISSION_DENIED,
        message: "The credentials lack permission for this operation",
    },
    // Timeout
    Pattern {
        regex: r"(?i)timed out|timeout|deadline exceeded|operation too slow",
        category: ErrorCategory::Timeout,
        severity: Severity::Medium,
        code: codes::OPERATION_TIMEOUT,
        message: "The operation timed out",
    },
    // Repository
    Pattern {
        regex: r"(?i)repository not found|could not find repository|does not appear to be a git repository|not a git repository|\b404\b",
        category: ErrorCategory::Repository,
        severity: Severity::High,
        code: codes::REPOSITORY_NOT_FOUND,
        message: "The Git repository does not exist or is not visible with these credentials",
    },
    Pattern {
        regex: r"(?i)branch '[^']+' not found|remote branch \S+ not found|couldn't find remote ref|reference 'refs/remotes/origin/[^']+' not found",
        category: ErrorCategory::Repository,
        severity: Severity::Medium,
        code: codes::BRANCH_NOT_FOUND,
        message: "The requested branch does not exist",
    },
    Pattern {
        regex: r"(?i)repository is empty|empty repository|remote head refers to nonexistent ref|unborn",
        category: ErrorCategory::Repository,
        severity: Severity::Medium,
        code: codes::REPOSITORY_EMPTY,
        message: "The Git repository has no commits",
    },
    Pattern {
        regex: r"(?i)merge conflict|conflict \(content\)|cannot fast-forward|non-fast-forward|fetch first",
        category: ErrorCategory::Repository,
        severity: Severity::Medium,
        code: codes::MERGE_CONFLICT,
        message: "The remote branch has diverged",
    },
    Pattern {
        regex: r"(?i)push failed|remote rejected",
        category: ErrorCategory::Repository,
        severity: Severity::Medium,
        code: codes::PUSH_REJECTED,
        message: "The Git server rejected the push",
    },
    // Network
    Pattern {
        regex: r"(?i)rate limit|too many requests|\b429\b",
        category: ErrorCategory::Network,
        severity: Severity::Medium,
        code: codes::RATE_LIMITED,
        message: "The Git provider rate limit was exceeded",
    },
    Pattern {
        regex: r"(?i)certificate|x509|tls handshake|ssl (handshake|error|connect)|unable to get local issuer",
        category: ErrorCategory::Network,
        severity: Severity::High,
        code: codes::TLS_ERROR,
        message: "The TLS connection to the Git server failed",
    },
    Pattern {
        regex: r"(?i)network|socket|proxy|\b50[234]\b|bad gateway|service unavailable",
        category: ErrorCategory::Network,
        severity: Severity::Medium,
        code: codes::NETWORK_ERROR,
        message: "A network error interrupted the operation",
    },
    // Configuration
    Pattern {
        regex: r"(?i)ssl.?verify|ssl config|invalid ssl|sslcainfo|cainfo",
        category: ErrorCategory::Configuration,
        severity: Severity::Medium,
        code: codes::SSL_CONFIGURATION,
        message: "The SSL settings for this repository are invalid",
    },
    Pattern {
        regex: r"(?i)invalid (repository )?url|invalid (configuration|setting)|malformed|unsupported (url|scheme|protocol)|missing required (setting|field|configuration)|unsupported url protocol",
        category: ErrorCategory::Configuration,
        severity: Severity::Medium,
        code: codes::INVALID_CONFIGURATION,
        message: "The repository configuration is invalid",
    },
    // Validation
    Pattern {
        regex: r"(?i)yaml|scanner error|mapping values are not allowed|did not find expected",
        category: ErrorCategory::Validation,
        severity: Severity::Medium,
        code: codes::YAML_PARSE_ERROR,
        message: "A YAML document could not be parsed",
    },
    Pattern {
        regex: r"(?i)schema|validation (failed|error)|invalid value|required property",
        category: ErrorCategory::Validation,
        severity: Severity::Medium,
        code: codes::SCHEMA_VALIDATION_FAILED,
        message: "A resource failed schema validation",
    },
    // State
    Pattern {
        regex: r"(?i)invalid (state )?transition|illegal state|invalid state",
        category: ErrorCategory::State,
        severity: Severity::Medium,
        code: codes::INVALID_STATE_TRANSITION,
        message: "The record is not in a state that allows this operation",
    },
    Pattern {
        regex: r"(?i)database|persistence|record store|integrity error|deadlock",
        category: ErrorCategory::State,
        severity: Severity::High,
        code: codes::PERSISTENCE_FAILURE,
        message: "Persisting the change failed",
    },
];

static COMPILED: LazyLock<Vec<(Regex, &'static Pattern)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .map(|pattern| (Regex::new(pattern.regex).expect("valid regex"), pattern))
        .collect()
});

static HTTP_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:status(?: code)?:?|http/\d(?:\.\d)?)\s*(\d{3})\b").expect("valid regex"));
static HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:host|address for|connect to):?\s+'?([a-z0-9][a-z0-9.-]*\.[a-z]{2,})").expect("valid regex")
});
static RATE_REMAINING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)x-ratelimit-remaining:\s*(\d+)").expect("valid regex"));
static RATE_RESET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)x-ratelimit-reset:\s*(\d+)").expect("valid regex"));
static RETRY_AFTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)retry-after:\s*(\d+)").expect("valid regex"));
static RBAC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)cannot (\w+) resource "([^"]+)"(?: in API group "([^"]*)")?(?: in the namespace "([^"]+)")?"#)
        .expect("valid regex")
});
static RBAC_USER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"User "([^"]+)""#).expect("valid regex"));
static CONFLICT_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)merge conflict in (\S+)").expect("valid regex"));
static BRANCH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)branch '([^']+)'").expect("valid regex"));

/// Pull category-specific auxiliary fields out of the failure text.
fn extract_context(category: ErrorCategory, text: &str) -> BTreeMap<String, String> {
    let mut context = BTreeMap::new();
    let mut capture = |key: &str, regex: &Regex, group: usize| {
        if let Some(value) = regex.captures(text).and_then(|c| c.get(group)) {
            context.insert(key.to_string(), value.as_str().to_string());
        }
    };

    capture("http_status", &HTTP_STATUS, 1);
    match category {
        ErrorCategory::Connection => capture("host", &HOST, 1),
        ErrorCategory::Network => {
            capture("host", &HOST, 1);
            capture("rate_limit_remaining", &RATE_REMAINING, 1);
            capture("rate_limit_reset", &RATE_RESET, 1);
            capture("retry_after", &RETRY_AFTER, 1);
        }
        ErrorCategory::Permission => {
            capture("verb", &RBAC, 1);
            capture("resource", &RBAC, 2);
            capture("api_group", &RBAC, 3);
            capture("namespace", &RBAC, 4);
            capture("user", &RBAC_USER, 1);
        }
        ErrorCategory::Repository => capture("branch", &BRANCH, 1),
        _ => {}
    }

    if category == ErrorCategory::Repository {
        let files: Vec<&str> = CONFLICT_FILE
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if !files.is_empty() {
            context.insert("conflicted_files".to_string(), files.join(","));
        }
    }
    context
}

/// Remediation advice for a code.
fn recommendations_for(code: &str) -> Vec<String> {
    let advice: &[&str] = match code {
        codes::GIT_CONNECTION_REFUSED | codes::HOST_UNREACHABLE => &[
            "Check that the Git server is running and reachable from this host",
            "Verify firewall and proxy settings",
        ],
        codes::DNS_RESOLUTION_FAILED => &[
            "Check the repository URL for typos",
            "Verify DNS configuration on this host",
        ],
        codes::CONNECTION_RESET => &["Retry the operation", "Check for an intercepting proxy"],
        codes::AUTHENTICATION_FAILED => &[
            "Verify the stored credentials",
            "Rotate the credentials if they were revoked",
        ],
        codes::TOKEN_EXPIRED => &["Generate a new access token and rotate the credentials"],
        codes::SSH_KEY_REJECTED => &[
            "Check that the public key is registered with the Git provider",
            "Verify the key passphrase",
        ],
        codes::PERMISSION_DENIED => &["Grant the credentials read and write access to the repository"],
        codes::RBAC_DENIED => &["Grant the service account the missing RBAC verb on the resource"],
        codes::OPERATION_TIMEOUT | codes::OPERATION_CANCELLED => &[
            "Retry the operation",
            "Increase the repository timeout for slow remotes",
        ],
        codes::REPOSITORY_NOT_FOUND => &[
            "Check the repository URL",
            "Verify the credentials can see the repository",
        ],
        codes::BRANCH_NOT_FOUND => &["Create the branch or update the repository's default branch"],
        codes::REPOSITORY_EMPTY => &["Push an initial commit to the repository"],
        codes::MERGE_CONFLICT | codes::PUSH_REJECTED => &[
            "Re-run the operation against the latest remote state",
            "Check branch protection rules",
        ],
        codes::RATE_LIMITED => &["Wait for the rate limit window to reset before retrying"],
        codes::TLS_ERROR => &["Verify the server certificate chain and the trusted CA bundle"],
        codes::NETWORK_ERROR => &["Retry the operation", "Check network connectivity"],
        codes::SSL_CONFIGURATION | codes::INVALID_CONFIGURATION => {
            &["Review the repository configuration"]
        }
        codes::CREDENTIAL_DECRYPTION_FAILED => &[
            "Verify the master key has not changed",
            "Re-enter the repository credentials",
        ],
        codes::CREDENTIAL_ENCRYPTION_FAILED | codes::MASTER_KEY_UNAVAILABLE => {
            &["Check the master key configuration"]
        }
        codes::YAML_PARSE_ERROR | codes::SCHEMA_VALIDATION_FAILED => {
            &["Fix the reported document and retry"]
        }
        codes::INVALID_DIRECTORY => &["Choose one of the suggested directories"],
        codes::RESOURCE_IN_USE => &["Detach every fabric from the repository first"],
        codes::INVALID_STATE_TRANSITION | codes::PERSISTENCE_FAILURE | codes::RECORD_NOT_FOUND => {
            &["Reload the record and retry the operation"]
        }
        _ => &["Inspect the audit log for the full error"],
    };
    advice.iter().map(|s| s.to_string()).collect()
}

fn build(
    category: ErrorCategory,
    severity: Severity,
    code: &'static str,
    message: impl Into<String>,
    detail: &str,
) -> ClassifiedError {
    ClassifiedError {
        category,
        severity,
        code,
        message: message.into(),
        context: extract_context(category, detail),
        recommendations: recommendations_for(code),
        detail: detail.to_string(),
    }
}

/// Classify raw failure text.
pub fn classify_message(message: &str) -> ClassifiedError {
    for (regex, pattern) in COMPILED.iter() {
        if regex.is_match(message) {
            return build(
                pattern.category,
                pattern.severity,
                pattern.code,
                pattern.message,
                message,
            );
        }
    }
    build(
        ErrorCategory::Unknown,
        Severity::Medium,
        codes::UNKNOWN_ERROR,
        "An unexpected error occurred",
        message,
    )
}

/// Classify a typed error, short-circuiting the variants whose meaning is known.
pub fn classify_error(err: &Error) -> ClassifiedError {
    let detail = format!("{err:?}");
    match err {
        Error::Timeout { operation, after } => build(
            ErrorCategory::Timeout,
            Severity::Medium,
            codes::OPERATION_TIMEOUT,
            "The operation timed out",
            &detail,
        )
        .with_context("operation", operation.clone())
        .with_context("timeout_ms", after.as_millis().to_string()),
        Error::Cancelled { operation } => build(
            ErrorCategory::Timeout,
            Severity::Medium,
            codes::OPERATION_CANCELLED,
            "The operation was cancelled at the caller's deadline",
            &detail,
        )
        .with_context("operation", operation.clone()),
        Error::Git(gitops_git::Error::DeadlineExceeded { operation }) => build(
            ErrorCategory::Timeout,
            Severity::Medium,
            codes::OPERATION_TIMEOUT,
            "The operation timed out",
            &detail,
        )
        .with_context("operation", operation.clone()),
        Error::Git(gitops_git::Error::BranchNotFound { name }) => build(
            ErrorCategory::Repository,
            Severity::Medium,
            codes::BRANCH_NOT_FOUND,
            "The requested branch does not exist",
            &detail,
        )
        .with_context("branch", name.clone()),
        Error::Decryption(_) => build(
            ErrorCategory::Configuration,
            Severity::Critical,
            codes::CREDENTIAL_DECRYPTION_FAILED,
            "Stored credentials could not be decrypted",
            &detail,
        ),
        Error::Encryption(_) => build(
            ErrorCategory::Configuration,
            Severity::High,
            codes::CREDENTIAL_ENCRYPTION_FAILED,
            "Credentials could not be encrypted",
            &detail,
        ),
        Error::MasterKey(_) => build(
            ErrorCategory::Configuration,
            Severity::Critical,
            codes::MASTER_KEY_UNAVAILABLE,
            "The credential master key is unavailable",
            &detail,
        ),
        Error::InvalidDirectory { directory, .. } => build(
            ErrorCategory::Validation,
            Severity::Medium,
            codes::INVALID_DIRECTORY,
            "The GitOps directory is not valid for this repository",
            &detail,
        )
        .with_context("directory", directory.clone()),
        Error::Config(_) => build(
            ErrorCategory::Configuration,
            Severity::Medium,
            codes::INVALID_CONFIGURATION,
            "The subsystem configuration is invalid",
            &detail,
        ),
        Error::RepositoryInUse { id, fabric_count } => build(
            ErrorCategory::State,
            Severity::Medium,
            codes::RESOURCE_IN_USE,
            "The repository is still used by fabrics",
            &detail,
        )
        .with_context("repository_id", id.to_string())
        .with_context("fabric_count", fabric_count.to_string()),
        Error::RepositoryNotFound(_) | Error::FabricNotFound(_) | Error::FabricUnassigned { .. } => {
            build(
                ErrorCategory::State,
                Severity::Medium,
                codes::RECORD_NOT_FOUND,
                err.to_string(),
                &detail,
            )
        }
        Error::State(_) | Error::Task(_) => build(
            ErrorCategory::State,
            Severity::High,
            codes::PERSISTENCE_FAILURE,
            "Persisting the change failed",
            &detail,
        ),
        Error::Yaml(_) => build(
            ErrorCategory::Validation,
            Severity::Medium,
            codes::YAML_PARSE_ERROR,
            "A YAML document could not be parsed",
            &detail,
        ),
        _ => {
            let mut classified = classify_message(&err.to_string());
            classified.detail = detail;
            classified
        }
    }
}
