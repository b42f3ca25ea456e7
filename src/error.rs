use serde::ser::SerializeStruct;
use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for logs or reports.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "x-sfdc-session",
    "sessionid",
    "access_token",
    "refresh_token",
    "client_secret",
    "authorization:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for logging.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session expired")]
    SessionExpired,

    // ── Remote ────────────────────────────────────────────────────────────────
    #[error("Salesforce rejected request: [{code}] {message}")]
    RemoteRejected { code: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Job / Batch lifecycle ─────────────────────────────────────────────────
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Batch {batch_id} returned {actual} results for {expected} records")]
    ResultMismatch {
        batch_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Batches failed at indices {indices:?}")]
    BatchesFailed { indices: Vec<usize> },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded after {after_ms}ms")]
    DeadlineExceeded { after_ms: u64 },

    // ── Local validation ──────────────────────────────────────────────────────
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true for transport-level failures that a later attempt may not hit.
    ///
    /// The poller retries status queries that fail this way on its own cadence;
    /// every other operation leaves retrying to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::ConnectionFailed(_) | AppError::RateLimited { .. }
        )
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotAuthenticated => "not_authenticated",
            AppError::SessionExpired => "session_expired",
            AppError::RemoteRejected { .. } => "remote_rejected",
            AppError::NotFound(_) => "not_found",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::ConnectionFailed(_) => "transient",
            AppError::InvalidState(_) => "invalid_state",
            AppError::ResultMismatch { .. } => "result_mismatch",
            AppError::BatchesFailed { .. } => "batches_failed",
            AppError::Cancelled => "cancelled",
            AppError::DeadlineExceeded { .. } => "deadline_exceeded",
            AppError::InvalidRecord(_) => "invalid_record",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    /// Display message with anything token-like replaced by a generic fallback.
    ///
    /// Never leaks session ids, bearer tokens or secrets. Use this whenever an
    /// error is logged or written into a report.
    pub fn safe_message(&self) -> String {
        match self {
            AppError::RemoteRejected { code, message } => format!(
                "Salesforce rejected request: [{}] {}",
                code,
                sanitize_message(message, "details withheld")
            ),
            AppError::NotFound(msg) => {
                format!("Not found: {}", sanitize_message(msg, "resource"))
            }
            AppError::ConnectionFailed(msg) => format!(
                "Connection failed: {}",
                sanitize_message(msg, "network error")
            ),
            AppError::InvalidState(msg) => format!(
                "Invalid state: {}",
                sanitize_message(msg, "operation not permitted")
            ),
            AppError::InvalidRecord(msg) => format!(
                "Invalid record: {}",
                sanitize_message(msg, "record rejected")
            ),
            AppError::InvalidRequest(msg) => format!(
                "Invalid request: {}",
                sanitize_message(msg, "request rejected")
            ),
            AppError::Config(msg) => format!(
                "Invalid configuration: {}",
                sanitize_message(msg, "bad setting")
            ),
            AppError::Internal(msg) => format!(
                "Internal error: {}",
                sanitize_message(msg, "unexpected failure")
            ),
            other => other.to_string(),
        }
    }
}

// Reports carrying errors are serialized for callers; only the safe message goes out.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.safe_message())?;
        state.end()
    }
}
