//! Error types for batch generation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors that can occur while preparing or running a batch.
#[derive(Debug, thiserror::Error)]
pub enum GenBatchError {
    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Delay suggested by the server, if any.
        retry_after: Option<Duration>,
    },

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// The model stopped before producing a complete image.
    #[error("response truncated: {0}")]
    Truncated(String),

    /// The response did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP error.
    #[error("network error (check connectivity or API key): {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// Failed to decode, resize or re-encode a source image.
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error (e.g., reading the placeholder asset).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every call in the batch failed.
    #[error("batch failed: {0}")]
    BatchFailed(String),

    /// The batch was cancelled before producing any result.
    #[error("batch cancelled before any variant completed")]
    Cancelled,
}

/// Coarse classification of a failure, used to decide how a batch reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or rejected credentials. Fatal, never retried.
    Credentials,
    /// The provider refused the input or output on safety grounds.
    SafetyBlocked,
    /// The response was cut short or exceeded a size limit.
    Truncated,
    /// The response was missing expected fields.
    MalformedResponse,
    /// Connectivity, timeouts, rate limits and other transport trouble.
    Transport,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Returns a stable snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::SafetyBlocked => "safety_blocked",
            Self::Truncated => "truncated",
            Self::MalformedResponse => "malformed_response",
            Self::Transport => "transport",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GenBatchError {
    /// Maps this error onto the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Credentials,
            Self::ContentBlocked(_) => ErrorKind::SafetyBlocked,
            Self::Truncated(_) => ErrorKind::Truncated,
            Self::UnexpectedResponse(_) | Self::Decode(_) | Self::Json(_) => {
                ErrorKind::MalformedResponse
            }
            Self::Network(_) | Self::RateLimited { .. } => ErrorKind::Transport,
            Self::Api { status, .. } if *status >= 500 => ErrorKind::Transport,
            Self::Api { status: 401 | 403, .. } => ErrorKind::Credentials,
            _ => ErrorKind::Unknown,
        }
    }

    /// Returns true if this error is likely transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::MalformedResponse)
    }

    /// Returns the delay the server asked for before the next call, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for batch generation operations.
pub type Result<T> = std::result::Result<T, GenBatchError>;

const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Collapses whitespace in an upstream error body and caps its length.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ERROR_MESSAGE_CHARS {
        let truncated: String = collapsed.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
        format!("{truncated}...")
    } else {
        collapsed
    }
}

/// Reads a `Retry-After` header expressed in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
