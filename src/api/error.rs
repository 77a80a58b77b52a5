//! API error types for the JIRA client.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when interacting with the JIRA API.
///
/// The type is `Clone` so a single failed load can be handed to every caller
/// waiting on the same cache slot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Authentication failed - invalid email or API token.
    #[error("Authentication failed: check your email and API token")]
    Unauthorized,

    /// Permission denied - the credentials lack access to the resource.
    #[error("Permission denied: you don't have access to this resource")]
    Forbidden,

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Rate limited by the JIRA API, even after the single backoff.
    #[error("Rate limited: please wait before retrying")]
    RateLimited {
        /// Server-suggested wait, from the `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// The request was rejected, usually with per-field messages.
    #[error("Request rejected: {}", summarize(messages, field_errors))]
    BadRequest {
        /// Request-level messages (`errorMessages`).
        messages: Vec<String>,
        /// Field id to message (`errors`).
        field_errors: BTreeMap<String, String>,
    },

    /// Network failure, timeout or a 5xx from the server.
    #[error("Network error: {0}")]
    Transport(String),

    /// Invalid response from the API.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create an error from an HTTP status code and the error body, if any.
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            404 => ApiError::NotFound(context.to_string()),
            429 => ApiError::RateLimited { retry_after: None },
            400..=499 => ApiError::BadRequest {
                messages: vec![format!("HTTP {}: {}", status, context)],
                field_errors: BTreeMap::new(),
            },
            _ => ApiError::Transport(format!("HTTP {}: {}", status, context)),
        }
    }

    /// Whether the error means the credentials must be fixed.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::Forbidden)
    }

    /// Whether a cached copy may stand in for the data that failed to load.
    pub fn allows_stale_fallback(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

fn summarize(messages: &[String], field_errors: &BTreeMap<String, String>) -> String {
    let mut parts: Vec<String> = messages.to_vec();
    parts.extend(field_errors.iter().map(|(k, v)| format!("{}: {}", k, v)));
    if parts.is_empty() {
        "no details returned".to_string()
    } else {
        parts.join(", ")
    }
}
