//! Error types for the Nextcloud OCS client.

use thiserror::Error;

/// Result alias used throughout the client.
pub type NextcloudResult<T> = Result<T, NextcloudError>;

/// Errors returned by [`crate::client::NextcloudClient`].
#[derive(Debug, Error)]
pub enum NextcloudError {
    /// The server could not be reached (DNS, TCP, TLS, timeout).
    #[error("Nextcloud unreachable: {0}")]
    Unreachable(String),

    /// The server asked us to slow down (HTTP 429 or OCS status 429).
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Rate limiting persisted through every retry attempt.
    #[error("{operation} still rate limited after {attempts} attempt(s)")]
    RetriesExhausted { operation: String, attempts: u32 },

    /// Protocol-level success wrapping an application status other than the
    /// endpoint's success sentinel.
    #[error("{operation} failed with OCS status {statuscode}: {message}")]
    Api {
        operation: String,
        statuscode: i64,
        message: String,
    },

    /// `createUser` on an identifier the server already knows.
    #[error("user already exists: {0}")]
    UserAlreadyExists(String),

    /// Non-success HTTP status without a usable OCS envelope.
    #[error("{operation} failed with HTTP {status}: {body}")]
    Http {
        operation: String,
        status: u16,
        body: String,
    },

    /// Response body could not be decoded.
    #[error("failed to parse OCS response: {0}")]
    Parse(String),

    /// Client configuration is unusable.
    #[error("invalid Nextcloud configuration: {0}")]
    InvalidConfig(String),
}

impl NextcloudError {
    /// Only rate limiting is retried; everything else surfaces immediately.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether the error means the remote end was not reachable at all.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

impl From<reqwest::Error> for NextcloudError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Unreachable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for NextcloudError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
