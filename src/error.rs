//! Error types for the Ad Library collection engine.

use std::time::Duration;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, AdLibraryError>;

/// Errors raised by the collection engine.
#[derive(Debug, Error)]
pub enum AdLibraryError {
    /// Session bootstrap or token refresh could not obtain a working `lsd`
    /// token after one challenge round and one retry.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The remote service signaled a rate limit (HTTP 429 or a rate-limit
    /// marker in the response body) and retries were exhausted.
    #[error("rate limited by the remote service, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Consecutive session refresh failures exceeded the configured cap.
    /// The collector is unusable until reconstructed.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// A proxy endpoint string could not be parsed. Raised at construction,
    /// never during collection.
    #[error("invalid proxy endpoint: {0}")]
    InvalidProxy(String),

    /// The proxy pool was constructed with no endpoints.
    #[error("no proxy endpoints configured")]
    NoProxiesConfigured,

    /// An enumerated parameter was outside its allowed set.
    #[error("invalid value for '{field}': {value:?} (allowed: {allowed})")]
    InvalidParameter {
        field: &'static str,
        value: String,
        allowed: String,
    },

    /// The response could not be parsed, or lacked a recognized `data`
    /// envelope after a successful HTTP exchange. Carries the raw body
    /// for diagnostics.
    #[error("protocol error: {message}")]
    Protocol { message: String, body: String },

    /// Connection-level failure after retries. Carries the last underlying
    /// cause when one exists; persistent HTTP 5xx responses surface here
    /// with a message only.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Persistent dedup store failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AdLibraryError {
    fn from(source: reqwest::Error) -> Self {
        Self::Network {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

impl AdLibraryError {
    /// Protocol error with a message and the offending body.
    pub fn protocol(message: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            body: body.into(),
        }
    }

    /// True when this error is a rate limit, which the collection stream
    /// treats as clean termination rather than a failure.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
