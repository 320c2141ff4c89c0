//! Workers KV client error types.

use std::sync::Arc;

use marknav_core::KvError;

/// Errors from the Workers KV REST client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KvHttpError {
    /// Account, namespace or token missing, or an unusable base URL.
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// Token rejected (401/403).
    #[error("authentication failed: API token rejected")]
    Unauthorized,

    /// Rate limited by the API (429).
    #[error("rate limited: too many requests")]
    RateLimited,

    /// Non-success status without a parsable error body.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Error reported in the API response envelope.
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },
}

impl From<reqwest::Error> for KvHttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { KvHttpError::Timeout } else { KvHttpError::Network(Arc::new(err)) }
    }
}

impl From<KvHttpError> for KvError {
    fn from(err: KvHttpError) -> Self {
        match err {
            KvHttpError::Unauthorized => KvError::Unauthorized,
            KvHttpError::Timeout => KvError::Timeout,
            other => KvError::Backend(other.to_string()),
        }
    }
}
