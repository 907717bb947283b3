//! Transport-level error classification for the hub HTTP backend (§4.4
//! error mapping table). This crate's own error type captures the raw HTTP
//! outcome; [`HfError::into_hub_error`] is the single place that applies the
//! exact status-to-`HubError` mapping so every call site agrees.

use hfcache_core::error::HubError;
use thiserror::Error;

/// Result type alias for backend-internal operations.
pub type HfResult<T> = Result<T, HfError>;

/// Raw outcome of an HTTP call, before it is classified into a [`HubError`].
#[derive(Debug, Error)]
pub enum HfError {
    /// A response came back with a non-2xx status.
    #[error("http status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided body text, or a generic description.
        message: String,
        /// Parsed `Retry-After` header, seconds, when present (429 only).
        retry_after_secs: Option<u64>,
    },

    /// Connect/read/transport-level failure (never produced a status code).
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not decode as expected.
    #[error("invalid response: {0}")]
    Decode(String),

    /// URL construction failed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<reqwest::Error> for HfError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for HfError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl HfError {
    /// Apply the §4.4 status-to-error mapping. Transport failures and 5xx
    /// become `NetworkError` (backoff-eligible); 401/403/404/429 each get
    /// their exact variant; any other 4xx is a terminal `InvalidRequest`,
    /// never a backoff event (§7).
    #[must_use]
    pub fn into_hub_error(self) -> HubError {
        match self {
            Self::Status {
                status,
                message,
                retry_after_secs,
            } => match status {
                401 => HubError::Unauthorized { message },
                403 => HubError::Forbidden { message },
                404 => HubError::NotFound { message },
                429 => HubError::RateLimited { retry_after_secs },
                500..=599 => HubError::NetworkError {
                    message: format!("server error {status}: {message}"),
                },
                _ => HubError::InvalidRequest {
                    message: format!("unexpected status {status}: {message}"),
                },
            },
            Self::Network(message) => HubError::NetworkError { message },
            Self::Decode(message) => HubError::NetworkError {
                message: format!("decode error: {message}"),
            },
            Self::InvalidUrl(err) => HubError::InvalidRequest {
                message: err.to_string(),
            },
        }
    }
}
