//! Error taxonomy shared by every component of the engine.
//!
//! All variants are `Clone + Serialize + Deserialize + PartialEq + Eq` so a
//! `HubError` can cross an FFI/IPC boundary intact. None embed non-serializable
//! types such as `std::io::Error` directly; I/O failures are captured as a
//! `{kind, message}` pair instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Portable description of an `std::io::Error`, since the original type does
/// not implement `Serialize`/`Clone`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IoFailure {
    /// `std::io::ErrorKind`, rendered via its `Debug` impl (e.g. `NotFound`).
    pub kind: String,
    /// The error's display message.
    pub message: String,
}

impl From<&std::io::Error> for IoFailure {
    fn from(err: &std::io::Error) -> Self {
        Self {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for IoFailure {
    fn from(err: std::io::Error) -> Self {
        Self::from(&err)
    }
}

impl std::fmt::Display for IoFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// Error taxonomy for the download/verify/repair engine.
///
/// Variant names describe *kinds*, matching the error taxonomy's "kinds, not
/// type names" discipline: `kind()` returns a stable machine-readable tag a
/// caller can map to an icon or retry affordance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HubError {
    /// Malformed `repo_id` or file name. Never retried.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What was malformed.
        message: String,
    },

    /// 401 from the hub. Surfaced with a `needs_token` hint. Not retried.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Server-provided message, if any.
        message: String,
    },

    /// 403 from the hub. Surfaced with a `needs_token` hint. Not retried.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Server-provided message, if any.
        message: String,
    },

    /// 404 from the hub. Recorded in the missing-repo cache; suppressed for
    /// 6 hours.
    #[error("not found: {message}")]
    NotFound {
        /// Server-provided message, if any.
        message: String,
    },

    /// 429 from the hub. Fed into the network failure manager.
    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited {
        /// Seconds to wait, parsed from the `Retry-After` header when present.
        retry_after_secs: Option<u64>,
    },

    /// Caller attempted an operation while backoff is still in effect.
    #[error("network backoff in effect, {wait_secs}s remaining")]
    NetworkBackoff {
        /// Seconds remaining before the next attempt is allowed.
        wait_secs: u64,
    },

    /// Transport-level failure (connect/read/5xx). Triggers per-file retry
    /// then backoff.
    #[error("network error: {message}")]
    NetworkError {
        /// Description of the transport failure.
        message: String,
    },

    /// Size or hash mismatch after a fresh download. One repair attempt is
    /// made before this becomes `Unrecoverable`.
    #[error("corrupted file {file}: {reason}")]
    Corrupted {
        /// The file's relative path within the repo.
        file: String,
        /// What mismatched (size vs hash) and the observed/expected values.
        reason: String,
    },

    /// Verify+repair could not produce a clean state for one or more files.
    #[error("unrecoverable: {} file(s) still bad", files.len())]
    Unrecoverable {
        /// Relative paths of files that remain bad after one repair cycle.
        files: Vec<String>,
    },

    /// Out-of-space or permission failure. Fatal, surfaced immediately.
    #[error("disk error at {path}: {source}")]
    DiskError {
        /// The path the operation was acting on.
        path: String,
        /// Underlying I/O failure.
        source: IoFailure,
    },

    /// Explicit cancellation. Not an error for metrics purposes.
    #[error("operation cancelled")]
    Cancelled,
}

impl HubError {
    /// Stable machine-readable tag (matches the `kind` serde tag), for a UI to
    /// map to an icon or retry affordance without matching on the full enum.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::NetworkBackoff { .. } => "network_backoff",
            Self::NetworkError { .. } => "network_error",
            Self::Corrupted { .. } => "corrupted",
            Self::Unrecoverable { .. } => "unrecoverable",
            Self::DiskError { .. } => "disk_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the UI should offer a "needs token" affordance.
    #[must_use]
    pub const fn needs_token(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Forbidden { .. })
    }

    /// Whether this error is network-class (eligible to feed the backoff
    /// gate). HTTP 4xx other than 429 is explicitly excluded per spec: it is
    /// terminal, not a backoff event.
    #[must_use]
    pub const fn is_backoff_eligible(&self) -> bool {
        matches!(self, Self::NetworkError { .. } | Self::RateLimited { .. })
    }

    /// Build a `DiskError` from a path and an `std::io::Error`.
    pub fn disk(path: impl Into<String>, source: &std::io::Error) -> Self {
        Self::DiskError {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Result alias used throughout the engine.
pub type HubResult<T> = Result<T, HubError>;
