//! Unified error handling for the transport tracker.
//!
//! Display strings double as the user-facing messages surfaced by the
//! lifecycle controller, so they name the action the user can take where
//! one exists.

use thiserror::Error;

/// Unified error type for tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// No trip candidate staged before a lifecycle transition.
    #[error("no transport selected: choose a trip before starting")]
    NoTripSelected,

    /// Location permission was requested and denied.
    #[error("location permission denied")]
    PermissionDenied,

    /// Neither the background nor the foreground subscription could start.
    #[error("location subscription failed: {message}")]
    SubscriptionFailed { message: String },

    /// Durable store failure (read, write or remove).
    #[error("store error: {message}")]
    Store { message: String },

    /// Persisted or wire payload failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport or non-success response from the backend.
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// Genuine programming error; not expected during normal operation.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<rusqlite::Error> for TrackerError {
    fn from(e: rusqlite::Error) -> Self {
        TrackerError::Store {
            message: e.to_string(),
        }
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(e: reqwest::Error) -> Self {
        TrackerError::Http {
            message: e.to_string(),
            status_code: e.status().map(|s| s.as_u16()),
        }
    }
}

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
