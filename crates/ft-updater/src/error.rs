//! Error types for version polling and reload coordination.

use std::path::PathBuf;

use thiserror::Error;

/// Durable key-value storage failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// File I/O error.
    #[error("failed to {operation} store file: {}", path.display())]
    Io {
        /// What was being attempted.
        operation: &'static str,
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The store file exists but is not a JSON object of strings.
    #[error("store file {} is corrupt: {reason}", path.display())]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// The backing storage refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while checking for a new version.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpdateError {
    /// Network request failed.
    #[error("network error: {0}")]
    Network(String),

    /// The descriptor request returned a non-2xx status.
    #[error("version descriptor returned HTTP {status}")]
    Http {
        /// Status code.
        status: u16,
    },

    /// The descriptor body was not a valid descriptor.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// The descriptor has an empty version.
    #[error("version descriptor has no version")]
    MissingVersion,

    /// The base URL or descriptor path is unusable.
    #[error("invalid descriptor URL: {0}")]
    InvalidUrl(String),

    /// Durable storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The coordinator task is no longer running.
    #[error("update coordinator has stopped")]
    Stopped,
}

impl UpdateError {
    /// Returns a user-friendly error message suitable for display.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Network(_) => "Could not reach the server. Please check your internet connection.",
            Self::Http { .. } | Self::JsonParse(_) | Self::MissingVersion => {
                "The server did not return usable version information."
            }
            Self::InvalidUrl(_) => "The update address is not valid.",
            Self::Store(_) => "Could not access local storage.",
            Self::Stopped => "Update checking has stopped.",
        }
    }

    /// Returns whether this error is potentially recoverable with a retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for UpdateError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse(err.to_string())
    }
}

impl From<ft_worker::WorkerError> for UpdateError {
    fn from(err: ft_worker::WorkerError) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<ft_worker::NetworkError> for UpdateError {
    fn from(err: ft_worker::NetworkError) -> Self {
        Self::Network(err.to_string())
    }
}

/// Result type alias for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;
