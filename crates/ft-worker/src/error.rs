//! Error types for the offline worker.

use thiserror::Error;

use crate::lifecycle::WorkerState;

/// Failure to reach the network.
///
/// Non-2xx responses are not errors at this layer; they are returned as
/// responses and the routing strategy decides what to do with them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum NetworkError {
    /// The request could not be sent or the connection dropped.
    #[error("network request failed: {0}")]
    Transport(String),

    /// The request URL could not be resolved against the worker origin.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

/// Cache storage failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CacheError {
    /// The backing store refused the write because it is full.
    #[error("cache quota exceeded")]
    QuotaExceeded,

    /// The backing store is unusable.
    #[error("cache storage error: {0}")]
    Storage(String),
}

/// Errors surfaced by the worker controller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerError {
    /// A network failure with nothing cached to fall back to.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A lifecycle event arrived in a state that cannot accept it.
    #[error("invalid worker state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// State the worker was in.
        from: WorkerState,
        /// State the event asked for.
        to: WorkerState,
    },

    /// The worker configuration is unusable.
    #[error("invalid worker configuration: {0}")]
    Config(String),

    /// Failed to read a configuration file.
    #[error("I/O error: {0}")]
    Io(String),
}

impl WorkerError {
    /// Get a user-friendly message for display in the page.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Network(NetworkError::Transport(_)) => {
                "You appear to be offline and this page has not been saved for offline use."
            }
            Self::Network(_) => "The requested address is not valid.",
            Self::InvalidStateTransition { .. } => {
                "The app is already updating. Please wait a moment."
            }
            Self::Config(_) | Self::Io(_) => "Offline support could not be set up.",
        }
    }

    /// Returns whether retrying the same operation later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(NetworkError::Transport(_)) | Self::Io(_))
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for WorkerError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
