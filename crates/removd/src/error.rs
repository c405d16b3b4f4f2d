//! Error types for the removd runtime.

use removd_core::decode::DecodeError;
use removd_core::encode::EncodeError;
use removd_core::{ProbeError, ShrinkError, TierError};
use thiserror::Error;

/// Result type alias for removd operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime errors.
///
/// Per-item errors never abort a batch; the scheduler turns them into
/// [`Failure`](crate::scheduler::Failure) values using their `Display` text.
#[derive(Debug, Error)]
pub enum Error {
    /// Request rejected before any I/O.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Tier(#[from] TierError),

    #[error(transparent)]
    Shrink(#[from] ShrinkError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The transform service answered with an error.
    #[error("{0}")]
    Remote(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A blocking task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
