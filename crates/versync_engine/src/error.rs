//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote answered with an error status.
    #[error("remote error {status}: {message}")]
    Remote {
        /// Status code returned by the remote.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Local durable store error.
    #[error("store error: {0}")]
    Store(String),

    /// Payload or snapshot could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A full sync pass is already running.
    #[error("sync already in progress")]
    SyncInProgress,

    /// The device is offline.
    #[error("device is offline")]
    Offline,

    /// No item is tracked under the id.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// No open conflict exists for the id.
    #[error("no open conflict for item {0}")]
    ConflictNotFound(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Returns true if this error can be retried.
    ///
    /// Server-side failures, throttling and request timeouts are retryable;
    /// other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Remote { status, .. } => *status >= 500 || matches!(status, 408 | 429),
            SyncError::Timeout => true,
            _ => false,
        }
    }
}
