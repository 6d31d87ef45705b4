//! Error types shared by the offline store and sync engine.

use thiserror::Error;

use crate::sync::TransportError;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by a `LocalStore` implementation.
///
/// The store never retries internally; callers decide what to do.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The backing storage has no room left for the write.
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The store is closed or cannot be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Persisted data could not be decoded.
    #[error("Storage corrupt: {0}")]
    Corrupt(String),

    #[error("Storage internal error: {0}")]
    Internal(String),
}

/// Top-level error for the offline/sync core.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A remote call failed; carries the retry classification.
    #[error("Remote API error: {0}")]
    Transport(#[from] TransportError),

    #[error("Device is offline")]
    Offline,

    /// The captured token was rejected or no token is available.
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot(message.into())
    }

    /// True when the failure came from the local store.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncRetryClass;

    #[test]
    fn storage_errors_convert_transparently() {
        let err: Error = StorageError::QuotaExceeded("full".to_string()).into();
        assert!(err.is_storage());
        assert_eq!(err.to_string(), "Storage quota exceeded: full");
    }

    #[test]
    fn transport_errors_keep_retry_class() {
        let err: Error = TransportError::from_status(503, "unavailable").into();
        match err {
            Error::Transport(inner) => assert_eq!(inner.retry_class, SyncRetryClass::Retryable),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
