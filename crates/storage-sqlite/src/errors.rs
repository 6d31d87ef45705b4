use diesel::result::Error as DieselError;
use thiserror::Error;

use quizsync_core::errors::{Error, StorageError as LocalStoreError};

/// SQLite-layer failures, mapped onto the `LocalStore` error taxonomy at the
/// crate boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database query failed: {0}")]
    Query(#[from] DieselError),

    #[error("Database connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("Database file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database writer is not running: {0}")]
    WriterClosed(String),
}

/// Maps SQLite result messages that have a `LocalStore` meaning.
fn classify_sqlite_message(sqlite_message: &str, message: String) -> Option<LocalStoreError> {
    let lowered = sqlite_message.to_ascii_lowercase();
    if lowered.contains("disk is full") {
        Some(LocalStoreError::QuotaExceeded(message))
    } else if lowered.contains("malformed") || lowered.contains("not a database") {
        Some(LocalStoreError::Corrupt(message))
    } else if lowered.contains("database is locked") || lowered.contains("unable to open") {
        Some(LocalStoreError::Unavailable(message))
    } else {
        None
    }
}

impl From<StorageError> for LocalStoreError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match &err {
            StorageError::Query(DieselError::DatabaseError(_, info)) => {
                classify_sqlite_message(info.message(), message.clone())
                    .unwrap_or(LocalStoreError::Internal(message))
            }
            StorageError::Query(DieselError::DeserializationError(_)) => {
                LocalStoreError::Corrupt(message)
            }
            StorageError::Connection(inner) => {
                classify_sqlite_message(&inner.to_string(), message.clone())
                    .unwrap_or(LocalStoreError::Unavailable(message))
            }
            StorageError::Pool(_) | StorageError::Io(_) | StorageError::WriterClosed(_) => {
                LocalStoreError::Unavailable(message)
            }
            StorageError::Query(_) | StorageError::Migration(_) => {
                LocalStoreError::Internal(message)
            }
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Storage(err.into())
    }
}
