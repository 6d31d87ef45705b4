//! Ports the sync engine uses to reach the outside world.

use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use super::model::PendingMutation;
use super::retry::{classify_http_status, SyncRetryClass};
use crate::store::Collection;

/// Failure reported by a transport, already classified for retry policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub status: Option<u16>,
    pub retry_class: SyncRetryClass,
}

impl TransportError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
            retry_class: classify_http_status(status),
        }
    }

    /// Connection refused, timeout, dropped connection.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            retry_class: SyncRetryClass::Retryable,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            retry_class: SyncRetryClass::Permanent,
        }
    }
}

/// Delivers one outbox entry to the remote API.
///
/// Implementations must send `auth_snapshot` as the bearer token and
/// `idempotency_key` with the request.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn deliver(&self, mutation: &PendingMutation) -> Result<(), TransportError>;
}

/// Fetches reference data (quizzes, animals) while online.
#[async_trait]
pub trait ReferenceDataSource: Send + Sync {
    async fn fetch_reference_data(
        &self,
        collection: Collection,
        token: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, TransportError>;
}

/// Supplies the bearer token captured into new outbox entries.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Optional platform background-sync registration. Pure acceleration:
/// the periodic timer still drives delivery when this is absent or fails.
pub trait BackgroundSyncHook: Send + Sync {
    fn is_supported(&self) -> bool;
    fn register(&self, tag: &str) -> Result<(), String>;
}

/// Token holder updated by the host whenever the session changes.
#[derive(Debug, Default)]
pub struct SessionTokenStore {
    token: RwLock<Option<String>>,
}

impl SessionTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }
}

impl AccessTokenProvider for SessionTokenStore {
    fn access_token(&self) -> Option<String> {
        self.token
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .filter(|token| !token.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_classifies_by_status() {
        assert_eq!(
            TransportError::from_status(500, "boom").retry_class,
            SyncRetryClass::Retryable
        );
        assert_eq!(
            TransportError::from_status(401, "expired").retry_class,
            SyncRetryClass::ReauthRequired
        );
        assert_eq!(
            TransportError::from_status(400, "bad").retry_class,
            SyncRetryClass::Permanent
        );
        assert_eq!(
            TransportError::network("refused").retry_class,
            SyncRetryClass::Retryable
        );
    }

    #[test]
    fn session_token_store_ignores_blank_tokens() {
        let store = SessionTokenStore::default();
        assert_eq!(store.access_token(), None);
        store.set("abc");
        assert_eq!(store.access_token().as_deref(), Some("abc"));
        store.set("  ");
        assert_eq!(store.access_token(), None);
        store.set("abc");
        store.clear();
        assert_eq!(store.access_token(), None);
    }
}
