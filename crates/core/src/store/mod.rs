//! Collection-keyed local persistence contract.

mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

pub use memory::InMemoryLocalStore;

/// Canonical list of collections managed by every `LocalStore`.
pub const ALL_COLLECTIONS: [Collection; 5] = [
    Collection::Animals,
    Collection::Quizzes,
    Collection::UserProgress,
    Collection::PendingSync,
    Collection::AppSettings,
];

/// Named collection inside the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Animals,
    Quizzes,
    UserProgress,
    PendingSync,
    AppSettings,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Animals => "animals",
            Collection::Quizzes => "quizzes",
            Collection::UserProgress => "user_progress",
            Collection::PendingSync => "pending_sync",
            Collection::AppSettings => "app_settings",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ALL_COLLECTIONS
            .iter()
            .copied()
            .find(|collection| collection.as_str() == value)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record in a collection. `id` is unique within its collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub payload: serde_json::Value,
}

impl Record {
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Builds a record from a server object, taking the id from its `id` field.
    pub fn from_entity(payload: serde_json::Value) -> Result<Self> {
        let id = match payload.get("id") {
            Some(serde_json::Value::String(value)) if !value.trim().is_empty() => value.clone(),
            Some(serde_json::Value::Number(value)) => value.to_string(),
            _ => {
                return Err(Error::invalid_request(
                    "Cached entity is missing a string or numeric 'id'",
                ))
            }
        };
        Ok(Self { id, payload })
    }
}

/// Durable persistence keyed by collection and record id.
///
/// Each operation is individually atomic. Implementations surface failures as
/// `StorageError` and never retry on their own.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Idempotent initialization. Creates missing collections and re-opens a
    /// closed store.
    async fn init(&self) -> Result<()>;

    /// Ends the store lifecycle. Later operations fail until `init` runs again.
    async fn close(&self) -> Result<()>;

    /// Upsert: replaces any record with the same id.
    async fn put(&self, collection: Collection, record: Record) -> Result<()>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>>;

    /// Snapshot of every record in the collection at call time.
    async fn get_all(&self, collection: Collection) -> Result<Vec<Record>>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    async fn clear(&self, collection: Collection) -> Result<()>;

    /// Wipes every managed collection.
    async fn clear_all(&self) -> Result<()>;
}
