//! In-memory `LocalStore`, used as the test double and for ephemeral sessions.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{Collection, LocalStore, Record, ALL_COLLECTIONS};
use crate::errors::{Result, StorageError};

type Collections = HashMap<Collection, BTreeMap<String, serde_json::Value>>;

#[derive(Debug)]
pub struct InMemoryLocalStore {
    collections: RwLock<Collections>,
    closed: AtomicBool,
    record_limit: Option<usize>,
}

impl Default for InMemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        let collections = ALL_COLLECTIONS
            .iter()
            .map(|collection| (*collection, BTreeMap::new()))
            .collect();
        Self {
            collections: RwLock::new(collections),
            closed: AtomicBool::new(false),
            record_limit: None,
        }
    }

    /// Store that rejects inserts of new records once `limit` records exist
    /// across all collections.
    pub fn with_record_limit(limit: usize) -> Self {
        Self {
            record_limit: Some(limit),
            ..Self::new()
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("In-memory store is closed".to_string()).into());
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        self.ensure_open()?;
        self.collections
            .read()
            .map_err(|_| StorageError::Internal("In-memory store lock is poisoned".to_string()).into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        self.ensure_open()?;
        self.collections
            .write()
            .map_err(|_| StorageError::Internal("In-memory store lock is poisoned".to_string()).into())
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn init(&self) -> Result<()> {
        self.closed.store(false, Ordering::SeqCst);
        let mut collections = self.write()?;
        for collection in ALL_COLLECTIONS {
            collections.entry(collection).or_default();
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn put(&self, collection: Collection, record: Record) -> Result<()> {
        let mut collections = self.write()?;
        if let Some(limit) = self.record_limit {
            let total: usize = collections.values().map(BTreeMap::len).sum();
            let replacing = collections
                .get(&collection)
                .is_some_and(|records| records.contains_key(&record.id));
            if !replacing && total >= limit {
                return Err(StorageError::QuotaExceeded(format!(
                    "record limit {} reached while writing to '{}'",
                    limit, collection
                ))
                .into());
            }
        }
        collections
            .entry(collection)
            .or_default()
            .insert(record.id, record.payload);
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let collections = self.read()?;
        Ok(collections
            .get(&collection)
            .and_then(|records| records.get(id))
            .map(|payload| Record::new(id, payload.clone())))
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Record>> {
        let collections = self.read()?;
        Ok(collections
            .get(&collection)
            .map(|records| {
                records
                    .iter()
                    .map(|(id, payload)| Record::new(id.clone(), payload.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let mut collections = self.write()?;
        if let Some(records) = collections.get_mut(&collection) {
            records.remove(id);
        }
        Ok(())
    }

    async fn clear(&self, collection: Collection) -> Result<()> {
        let mut collections = self.write()?;
        if let Some(records) = collections.get_mut(&collection) {
            records.clear();
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut collections = self.write()?;
        for records in collections.values_mut() {
            records.clear();
        }
        Ok(())
    }
}
