//! Durable FIFO outbox of pending mutations, stored in the `pending_sync`
//! collection of a `LocalStore`.

use std::sync::Arc;

use log::debug;
use serde_json::json;
use tokio::sync::Mutex;

use super::model::{MutationKind, PendingMutation};
use super::transport::TransportError;
use crate::errors::{Result, StorageError};
use crate::store::{Collection, LocalStore, Record};

const OUTBOX_SEQUENCE_KEY: &str = "pending_sync_sequence";

fn record_key(id: u64) -> String {
    // Zero padded so lexical and numeric order agree in every backend.
    format!("{:020}", id)
}

fn to_record(mutation: &PendingMutation) -> Result<Record> {
    Ok(Record::new(
        record_key(mutation.id),
        serde_json::to_value(mutation)?,
    ))
}

fn from_record(record: Record) -> Result<PendingMutation> {
    serde_json::from_value(record.payload).map_err(|e| {
        StorageError::Corrupt(format!("Outbox entry '{}' is unreadable: {}", record.id, e)).into()
    })
}

pub struct SyncOutbox {
    store: Arc<dyn LocalStore>,
    // Highest id issued by this process. Serializes id assignment and every
    // check-then-write on an entry; LocalStore only guarantees per-operation
    // atomicity.
    sequence: Mutex<u64>,
}

impl SyncOutbox {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            sequence: Mutex::new(0),
        }
    }

    /// Reserves the next id. The reservation is persisted before the entry is
    /// written so a crash in between leaves a gap, never a reused id. The
    /// in-process high-water mark keeps ids increasing across a `clear_all`.
    async fn reserve_id(&self, last_issued: &mut u64) -> Result<u64> {
        let stored_next = self
            .store
            .get(Collection::AppSettings, OUTBOX_SEQUENCE_KEY)
            .await?
            .and_then(|record| record.payload.get("next").and_then(|v| v.as_u64()))
            .unwrap_or(1);
        let highest_queued = self
            .store
            .get_all(Collection::PendingSync)
            .await?
            .iter()
            .filter_map(|record| record.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        let id = stored_next.max(highest_queued + 1).max(*last_issued + 1);
        self.store
            .put(
                Collection::AppSettings,
                Record::new(OUTBOX_SEQUENCE_KEY, json!({ "next": id + 1 })),
            )
            .await?;
        *last_issued = id;
        Ok(id)
    }

    /// Appends a mutation to the tail of the outbox. Fails only when the
    /// local store does.
    pub async fn enqueue(
        &self,
        kind: MutationKind,
        payload: serde_json::Value,
        auth_snapshot: impl Into<String>,
    ) -> Result<u64> {
        let mut last_issued = self.sequence.lock().await;
        let id = self.reserve_id(&mut last_issued).await?;
        let mutation = PendingMutation::new(id, kind, payload, auth_snapshot);
        self.store
            .put(Collection::PendingSync, to_record(&mutation)?)
            .await?;
        debug!(
            "[QuizSync] Enqueued {} mutation id={} key={}",
            kind.as_str(),
            id,
            mutation.idempotency_key
        );
        Ok(id)
    }

    /// Re-queues a mutation taken from an exported snapshot. Keeps its
    /// idempotency key and creation time but assigns a fresh local id.
    /// Returns `None` when an entry with the same key is already queued.
    pub async fn restore(&self, mutation: PendingMutation) -> Result<Option<u64>> {
        let mut last_issued = self.sequence.lock().await;
        let already_queued = self
            .peek_all()
            .await?
            .iter()
            .any(|queued| queued.idempotency_key == mutation.idempotency_key);
        if already_queued {
            return Ok(None);
        }

        let id = self.reserve_id(&mut last_issued).await?;
        let restored = PendingMutation { id, ..mutation };
        self.store
            .put(Collection::PendingSync, to_record(&restored)?)
            .await?;
        Ok(Some(id))
    }

    /// All pending entries, oldest first.
    pub async fn peek_all(&self) -> Result<Vec<PendingMutation>> {
        let mut entries = self
            .store
            .get_all(Collection::PendingSync)
            .await?
            .into_iter()
            .map(from_record)
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.id);
        Ok(entries)
    }

    pub async fn get(&self, id: u64) -> Result<Option<PendingMutation>> {
        self.store
            .get(Collection::PendingSync, &record_key(id))
            .await?
            .map(from_record)
            .transpose()
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.get_all(Collection::PendingSync).await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Drops an entry by id.
    pub async fn remove(&self, id: u64) -> Result<()> {
        self.store
            .delete(Collection::PendingSync, &record_key(id))
            .await
    }

    /// Drops a delivered entry, but only if the stored entry under its id is
    /// still the same mutation. Returns false when it was already gone or the
    /// id now belongs to a different mutation.
    pub async fn acknowledge(&self, delivered: &PendingMutation) -> Result<bool> {
        let _sequence = self.sequence.lock().await;
        match self.get(delivered.id).await? {
            Some(stored) if stored.idempotency_key == delivered.idempotency_key => {
                self.remove(delivered.id).await?;
                Ok(true)
            }
            Some(_) => {
                debug!(
                    "[QuizSync] Entry id={} was replaced during delivery; keeping the new one",
                    delivered.id
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Bumps the attempt counter of an entry without removing it.
    /// Returns false when the entry no longer exists.
    pub async fn increment_attempts(&self, id: u64) -> Result<bool> {
        self.update_entry(id, None, |mutation| {
            mutation.attempts = mutation.attempts.saturating_add(1);
        })
        .await
    }

    /// Bumps the attempt counter and records the classified failure.
    pub async fn record_failure(
        &self,
        failed: &PendingMutation,
        error: &TransportError,
    ) -> Result<bool> {
        self.update_entry(failed.id, Some(&failed.idempotency_key), |mutation| {
            mutation.attempts = mutation.attempts.saturating_add(1);
            mutation.last_error = Some(error.message.clone());
            mutation.last_error_code = Some(error.retry_class.code().to_string());
        })
        .await
    }

    /// Notes that the captured token was rejected. Attempts are left alone:
    /// the entry was never judged by the server.
    pub async fn record_auth_rejection(
        &self,
        rejected: &PendingMutation,
        error: &TransportError,
    ) -> Result<bool> {
        self.update_entry(rejected.id, Some(&rejected.idempotency_key), |mutation| {
            mutation.last_error = Some(error.message.clone());
            mutation.last_error_code = Some(error.retry_class.code().to_string());
        })
        .await
    }

    async fn update_entry(
        &self,
        id: u64,
        expected_key: Option<&str>,
        apply: impl FnOnce(&mut PendingMutation),
    ) -> Result<bool> {
        let _sequence = self.sequence.lock().await;
        let Some(mut mutation) = self.get(id).await? else {
            return Ok(false);
        };
        if expected_key.is_some_and(|key| key != mutation.idempotency_key) {
            return Ok(false);
        }
        apply(&mut mutation);
        self.store
            .put(Collection::PendingSync, to_record(&mutation)?)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::store::InMemoryLocalStore;
    use crate::sync::SyncRetryClass;

    fn outbox() -> (Arc<InMemoryLocalStore>, SyncOutbox) {
        let store = Arc::new(InMemoryLocalStore::new());
        let outbox = SyncOutbox::new(store.clone());
        (store, outbox)
    }

    #[tokio::test]
    async fn enqueue_assigns_increasing_ids_and_peeks_fifo() {
        let (_store, outbox) = outbox();
        let mut ids = Vec::new();
        for score in [10, 20, 30] {
            ids.push(
                outbox
                    .enqueue(
                        MutationKind::QuizResult,
                        json!({"quiz_id": "q1", "score": score}),
                        "token-a",
                    )
                    .await
                    .expect("enqueue"),
            );
        }
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

        let pending = outbox.peek_all().await.expect("peek");
        let scores: Vec<_> = pending.iter().map(|m| m.payload["score"].clone()).collect();
        assert_eq!(scores, vec![json!(10), json!(20), json!(30)]);
        assert!(pending.iter().all(|m| m.auth_snapshot == "token-a"));
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_remove() {
        let (_store, outbox) = outbox();
        let first = outbox
            .enqueue(MutationKind::QuizResult, json!({}), "t")
            .await
            .expect("enqueue");
        outbox.remove(first).await.expect("remove");
        let second = outbox
            .enqueue(MutationKind::QuizResult, json!({}), "t")
            .await
            .expect("enqueue");
        assert!(second > first);
    }

    #[tokio::test]
    async fn increment_attempts_keeps_entry_and_immutable_fields() {
        let (_store, outbox) = outbox();
        let id = outbox
            .enqueue(MutationKind::UserProgress, json!({"level": 3}), "t")
            .await
            .expect("enqueue");
        let before = outbox.get(id).await.expect("get").expect("present");

        assert!(outbox.increment_attempts(id).await.expect("increment"));
        outbox
            .record_failure(&before, &TransportError::from_status(400, "bad payload"))
            .await
            .expect("record failure");

        let after = outbox.get(id).await.expect("get").expect("present");
        assert_eq!(after.attempts, 2);
        assert!(after.is_flagged());
        assert_eq!(after.last_error.as_deref(), Some("bad payload"));
        assert_eq!(after.kind, before.kind);
        assert_eq!(after.payload, before.payload);
        assert_eq!(after.auth_snapshot, before.auth_snapshot);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.idempotency_key, before.idempotency_key);
        assert_eq!(
            after.last_error_code.as_deref(),
            Some(SyncRetryClass::Permanent.code())
        );
    }

    #[tokio::test]
    async fn increment_attempts_on_missing_entry_is_noop() {
        let (_store, outbox) = outbox();
        assert!(!outbox.increment_attempts(99).await.expect("increment"));
    }

    #[tokio::test]
    async fn restore_skips_duplicate_idempotency_keys() {
        let (_store, outbox) = outbox();
        let id = outbox
            .enqueue(MutationKind::BadgeEarned, json!({"badge_id": "b1"}), "t")
            .await
            .expect("enqueue");
        let existing = outbox.get(id).await.expect("get").expect("present");

        assert_eq!(outbox.restore(existing.clone()).await.expect("restore"), None);

        let mut foreign = existing.clone();
        foreign.idempotency_key = "other-key".to_string();
        let restored_id = outbox
            .restore(foreign)
            .await
            .expect("restore")
            .expect("new id");
        assert!(restored_id > id);
        assert_eq!(outbox.len().await.expect("len"), 2);
    }

    #[tokio::test]
    async fn enqueue_surfaces_storage_failure() {
        let store = Arc::new(InMemoryLocalStore::with_record_limit(1));
        let outbox = SyncOutbox::new(store);
        let err = outbox
            .enqueue(MutationKind::QuizResult, json!({}), "t")
            .await
            .expect_err("sequence record fills the quota");
        assert!(matches!(err, Error::Storage(StorageError::QuotaExceeded(_))));
    }

    #[tokio::test]
    async fn ids_keep_increasing_after_wipe() {
        let (store, outbox) = outbox();
        let first = outbox
            .enqueue(MutationKind::QuizResult, json!({}), "t")
            .await
            .expect("enqueue");
        store.clear_all().await.expect("wipe");
        let second = outbox
            .enqueue(MutationKind::QuizResult, json!({}), "t")
            .await
            .expect("enqueue");
        assert!(second > first);
    }

    #[tokio::test]
    async fn stale_snapshot_cannot_touch_an_entry_that_reused_its_id() {
        let store = Arc::new(InMemoryLocalStore::new());
        let before_restart = SyncOutbox::new(store.clone());
        let id = before_restart
            .enqueue(MutationKind::QuizResult, json!({"quiz_id": "old"}), "t")
            .await
            .expect("enqueue");
        let stale = before_restart.get(id).await.expect("get").expect("present");

        // A fresh outbox over a wiped store starts the sequence over.
        store.clear_all().await.expect("wipe");
        let after_restart = SyncOutbox::new(store.clone());
        let reused = after_restart
            .enqueue(MutationKind::QuizResult, json!({"quiz_id": "new"}), "t")
            .await
            .expect("enqueue");
        assert_eq!(reused, id);

        assert!(!after_restart
            .record_failure(&stale, &TransportError::from_status(500, "boom"))
            .await
            .expect("record failure"));
        assert!(!after_restart.acknowledge(&stale).await.expect("acknowledge"));

        let current = after_restart.get(id).await.expect("get").expect("present");
        assert_eq!(current.payload, json!({"quiz_id": "new"}));
        assert_eq!(current.attempts, 0);
        assert!(after_restart.acknowledge(&current).await.expect("acknowledge"));
        assert!(after_restart.is_empty().await.expect("empty"));
    }

    #[tokio::test]
    async fn auth_rejection_is_noted_without_an_attempt() {
        let (_store, outbox) = outbox();
        let id = outbox
            .enqueue(MutationKind::QuizResult, json!({}), "expired")
            .await
            .expect("enqueue");
        let entry = outbox.get(id).await.expect("get").expect("present");
        assert!(outbox
            .record_auth_rejection(&entry, &TransportError::from_status(401, "expired"))
            .await
            .expect("record"));

        let after = outbox.get(id).await.expect("get").expect("present");
        assert_eq!(after.attempts, 0);
        assert_eq!(
            after.last_error_code.as_deref(),
            Some(SyncRetryClass::ReauthRequired.code())
        );
        assert!(!after.is_flagged());
    }
}
