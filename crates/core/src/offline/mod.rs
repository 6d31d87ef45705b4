//! UI-facing façade over the local cache and the outbox.

mod model;
mod snapshot;

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;

use crate::errors::{Error, Result};
use crate::store::{Collection, LocalStore, Record};
use crate::sync::{
    AccessTokenProvider, DrainOutcome, MutationKind, ReferenceDataSource, SyncCoordinator,
    SyncCycleTrigger, SyncRetryClass,
};

pub use model::{BadgeEarned, ImportSummary, QuizResult, SubmitReceipt, UserProgress};
pub use snapshot::{StoreSnapshot, SNAPSHOT_VERSION};

pub struct CacheService {
    store: Arc<dyn LocalStore>,
    coordinator: Arc<SyncCoordinator>,
    tokens: Arc<dyn AccessTokenProvider>,
    reference_source: Option<Arc<dyn ReferenceDataSource>>,
}

impl CacheService {
    pub fn new(
        store: Arc<dyn LocalStore>,
        coordinator: Arc<SyncCoordinator>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        Self {
            store,
            coordinator,
            tokens,
            reference_source: None,
        }
    }

    pub fn with_reference_source(mut self, source: Arc<dyn ReferenceDataSource>) -> Self {
        self.reference_source = Some(source);
        self
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.coordinator)
    }

    async fn payloads(&self, collection: Collection) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .store
            .get_all(collection)
            .await?
            .into_iter()
            .map(|record| record.payload)
            .collect())
    }

    /// Cached quizzes, available offline.
    pub async fn get_cached_quizzes(&self) -> Result<Vec<serde_json::Value>> {
        self.payloads(Collection::Quizzes).await
    }

    pub async fn get_cached_animals(&self) -> Result<Vec<serde_json::Value>> {
        self.payloads(Collection::Animals).await
    }

    pub async fn get_cached_quiz(&self, id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .store
            .get(Collection::Quizzes, id)
            .await?
            .map(|record| record.payload))
    }

    /// Upserts server objects into a reference collection. Each item needs an
    /// `id`; the whole batch is rejected before any write if one lacks it.
    pub async fn cache_reference_data(
        &self,
        collection: Collection,
        items: Vec<serde_json::Value>,
    ) -> Result<usize> {
        ensure_reference_collection(collection)?;
        let records = items
            .into_iter()
            .map(Record::from_entity)
            .collect::<Result<Vec<_>>>()?;
        let count = records.len();
        for record in records {
            self.store.put(collection, record).await?;
        }
        debug!("[QuizSync] Cached {} {} records", count, collection);
        Ok(count)
    }

    /// Fetches a reference collection and writes it into the cache.
    /// User-initiated, so failures are returned.
    pub async fn refresh_from_network(&self, collection: Collection) -> Result<usize> {
        ensure_reference_collection(collection)?;
        let Some(source) = &self.reference_source else {
            return Err(Error::invalid_request(
                "No remote source is configured for reference data",
            ));
        };
        if !self.coordinator.connectivity().is_online() {
            return Err(Error::Offline);
        }

        let token = self.tokens.access_token();
        let items = source
            .fetch_reference_data(collection, token.as_deref())
            .await
            .map_err(|err| match err.retry_class {
                SyncRetryClass::ReauthRequired => Error::AuthRequired(err.message),
                _ => Error::Transport(err),
            })?;
        let count = self.cache_reference_data(collection, items).await?;
        info!("[QuizSync] Refreshed {} ({} records)", collection, count);
        Ok(count)
    }

    /// Queues a quiz result. When online, a background drain is requested
    /// right away; the entry stays queued if that attempt fails.
    pub async fn submit_quiz_result_offline(&self, result: QuizResult) -> Result<SubmitReceipt> {
        result.validate()?;
        self.enqueue(MutationKind::QuizResult, &result).await
    }

    /// Caches the progress document locally and queues it for upload.
    pub async fn update_progress_offline(&self, progress: UserProgress) -> Result<SubmitReceipt> {
        progress.validate()?;
        let payload = serde_json::to_value(&progress)?;
        self.store
            .put(
                Collection::UserProgress,
                Record::new(progress.id.clone(), payload),
            )
            .await?;
        self.enqueue(MutationKind::UserProgress, &progress).await
    }

    pub async fn record_badge_earned(&self, badge: BadgeEarned) -> Result<SubmitReceipt> {
        badge.validate()?;
        self.enqueue(MutationKind::BadgeEarned, &badge).await
    }

    pub async fn get_cached_progress(&self, id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .store
            .get(Collection::UserProgress, id)
            .await?
            .map(|record| record.payload))
    }

    async fn enqueue<T: Serialize>(&self, kind: MutationKind, body: &T) -> Result<SubmitReceipt> {
        let token = self.tokens.access_token().ok_or_else(|| {
            Error::AuthRequired("Sign in before saving results".to_string())
        })?;
        let payload = serde_json::to_value(body)?;
        let outbox = self.coordinator.outbox();
        let mutation_id = outbox.enqueue(kind, payload, token).await?;
        self.coordinator.notify_enqueued();

        let config = self.coordinator.config();
        if config.drain_on_submit && self.coordinator.connectivity().is_online() {
            // Detached; the caller never waits on the network.
            debug!(
                "[QuizSync] Requesting send of {} id={}",
                kind.as_str(),
                mutation_id
            );
            self.coordinator.request_drain(SyncCycleTrigger::LocalMutation);
        }

        let queued = outbox.get(mutation_id).await?.is_some();
        Ok(SubmitReceipt {
            mutation_id,
            queued,
        })
    }

    pub async fn pending_count(&self) -> Result<usize> {
        self.coordinator.outbox().len().await
    }

    pub async fn sync_now(&self) -> Result<DrainOutcome> {
        self.coordinator.sync_now().await
    }

    /// Wipes every collection, queued mutations included.
    pub async fn clear_all_data(&self) -> Result<()> {
        self.store.clear_all().await?;
        warn!("[QuizSync] Local data cleared");
        Ok(())
    }

    pub async fn export_snapshot(&self) -> Result<StoreSnapshot> {
        Ok(StoreSnapshot {
            animals: self.get_cached_animals().await?,
            quizzes: self.get_cached_quizzes().await?,
            pending_sync: self.coordinator.outbox().peek_all().await?,
            timestamp: Utc::now(),
            version: SNAPSHOT_VERSION,
        })
    }

    pub async fn export_snapshot_json(&self) -> Result<String> {
        self.export_snapshot().await?.to_json()
    }

    /// Merges a snapshot into the store. Reference records are upserted;
    /// queued mutations are restored unless their idempotency key is
    /// already pending.
    pub async fn import_snapshot(&self, snapshot: StoreSnapshot) -> Result<ImportSummary> {
        snapshot.validate()?;
        let mut summary = ImportSummary {
            animals: self
                .cache_reference_data(Collection::Animals, snapshot.animals)
                .await?,
            quizzes: self
                .cache_reference_data(Collection::Quizzes, snapshot.quizzes)
                .await?,
            ..ImportSummary::default()
        };

        let outbox = self.coordinator.outbox();
        for mutation in snapshot.pending_sync {
            match outbox.restore(mutation).await? {
                Some(_) => summary.pending_restored += 1,
                None => summary.pending_skipped += 1,
            }
        }
        info!(
            "[QuizSync] Imported snapshot: animals={} quizzes={} pending={} (skipped {})",
            summary.animals, summary.quizzes, summary.pending_restored, summary.pending_skipped
        );
        Ok(summary)
    }

    pub async fn import_snapshot_json(&self, raw: &str) -> Result<ImportSummary> {
        self.import_snapshot(StoreSnapshot::from_json(raw)?).await
    }
}

fn ensure_reference_collection(collection: Collection) -> Result<()> {
    match collection {
        Collection::Animals | Collection::Quizzes => Ok(()),
        other => Err(Error::invalid_request(format!(
            "'{}' is not a reference data collection",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::store::InMemoryLocalStore;
    use crate::sync::{
        ConnectivityMonitor, PendingMutation, SessionTokenStore, SyncConfig, SyncOutbox,
        SyncTransport, TransportError,
    };

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<PendingMutation>>,
        fail_with: Mutex<Option<u16>>,
    }

    #[async_trait]
    impl SyncTransport for RecordingTransport {
        async fn deliver(&self, mutation: &PendingMutation) -> std::result::Result<(), TransportError> {
            self.calls.lock().unwrap().push(mutation.clone());
            match *self.fail_with.lock().unwrap() {
                Some(status) => Err(TransportError::from_status(status, "rejected")),
                None => Ok(()),
            }
        }
    }

    struct StaticSource(Vec<serde_json::Value>);

    #[async_trait]
    impl ReferenceDataSource for StaticSource {
        async fn fetch_reference_data(
            &self,
            _collection: Collection,
            _token: Option<&str>,
        ) -> std::result::Result<Vec<serde_json::Value>, TransportError> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        service: CacheService,
        connectivity: Arc<ConnectivityMonitor>,
        transport: Arc<RecordingTransport>,
        tokens: Arc<SessionTokenStore>,
    }

    fn fixture(online: bool) -> Fixture {
        let store = Arc::new(InMemoryLocalStore::new());
        let connectivity = Arc::new(ConnectivityMonitor::new(online));
        let transport = Arc::new(RecordingTransport::default());
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::new(SyncOutbox::new(store.clone())),
            Arc::clone(&connectivity),
            transport.clone(),
            SyncConfig::default(),
        ));
        let tokens = Arc::new(SessionTokenStore::new(Some("token-1".to_string())));
        Fixture {
            service: CacheService::new(store, coordinator, tokens.clone()),
            connectivity,
            transport,
            tokens,
        }
    }

    #[tokio::test]
    async fn cached_quiz_survives_going_offline() {
        let f = fixture(true);
        f.service
            .cache_reference_data(
                Collection::Quizzes,
                vec![json!({"id": "q1", "title": "Savanna Survivors"})],
            )
            .await
            .expect("cache");

        f.connectivity.set_online(false);
        let quizzes = f.service.get_cached_quizzes().await.expect("read");
        assert_eq!(quizzes, vec![json!({"id": "q1", "title": "Savanna Survivors"})]);
        assert_eq!(
            f.service.get_cached_quiz("q1").await.expect("read"),
            Some(json!({"id": "q1", "title": "Savanna Survivors"}))
        );
    }

    #[tokio::test]
    async fn offline_submission_is_delivered_after_reconnect() {
        let f = fixture(false);
        let receipt = f
            .service
            .submit_quiz_result_offline(QuizResult::new("q1", 85))
            .await
            .expect("submit");
        assert!(receipt.queued);

        let pending = f.service.coordinator().outbox().peek_all().await.expect("peek");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, MutationKind::QuizResult);
        assert!(f.transport.calls.lock().unwrap().is_empty());

        f.connectivity.set_online(true);
        f.service.sync_now().await.expect("sync");

        let calls = f.transport.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].payload, json!({"quiz_id": "q1", "score": 85}));
        assert_eq!(f.service.pending_count().await.expect("count"), 0);
    }

    async fn wait_for_calls(transport: &RecordingTransport, count: usize) {
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while transport.calls.lock().unwrap().len() < count {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("background send");
    }

    #[tokio::test]
    async fn online_submission_is_sent_in_the_background() {
        let f = fixture(true);
        let receipt = f
            .service
            .submit_quiz_result_offline(QuizResult::new("q2", 70))
            .await
            .expect("submit");
        // Returned before any network call was made.
        assert!(receipt.queued);

        wait_for_calls(&f.transport, 1).await;
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while f.service.pending_count().await.expect("count") > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("entry removed after delivery");
    }

    #[tokio::test]
    async fn failed_immediate_send_keeps_entry_queued() {
        let f = fixture(true);
        *f.transport.fail_with.lock().unwrap() = Some(503);
        let receipt = f
            .service
            .record_badge_earned(BadgeEarned {
                badge_id: "first-safari".to_string(),
                earned_at: Utc::now(),
                extra: Default::default(),
            })
            .await
            .expect("submission succeeds even when delivery fails");
        assert!(receipt.queued);

        wait_for_calls(&f.transport, 1).await;
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while f.service.coordinator().is_draining() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("pass finished");
        let pending = f.service.coordinator().outbox().peek_all().await.expect("peek");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, receipt.mutation_id);
        f.service.coordinator().stop();
    }

    #[tokio::test]
    async fn submission_without_session_is_rejected() {
        let f = fixture(false);
        f.tokens.clear();
        let err = f
            .service
            .submit_quiz_result_offline(QuizResult::new("q1", 85))
            .await
            .expect_err("no token");
        assert!(matches!(err, Error::AuthRequired(_)));
        assert_eq!(f.service.pending_count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn progress_is_cached_and_queued() {
        let f = fixture(false);
        let progress: UserProgress =
            serde_json::from_value(json!({"id": "user-7", "level": 4, "xp": 1200}))
                .expect("progress");
        f.service
            .update_progress_offline(progress)
            .await
            .expect("update");

        assert_eq!(
            f.service.get_cached_progress("user-7").await.expect("read"),
            Some(json!({"id": "user-7", "level": 4, "xp": 1200}))
        );
        let pending = f.service.coordinator().outbox().peek_all().await.expect("peek");
        assert_eq!(pending[0].kind, MutationKind::UserProgress);
    }

    #[tokio::test]
    async fn refresh_writes_fetched_records() {
        let f = fixture(true);
        let service = f.service.with_reference_source(Arc::new(StaticSource(vec![
            json!({"id": "a1", "name": "Okapi"}),
            json!({"id": "a2", "name": "Pangolin"}),
        ])));
        assert_eq!(
            service
                .refresh_from_network(Collection::Animals)
                .await
                .expect("refresh"),
            2
        );
        assert_eq!(service.get_cached_animals().await.expect("read").len(), 2);

        let err = service
            .refresh_from_network(Collection::PendingSync)
            .await
            .expect_err("not a reference collection");
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn refresh_while_offline_is_reported() {
        let f = fixture(false);
        let service = f
            .service
            .with_reference_source(Arc::new(StaticSource(Vec::new())));
        let err = service
            .refresh_from_network(Collection::Quizzes)
            .await
            .expect_err("offline");
        assert!(matches!(err, Error::Offline));
    }

    #[tokio::test]
    async fn import_of_export_reproduces_reference_data() {
        let source = fixture(false);
        source
            .service
            .cache_reference_data(
                Collection::Quizzes,
                vec![
                    json!({"id": "q1", "title": "Savanna Survivors"}),
                    json!({"id": "q2", "title": "Reef Rangers"}),
                ],
            )
            .await
            .expect("cache quizzes");
        source
            .service
            .cache_reference_data(Collection::Animals, vec![json!({"id": 7, "name": "Okapi"})])
            .await
            .expect("cache animals");
        source
            .service
            .submit_quiz_result_offline(QuizResult::new("q1", 85))
            .await
            .expect("submit");

        let raw = source.service.export_snapshot_json().await.expect("export");

        let target = fixture(false);
        let summary = target
            .service
            .import_snapshot_json(&raw)
            .await
            .expect("import");
        assert_eq!(summary.quizzes, 2);
        assert_eq!(summary.animals, 1);
        assert_eq!(summary.pending_restored, 1);

        let exported = source.service.export_snapshot().await.expect("export");
        let imported = target.service.export_snapshot().await.expect("export");
        assert_eq!(imported.quizzes, exported.quizzes);
        assert_eq!(imported.animals, exported.animals);
        assert_eq!(
            imported.pending_sync[0].idempotency_key,
            exported.pending_sync[0].idempotency_key
        );

        // Importing twice does not duplicate queued mutations.
        let again = target
            .service
            .import_snapshot_json(&raw)
            .await
            .expect("import again");
        assert_eq!(again.pending_skipped, 1);
        assert_eq!(target.service.pending_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn clear_all_data_empties_cache_and_outbox() {
        let f = fixture(false);
        f.service
            .cache_reference_data(Collection::Quizzes, vec![json!({"id": "q1"})])
            .await
            .expect("cache");
        f.service
            .submit_quiz_result_offline(QuizResult::new("q1", 85))
            .await
            .expect("submit");

        f.service.clear_all_data().await.expect("clear");
        assert!(f.service.get_cached_quizzes().await.expect("read").is_empty());
        assert_eq!(f.service.pending_count().await.expect("count"), 0);
    }
}
