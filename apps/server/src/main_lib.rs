//! Service wiring shared by `main` and the handler tests.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use quizsync_core::offline::CacheService;
use quizsync_core::sync::{
    ConnectivityMonitor, SessionTokenStore, SyncCoordinator, SyncEvent, SyncOutbox,
};
use quizsync_remote_api::{HttpConnectivityProbe, QuizApiClient};
use quizsync_storage_sqlite::SqliteLocalStore;

use crate::config::ServerConfig;

pub struct AppState {
    pub cache: CacheService,
    pub coordinator: Arc<SyncCoordinator>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub tokens: Arc<SessionTokenStore>,
    pub store: Arc<SqliteLocalStore>,
}

/// Builds every service once. Connectivity starts offline until the first
/// health probe or host signal says otherwise.
pub fn build_state(config: &ServerConfig) -> Result<Arc<AppState>> {
    let store = Arc::new(
        SqliteLocalStore::open(config.data_dir.clone())
            .with_context(|| format!("Failed to open local store in {}", config.data_dir))?,
    );
    let client = QuizApiClient::new(&config.api_url).context("Failed to build API client")?;

    let connectivity = Arc::new(ConnectivityMonitor::with_probe(
        false,
        Arc::new(HttpConnectivityProbe::new(client.clone())),
    ));
    let client = Arc::new(client);
    let coordinator = Arc::new(SyncCoordinator::new(
        Arc::new(SyncOutbox::new(store.clone())),
        Arc::clone(&connectivity),
        client.clone(),
        config.sync.clone(),
    ));
    let tokens = Arc::new(SessionTokenStore::new(config.initial_token.clone()));
    let cache = CacheService::new(store.clone(), Arc::clone(&coordinator), tokens.clone())
        .with_reference_source(client);

    info!(
        "Local store ready in {}; remote API {}",
        store.app_data_dir(),
        config.api_url
    );
    Ok(Arc::new(AppState {
        cache,
        coordinator,
        connectivity,
        tokens,
        store,
    }))
}

/// Forwards coordinator events into the server log.
pub fn spawn_event_logger(state: &AppState) -> tokio::task::JoinHandle<()> {
    let mut events = state.coordinator.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::AuthRequired { mutation_id }) => {
                    warn!(mutation_id, "Sync halted: sign-in required");
                }
                Ok(SyncEvent::RetryScheduled { delay_ms }) => {
                    info!(delay_ms, "Sync retry scheduled");
                }
                Ok(SyncEvent::DrainCompleted { report }) => {
                    debug!(
                        delivered = report.delivered,
                        remaining = report.remaining,
                        status = report.status(),
                        "Drain completed"
                    );
                }
                Ok(SyncEvent::DrainStarted { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Sync event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
pub(crate) fn test_state(data_dir: &std::path::Path, token: Option<&str>) -> Arc<AppState> {
    let config = ServerConfig::from_lookup(|key| match key {
        // Nothing listens on the discard port; every remote call fails fast.
        "QUIZSYNC_API_URL" => Some("http://127.0.0.1:9".to_string()),
        "QUIZSYNC_DATA_DIR" => Some(data_dir.to_string_lossy().to_string()),
        "QUIZSYNC_ACCESS_TOKEN" => token.map(str::to_string),
        _ => None,
    })
    .expect("test config");
    build_state(&config).expect("test state")
}
