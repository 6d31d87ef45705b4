//! Sync control, session, connectivity and backup endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use quizsync_core::offline::{ImportSummary, StoreSnapshot};
use quizsync_core::sync::{ConnectivityState, DrainOutcome, SyncStatus};

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    #[serde(flatten)]
    pub status: SyncStatus,
    pub online: bool,
    pub pending: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityRequest {
    pub online: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub access_token: String,
}

async fn sync_now(State(state): State<Arc<AppState>>) -> ApiResult<Json<DrainOutcome>> {
    Ok(Json(state.cache.sync_now().await?))
}

async fn get_sync_status(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SyncStatusResponse>> {
    Ok(Json(SyncStatusResponse {
        status: state.coordinator.status(),
        online: state.connectivity.is_online(),
        pending: state.cache.pending_count().await?,
    }))
}

/// Host-reported connectivity signal.
async fn set_connectivity(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConnectivityRequest>,
) -> ApiResult<Json<ConnectivityState>> {
    state.connectivity.set_online(body.online);
    Ok(Json(state.connectivity.state()))
}

async fn store_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SessionRequest>,
) -> ApiResult<Json<()>> {
    if body.access_token.trim().is_empty() {
        return Err(ApiError::BadRequest("accessToken is empty".to_string()));
    }
    state.tokens.set(body.access_token);
    info!("Session token updated");
    Ok(Json(()))
}

async fn clear_session(State(state): State<Arc<AppState>>) -> ApiResult<Json<()>> {
    state.tokens.clear();
    info!("Session token cleared");
    Ok(Json(()))
}

async fn export_snapshot(State(state): State<Arc<AppState>>) -> ApiResult<Json<StoreSnapshot>> {
    Ok(Json(state.cache.export_snapshot().await?))
}

async fn import_snapshot(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<StoreSnapshot>,
) -> ApiResult<Json<ImportSummary>> {
    Ok(Json(state.cache.import_snapshot(snapshot).await?))
}

async fn clear_all_data(State(state): State<Arc<AppState>>) -> ApiResult<Json<()>> {
    state.cache.clear_all_data().await?;
    Ok(Json(()))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync/now", post(sync_now))
        .route("/sync/status", get(get_sync_status))
        .route("/connectivity", post(set_connectivity))
        .route("/session", put(store_session).delete(clear_session))
        .route("/snapshot", get(export_snapshot).post(import_snapshot))
        .route("/data", delete(clear_all_data))
}
