//! Cached reference data and offline mutation endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use quizsync_core::offline::{BadgeEarned, QuizResult, SubmitReceipt, UserProgress};
use quizsync_core::Collection;

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub collection: Collection,
    pub count: usize,
}

async fn get_cached_quizzes(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Value>>> {
    Ok(Json(state.cache.get_cached_quizzes().await?))
}

async fn get_cached_quiz(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .cache
        .get_cached_quiz(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Quiz '{}' is not cached", id)))
}

async fn get_cached_animals(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Value>>> {
    Ok(Json(state.cache.get_cached_animals().await?))
}

async fn refresh_collection(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> ApiResult<Json<RefreshResponse>> {
    let collection = Collection::parse(&kind)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown collection '{}'", kind)))?;
    let count = state.cache.refresh_from_network(collection).await?;
    Ok(Json(RefreshResponse { collection, count }))
}

async fn submit_quiz_result(
    State(state): State<Arc<AppState>>,
    Json(result): Json<QuizResult>,
) -> ApiResult<Json<SubmitReceipt>> {
    let receipt = state.cache.submit_quiz_result_offline(result).await?;
    info!(
        mutation_id = receipt.mutation_id,
        queued = receipt.queued,
        "Quiz result accepted"
    );
    Ok(Json(receipt))
}

async fn update_progress(
    State(state): State<Arc<AppState>>,
    Json(progress): Json<UserProgress>,
) -> ApiResult<Json<SubmitReceipt>> {
    Ok(Json(state.cache.update_progress_offline(progress).await?))
}

async fn record_badge(
    State(state): State<Arc<AppState>>,
    Json(badge): Json<BadgeEarned>,
) -> ApiResult<Json<SubmitReceipt>> {
    Ok(Json(state.cache.record_badge_earned(badge).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cache/quizzes", get(get_cached_quizzes))
        .route("/cache/quizzes/:id", get(get_cached_quiz))
        .route("/cache/animals", get(get_cached_animals))
        .route("/cache/refresh/:kind", post(refresh_collection))
        .route("/quiz-results", post(submit_quiz_result))
        .route("/progress", put(update_progress))
        .route("/badges", post(record_badge))
}
