//! HTTP surface of the local host process, mounted under `/api/v1`.

mod cache;
mod sync;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::main_lib::AppState;

async fn healthcheck() -> &'static str {
    "ok"
}

pub fn app_router(state: Arc<AppState>) -> Router {
    let api = Router::new().merge(cache::router()).merge(sync::router());
    Router::new()
        .route("/healthz", get(healthcheck))
        .nest("/api/v1", api)
        .with_state(state)
}
