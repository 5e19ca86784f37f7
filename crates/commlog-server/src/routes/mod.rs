//! HTTP route handlers.

pub mod contacts;
pub mod history;
pub mod observe;
pub mod summaries;
pub mod sync;
pub mod ws;

use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use commlog_core::CommlogError;
use commlog_types::StoreStats;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StoreStats>, (StatusCode, String)> {
    state.store.stats().map(Json).map_err(error_response)
}

/// HTTP status for a core error.
pub fn error_response(e: CommlogError) -> (StatusCode, String) {
    let status = match &e {
        CommlogError::SyncInProgress(_) => StatusCode::CONFLICT,
        CommlogError::SourceUnavailable(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::warn!(target: "commlog::api", "Request failed: {}", e);
    }
    (status, e.to_string())
}

/// The `/api` routes.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/summaries", get(summaries::list))
        .route("/history/{number}", get(history::get))
        .route("/contacts", get(contacts::list))
        .route("/sync/full", post(sync::full))
        .route("/sync/incremental", post(sync::incremental))
        .route("/sync/resync", post(sync::resync))
        .route(
            "/observe",
            get(observe::status).post(observe::start).delete(observe::stop),
        )
}

/// The `/ws` routes.
pub fn ws_router() -> Router<Arc<AppState>> {
    Router::new().route("/events", get(ws::upgrade))
}
