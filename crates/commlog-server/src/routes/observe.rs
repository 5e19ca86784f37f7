//! Start and stop change observation.

use crate::routes::error_response;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct ObserveResponse {
    pub observing: bool,
    /// Whether this request changed the state.
    pub changed: bool,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<ObserveResponse> {
    Json(ObserveResponse {
        observing: state.is_observing().await,
        changed: false,
    })
}

pub async fn start(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ObserveResponse>, (StatusCode, String)> {
    let changed = state.start_observing().await.map_err(error_response)?;
    Ok(Json(ObserveResponse {
        observing: true,
        changed,
    }))
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Json<ObserveResponse> {
    let changed = state.stop_observing().await;
    Json(ObserveResponse {
        observing: false,
        changed,
    })
}
