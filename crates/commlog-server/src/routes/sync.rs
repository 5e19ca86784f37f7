//! Sync triggers.

use crate::routes::error_response;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use commlog_core::CommlogError;
use commlog_types::{RecordKind, SyncOutcome, SyncReport};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct IncrementalQuery {
    /// One kind; every kind when absent.
    #[serde(default)]
    pub kind: Option<RecordKind>,
}

fn into_report(
    outcome: commlog_core::Result<SyncOutcome>,
) -> Result<Json<SyncReport>, (StatusCode, String)> {
    match outcome {
        Ok(SyncOutcome::Completed(report)) => Ok(Json(report)),
        Ok(SyncOutcome::AlreadyRunning { kind }) => {
            Err(error_response(CommlogError::SyncInProgress(kind)))
        }
        Err(e) => Err(error_response(e)),
    }
}

pub async fn full(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SyncReport>, (StatusCode, String)> {
    into_report(state.engine.full_sync().await)
}

pub async fn incremental(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IncrementalQuery>,
) -> Result<Json<SyncReport>, (StatusCode, String)> {
    let outcome = match query.kind {
        Some(kind) => state.engine.incremental_sync(kind).await,
        None => state.engine.incremental_sync_all().await,
    };
    into_report(outcome)
}

pub async fn resync(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SyncReport>, (StatusCode, String)> {
    into_report(state.engine.resync().await)
}
