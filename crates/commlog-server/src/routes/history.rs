//! Per-number history routes.

use crate::routes::error_response;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use commlog_core::normalize;
use commlog_types::{HistoryPage, TimelineEntry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub normalized_number: String,
    pub offset: usize,
    pub entries: Vec<TimelineEntry>,
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let entries = match query.limit {
        Some(limit) => state
            .history
            .page(&number, HistoryPage::new(query.offset, limit)),
        None => state
            .history
            .history(&number)
            .map(|all| all.into_iter().skip(query.offset).collect()),
    }
    .map_err(error_response)?;

    Ok(Json(HistoryResponse {
        normalized_number: normalize(&number),
        offset: query.offset,
        entries,
    }))
}
