//! Aggregate summary routes.

use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use commlog_types::{AggregateFilter, AggregateSummary};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct SummariesResponse {
    pub summaries: Vec<AggregateSummary>,
    /// Rows in the unfiltered snapshot.
    pub total: usize,
}

/// Latest live snapshot, post-filtered.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<AggregateFilter>,
) -> Json<SummariesResponse> {
    let snapshot = state.aggregates.current();
    let summaries = if filter.is_empty() {
        snapshot.as_ref().clone()
    } else {
        filter.apply(&snapshot)
    };

    Json(SummariesResponse {
        summaries,
        total: snapshot.len(),
    })
}
