//! Contact listing.

use crate::routes::error_response;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use commlog_types::{ContactRecord, ContactSort};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct ContactsQuery {
    #[serde(default)]
    pub sort: ContactSort,
}

#[derive(Serialize)]
pub struct ContactsResponse {
    pub contacts: Vec<ContactRecord>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContactsQuery>,
) -> Result<Json<ContactsResponse>, (StatusCode, String)> {
    let contacts = state.store.contacts(query.sort).map_err(error_response)?;
    Ok(Json(ContactsResponse { contacts }))
}
