//! HTTP/WebSocket adapter over the commlog sync engine.
//!
//! Split from main.rs so the routes and state can be exercised by
//! integration tests.

pub mod config;
pub mod global_ws;
pub mod logging;
pub mod routes;
pub mod state;

use axum::Router;
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Full application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", routes::api_router())
        .nest("/ws", routes::ws_router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
