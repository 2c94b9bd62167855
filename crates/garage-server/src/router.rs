//! Axum router assembly.

use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Build the top-level axum [`Router`].
///
/// API routes live under `/api`, the WebSocket at `/ws`. A [`TraceLayer`]
/// logs each request and response through `tracing`.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(crate::ws::upgrade))
        .nest("/api", crate::api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
