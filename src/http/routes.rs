//! HTTP route definitions

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::ws::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
