//! Axum Router Configuration
//!
//! Routes the telephony media-stream WebSocket, the voice webhook and the
//! health check.

use crate::{handlers, state::AppState, ws::ws_handler};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/stream", get(ws_handler))
        .route("/voice", post(handlers::voice_webhook))
        .route("/health", get(handlers::health))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
