use axum::{
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::hid::websocket::ws_hid_handler;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/config", get(handlers::get_config))
        .route("/hid/status", get(handlers::hid_status))
        .route("/hid/reset", post(handlers::hid_reset));

    Router::new()
        // Key event channel used by the browser page
        .route("/ws", any(ws_hid_handler))
        .nest("/api", api_routes)
        .merge(super::static_files::static_file_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
