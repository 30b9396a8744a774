//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    routing::{get, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Status displays run on other hosts in the control room.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Live status
        .route("/status", get(handlers::get_status))
        .route("/collisions", get(handlers::get_collisions))
        .route("/alerts", get(handlers::get_alerts))
        .route("/events", get(handlers::stream_events))
        // Operator controls
        .route("/auto-shutter", put(handlers::set_auto_shutter))
        .route("/selection", put(handlers::set_selection))
        // Windows
        .route(
            "/nights/{night_id}/targets/{target_id}/windows",
            get(handlers::get_target_windows),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
