use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session queries
        .route("/status", get(handlers::get_status))
        // Playback control
        .route("/control/push-audio", post(handlers::push_audio))
        .route("/control/interrupt", post(handlers::interrupt))
        .route("/control/flush", post(handlers::flush))
        .route("/control/stop", post(handlers::stop))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
