use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub const API_PREFIX: &str = "/api/v1";

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::system_status))
        // Hardware
        .route("/devices", get(handlers::list_devices))
        .route("/devices/target", get(handlers::target_device))
        // Recording control
        .route("/recordings/start", post(handlers::start_recording))
        .route("/recordings/stop", post(handlers::stop_recording))
        .route("/recordings/status", get(handlers::recording_status))
        .route("/recordings/history", get(handlers::recording_history))
        .route("/recordings/delete", post(handlers::delete_recording))
        // Remote storage
        .route("/recordings/transfer", post(handlers::transfer_recording))
        .route("/transfers", get(handlers::list_transfers))
        .route("/transfers/:id", get(handlers::get_transfer))
        .route(
            "/storage/config",
            get(handlers::get_storage_config).put(handlers::update_storage_config),
        );

    Router::new()
        .nest(API_PREFIX, api)
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
