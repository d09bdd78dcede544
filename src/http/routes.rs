use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Conversation control
        .route("/conversations", get(handlers::list_conversations))
        .route("/conversations/start", post(handlers::start_conversation))
        .route(
            "/conversations/:session_id/stop",
            post(handlers::stop_conversation),
        )
        .route(
            "/conversations/:session_id",
            delete(handlers::delete_conversation),
        )
        // Conversation queries
        .route(
            "/conversations/:session_id/status",
            get(handlers::get_conversation_status),
        )
        .route(
            "/conversations/:session_id/turns",
            get(handlers::get_conversation_turns),
        )
        // CORS for browser clients
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
