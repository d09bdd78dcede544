//! HTTP API server for external control
//!
//! This module provides a REST API for driving voice conversations:
//! - POST /conversations/start - Start a conversation
//! - POST /conversations/:id/stop - End the current turn
//! - DELETE /conversations/:id - Shut a conversation down
//! - GET /conversations - List conversations
//! - GET /conversations/:id/status - Query session status
//! - GET /conversations/:id/turns - Get the exchange log
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
