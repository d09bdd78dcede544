use super::state::AppState;
use crate::audio::CpalBackend;
use crate::converse::{ConverseConfig, ConverseSession};
use crate::error::{Stage, VoiceError};
use crate::events::VoiceEvent;
use crate::pipeline::{ProxyClient, VoiceStages};
use crate::session::{SessionConfig, SessionState, SessionStats};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// Start the next recording automatically after each turn
    pub auto_restart: Option<bool>,

    /// Patient conditions overriding the configured profile
    pub conditions: Option<Vec<String>>,

    /// Patient medications overriding the configured profile
    pub medications: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct StartConversationResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopConversationResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct DeleteConversationResponse {
    pub session_id: String,
    pub status: String,
    pub turns_count: usize,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub session_id: String,
    pub active: bool,
    pub state: SessionState,
}

#[derive(Debug, Serialize)]
pub struct ConversationStatusResponse {
    pub session_id: String,
    pub active: bool,
    pub turns_count: usize,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub user_text: String,
    pub bot_text: Option<String>,
    pub failed_stage: Option<Stage>,
    pub completed_at: DateTime<Utc>,
    pub speech: Option<SpeechResponse>,
}

#[derive(Debug, Serialize)]
pub struct SpeechResponse {
    pub media_type: String,
    pub data_base64: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /conversations/start
/// Start a new conversation session
pub async fn start_conversation(
    State(state): State<AppState>,
    Json(req): Json<StartConversationRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("conversation-{}", uuid::Uuid::new_v4()));

    info!("Starting conversation: {}", session_id);

    // Check if the session already exists
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&session_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Conversation {} already exists", session_id),
                }),
            )
                .into_response();
        }
    }

    let config = state.config.as_ref();

    let session_config = SessionConfig {
        session_id: session_id.clone(),
        capture: config.audio.clone(),
        vad: config.vad.clone(),
    };

    let converse_config = ConverseConfig {
        auto_restart: req.auto_restart.unwrap_or(config.converse.auto_restart),
        history_turns: config.converse.history_turns,
    };

    let mut profile = config.profile.clone();
    if let Some(conditions) = req.conditions {
        profile.conditions = conditions;
    }
    if let Some(medications) = req.medications {
        profile.medications = medications;
    }

    let stages = match ProxyClient::new(&config.pipeline.base_url) {
        Ok(client) => VoiceStages::proxy(client),
        Err(e) => {
            error!("Failed to build proxy client: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to build proxy client: {}", e),
                }),
            )
                .into_response();
        }
    };

    let (event_tx, event_rx) = mpsc::channel(64);
    spawn_event_logger(session_id.clone(), event_rx);

    let backend = Box::new(CpalBackend::new(config.audio.clone()));
    let session = Arc::new(ConverseSession::new(
        session_config,
        converse_config,
        config.pipeline.clone(),
        profile,
        backend,
        stages,
        event_tx,
    ));

    if let Err(e) = session.start().await {
        error!("Failed to start conversation: {}", e);
        return (
            error_status(&e),
            Json(ErrorResponse {
                error: format!("Failed to start conversation: {}", e),
            }),
        )
            .into_response();
    }

    // Store session
    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(session_id.clone(), session);
    }

    info!("Conversation started: {}", session_id);

    (
        StatusCode::OK,
        Json(StartConversationResponse {
            session_id: session_id.clone(),
            status: "listening".to_string(),
            message: format!("Conversation {} is listening", session_id),
        }),
    )
        .into_response()
}

/// POST /conversations/:session_id/stop
/// End the current turn; the final recording still runs through the
/// pipeline, so the last exchange appears in the turn log shortly after
pub async fn stop_conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping conversation: {}", session_id);

    let session = {
        let sessions = state.sessions.read().await;
        sessions.get(&session_id).cloned()
    };

    match session {
        Some(session) => {
            session.stop().await;
            let stats = session.stats().await;

            (
                StatusCode::OK,
                Json(StopConversationResponse {
                    session_id: session_id.clone(),
                    status: "stopping".to_string(),
                    message: "Final turn is processing".to_string(),
                    stats,
                }),
            )
                .into_response()
        }
        None => not_found(&session_id),
    }
}

/// DELETE /conversations/:session_id
/// Shut the conversation down and discard any in-flight recording
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Deleting conversation: {}", session_id);

    // Remove first so no new handler can reach the session
    let session = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    match session {
        Some(session) => {
            session.shutdown().await;
            let stats = session.stats().await;
            let turns_count = session.turns().await.len();

            info!("Conversation deleted: {}", session_id);

            (
                StatusCode::OK,
                Json(DeleteConversationResponse {
                    session_id: session_id.clone(),
                    status: "stopped".to_string(),
                    turns_count,
                    stats,
                }),
            )
                .into_response()
        }
        None => not_found(&session_id),
    }
}

/// GET /conversations
/// List all conversations
pub async fn list_conversations(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    let mut conversations = Vec::with_capacity(sessions.len());
    for (session_id, session) in sessions.iter() {
        conversations.push(ConversationSummary {
            session_id: session_id.clone(),
            active: session.is_active(),
            state: session.state().await,
        });
    }

    (StatusCode::OK, Json(conversations)).into_response()
}

/// GET /conversations/:session_id/status
/// Get status of a conversation
pub async fn get_conversation_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => {
            let stats = session.stats().await;
            let turns_count = session.turns().await.len();

            (
                StatusCode::OK,
                Json(ConversationStatusResponse {
                    session_id: session_id.clone(),
                    active: session.is_active(),
                    turns_count,
                    stats,
                }),
            )
                .into_response()
        }
        None => not_found(&session_id),
    }
}

/// GET /conversations/:session_id/turns
/// Get the exchange log (accumulated so far)
pub async fn get_conversation_turns(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => {
            let turns: Vec<TurnResponse> = session
                .turns()
                .await
                .into_iter()
                .map(|turn| TurnResponse {
                    user_text: turn.user_text,
                    bot_text: turn.bot_text,
                    failed_stage: turn.failed_stage,
                    completed_at: turn.completed_at,
                    speech: turn.speech.map(|reply| SpeechResponse {
                        media_type: reply.media_type,
                        data_base64: base64::engine::general_purpose::STANDARD
                            .encode(&reply.data),
                    }),
                })
                .collect();

            (StatusCode::OK, Json(turns)).into_response()
        }
        None => not_found(&session_id),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ============================================================================
// Helpers
// ============================================================================

fn error_status(error: &VoiceError) -> StatusCode {
    match error {
        VoiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        VoiceError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn not_found(session_id: &str) -> axum::response::Response {
    error!("Conversation {} not found", session_id);
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Conversation {} not found", session_id),
        }),
    )
        .into_response()
}

/// Drains a session's event stream into the log
fn spawn_event_logger(session_id: String, mut events: mpsc::Receiver<VoiceEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                VoiceEvent::StateChanged(state) => {
                    debug!("[{}] state: {}", session_id, state);
                }
                VoiceEvent::Transcript { text, .. } => {
                    info!("[{}] user: {}", session_id, text);
                }
                VoiceEvent::BotReply { text } => {
                    info!("[{}] assistant: {}", session_id, text);
                }
                VoiceEvent::SpeechReady(reply) => {
                    debug!(
                        "[{}] speech ready ({} bytes, {})",
                        session_id,
                        reply.data.len(),
                        reply.media_type
                    );
                }
                VoiceEvent::StageFailed { stage, message } => {
                    warn!("[{}] {} failed: {}", session_id, stage, message);
                }
                VoiceEvent::SessionEnded { reason, had_audio } => {
                    info!("[{}] turn ended ({}, audio: {})", session_id, reason, had_audio);
                }
            }
        }
    });
}
