use crate::vad::StopReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No capture in progress; a new recording may start
    Idle,
    /// The microphone is live and chunks are accumulating
    Recording,
    /// The recording ended and its audio is being assembled
    Finalizing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Finalizing => "finalizing",
        };
        write!(f, "{label}")
    }
}

/// Statistics about a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// Session identifier
    pub session_id: String,

    /// When the most recent recording started
    pub started_at: Option<DateTime<Utc>>,

    /// Length of the most recent recording in seconds
    pub duration_secs: f64,

    /// Audio chunks accumulated by the most recent recording
    pub chunks_count: usize,

    /// Samples accumulated by the most recent recording
    pub samples_count: usize,

    /// Latest observed loudness level (0.0 to 1.0)
    pub level: f32,

    /// Why the most recent recording stopped
    pub last_stop_reason: Option<StopReason>,
}
