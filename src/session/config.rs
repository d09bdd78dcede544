use crate::audio::CaptureConfig;
use crate::vad::VadConfig;
use serde::{Deserialize, Serialize};

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "conversation-2026-03-14-intake")
    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// Capture format incoming audio is normalized to
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Voice activity settings driving automatic stops
    #[serde(default)]
    pub vad: VadConfig,
}

fn default_session_id() -> String {
    format!("conversation-{}", uuid::Uuid::new_v4())
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            capture: CaptureConfig::default(),
            vad: VadConfig::default(),
        }
    }
}
