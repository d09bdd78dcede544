//! Speech pipeline
//!
//! One finished recording flows through three stages in strict order:
//! speech recognition, chat completion, speech synthesis. Every stage
//! talks to the speech proxy service; provider credentials live behind
//! that boundary, never in this process.

mod http;
mod orchestrator;
mod stage;

pub use http::ProxyClient;
pub use orchestrator::{PipelineFailure, PipelineOutcome, PipelineSuccess, VoicePipeline};
pub use stage::{
    ChatCompletion, ChatContext, ChatReply, PatientProfile, SpeechToText, SpokenReply,
    TextToSpeech, Transcript, TurnText, VoiceStages,
};

use serde::{Deserialize, Serialize};

/// Configuration for the speech pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base URL of the speech proxy service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-stage timeout in milliseconds; 0 disables the timeout
    #[serde(default)]
    pub stage_timeout_ms: u64,

    /// Spoken fallback when the assistant returns an empty reply
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Upper bound on recording size submitted for recognition
    #[serde(default = "default_max_audio_bytes")]
    pub max_audio_bytes: usize,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_fallback_reply() -> String {
    "Sorry, I could not generate a response.".to_string()
}

fn default_max_audio_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stage_timeout_ms: 0,
            fallback_reply: default_fallback_reply(),
            max_audio_bytes: default_max_audio_bytes(),
        }
    }
}
