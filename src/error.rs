use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline stage discriminant carried by failure results and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SpeechToText,
    ChatCompletion,
    TextToSpeech,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::SpeechToText => "speech-to-text",
            Stage::ChatCompletion => "chat-completion",
            Stage::TextToSpeech => "text-to-speech",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error taxonomy for the voice pipeline
///
/// Capture errors (`PermissionDenied`, `DeviceUnavailable`, `Capture`) abort
/// session start. Recording outcomes (`EmptyRecording`, `RecordingTooLarge`)
/// are raised before any stage runs. Stage errors (`Recognition`,
/// `Completion`, `Synthesis`, `EmptyTranscript`, `Timeout`) travel inside a
/// tagged pipeline failure and never panic across the pipeline boundary.
#[derive(Debug, Clone, Error)]
pub enum VoiceError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio capture failed: {0}")]
    Capture(String),

    #[error("recording captured no audio")]
    EmptyRecording,

    #[error("recording too large ({0} bytes)")]
    RecordingTooLarge(usize),

    #[error("transcript was empty")]
    EmptyTranscript,

    #[error("speech recognition failed: {0}")]
    Recognition(String),

    #[error("chat completion failed: {0}")]
    Completion(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("{stage} timed out after {timeout_ms}ms")]
    Timeout { stage: Stage, timeout_ms: u64 },
}

impl VoiceError {
    /// The pipeline stage this error belongs to, if it is a stage error
    pub fn stage(&self) -> Option<Stage> {
        match self {
            VoiceError::EmptyTranscript | VoiceError::Recognition(_) => Some(Stage::SpeechToText),
            VoiceError::Completion(_) => Some(Stage::ChatCompletion),
            VoiceError::Synthesis(_) => Some(Stage::TextToSpeech),
            VoiceError::Timeout { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
