use crate::audio::AudioUnit;
use crate::error::VoiceError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Recognized speech from one recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Transcribed text
    pub text: String,

    /// Confidence score (0.0 to 1.0), if the recognizer reports one
    pub confidence: Option<f32>,
}

/// Assistant reply text plus any provider metadata
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Synthesized speech for one reply
#[derive(Debug, Clone)]
pub struct SpokenReply {
    /// Encoded audio bytes
    pub data: Vec<u8>,

    /// MIME type of the audio (e.g. "audio/mpeg")
    pub media_type: String,
}

/// Patient background forwarded with every chat request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientProfile {
    #[serde(default)]
    pub conditions: Vec<String>,

    #[serde(default)]
    pub medications: Vec<String>,
}

/// One completed exchange, as the chat stage sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnText {
    pub user: String,
    pub bot: String,
}

/// Context the chat stage receives alongside the user's message
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    pub conditions: Vec<String>,
    pub medications: Vec<String>,
    pub prior_turns: Vec<TurnText>,
}

#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    /// Recognize speech in the recording
    async fn transcribe(&self, audio: &AudioUnit) -> Result<Transcript, VoiceError>;
}

#[async_trait::async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Produce the assistant's reply to the user's message
    async fn complete(
        &self,
        message: &str,
        context: &ChatContext,
    ) -> Result<ChatReply, VoiceError>;
}

#[async_trait::async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize speech for the reply text
    async fn synthesize(&self, text: &str) -> Result<SpokenReply, VoiceError>;
}

/// The three stage implementations a pipeline runs, in order
#[derive(Clone)]
pub struct VoiceStages {
    pub stt: Arc<dyn SpeechToText>,
    pub chat: Arc<dyn ChatCompletion>,
    pub tts: Arc<dyn TextToSpeech>,
}
