use super::stage::{
    ChatCompletion, ChatContext, ChatReply, SpeechToText, SpokenReply, TextToSpeech, Transcript,
    VoiceStages,
};
use crate::audio::AudioUnit;
use crate::error::VoiceError;
use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// HTTP client for the speech proxy service
///
/// All recognition, chat, and synthesis traffic goes through one backend
/// that holds the provider credentials; this process never sees an API key.
#[derive(Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl VoiceStages {
    /// All three stages backed by one proxy client
    pub fn proxy(client: ProxyClient) -> Self {
        let client = Arc::new(client);
        Self {
            stt: client.clone(),
            chat: client.clone(),
            tts: client,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    #[serde(default)]
    text: String,

    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    conditions: &'a [String],
    medications: &'a [String],
    history: Vec<HistoryEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct HistoryEntry<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    text: String,

    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
}

#[async_trait::async_trait]
impl SpeechToText for ProxyClient {
    async fn transcribe(&self, audio: &AudioUnit) -> Result<Transcript, VoiceError> {
        let part = Part::bytes(audio.data().to_vec())
            .file_name("recording.wav")
            .mime_str(audio.media_type())
            .map_err(|e| VoiceError::Recognition(format!("invalid media type: {e}")))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint("/api/audio/stt"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Recognition(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Recognition(format!(
                "proxy returned {status}: {body}"
            )));
        }

        let parsed: SttResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Recognition(format!("invalid response body: {e}")))?;

        debug!(
            "Transcribed {} bytes into {} chars",
            audio.size_bytes(),
            parsed.text.len()
        );

        Ok(Transcript {
            text: parsed.text,
            confidence: parsed.confidence,
        })
    }
}

#[async_trait::async_trait]
impl ChatCompletion for ProxyClient {
    async fn complete(
        &self,
        message: &str,
        context: &ChatContext,
    ) -> Result<ChatReply, VoiceError> {
        let history: Vec<HistoryEntry> = context
            .prior_turns
            .iter()
            .flat_map(|turn| {
                [
                    HistoryEntry {
                        role: "user",
                        content: &turn.user,
                    },
                    HistoryEntry {
                        role: "assistant",
                        content: &turn.bot,
                    },
                ]
            })
            .collect();

        let request = ChatRequest {
            message,
            conditions: &context.conditions,
            medications: &context.medications,
            history,
        };

        let response = self
            .client
            .post(self.endpoint("/api/audio/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| VoiceError::Completion(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Completion(format!(
                "proxy returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Completion(format!("invalid response body: {e}")))?;

        Ok(ChatReply {
            text: parsed.text,
            metadata: parsed.extra,
        })
    }
}

#[async_trait::async_trait]
impl TextToSpeech for ProxyClient {
    async fn synthesize(&self, text: &str) -> Result<SpokenReply, VoiceError> {
        let response = self
            .client
            .post(self.endpoint("/api/audio/tts"))
            .json(&TtsRequest { text })
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "proxy returned {status}: {body}"
            )));
        }

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("failed to read audio body: {e}")))?
            .to_vec();

        if data.is_empty() {
            return Err(VoiceError::Synthesis("proxy returned no audio".to_string()));
        }

        Ok(SpokenReply { data, media_type })
    }
}
