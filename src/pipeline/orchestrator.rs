use super::stage::{ChatContext, SpokenReply, VoiceStages};
use super::PipelineConfig;
use crate::error::{Stage, VoiceError};
use crate::events::VoiceEvent;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of one pipeline run
#[derive(Debug)]
pub enum PipelineOutcome {
    Success(PipelineSuccess),
    Failure(PipelineFailure),
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success(_))
    }
}

/// All three stages completed; the reply text is never empty
#[derive(Debug)]
pub struct PipelineSuccess {
    pub user_text: String,
    pub bot_text: String,
    pub speech: SpokenReply,
}

/// A stage failed; whatever text the earlier stages produced is carried
/// so the exchange survives as a textual turn
#[derive(Debug)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: VoiceError,
    pub user_text: Option<String>,
    pub bot_text: Option<String>,
}

/// Runs one recording through recognition, chat, and synthesis
///
/// Stages run strictly in order and each consumes the previous stage's
/// output. There are no retries: a failed stage ends the run, and the
/// caller decides what to do with the partial result.
pub struct VoicePipeline {
    stages: VoiceStages,
    config: PipelineConfig,
    events: mpsc::Sender<VoiceEvent>,
}

impl VoicePipeline {
    pub fn new(
        stages: VoiceStages,
        config: PipelineConfig,
        events: mpsc::Sender<VoiceEvent>,
    ) -> Self {
        Self {
            stages,
            config,
            events,
        }
    }

    pub async fn run(
        &self,
        audio: &crate::audio::AudioUnit,
        context: &ChatContext,
    ) -> PipelineOutcome {
        if audio.size_bytes() > self.config.max_audio_bytes {
            let error = VoiceError::RecordingTooLarge(audio.size_bytes());
            return self.fail(Stage::SpeechToText, error, None, None).await;
        }

        // Stage 1: recognition
        let transcript = match self
            .guarded(Stage::SpeechToText, self.stages.stt.transcribe(audio))
            .await
        {
            Ok(transcript) => transcript,
            Err(error) => return self.fail(Stage::SpeechToText, error, None, None).await,
        };

        let user_text = transcript.text.trim().to_string();
        if user_text.is_empty() {
            // Nothing intelligible was said; skip the turn without
            // surfacing an error to the consumer
            debug!("Empty transcript, skipping the turn");
            return PipelineOutcome::Failure(PipelineFailure {
                stage: Stage::SpeechToText,
                error: VoiceError::EmptyTranscript,
                user_text: None,
                bot_text: None,
            });
        }

        info!("Transcript ({} chars): {}", user_text.len(), user_text);
        self.emit(VoiceEvent::Transcript {
            text: user_text.clone(),
            confidence: transcript.confidence,
        })
        .await;

        // Stage 2: chat completion
        let reply = match self
            .guarded(
                Stage::ChatCompletion,
                self.stages.chat.complete(&user_text, context),
            )
            .await
        {
            Ok(reply) => reply,
            Err(error) => {
                return self
                    .fail(Stage::ChatCompletion, error, Some(user_text), None)
                    .await
            }
        };

        // An empty but successful reply is replaced so a Success always
        // carries speakable text
        let bot_text = if reply.text.trim().is_empty() {
            info!("Assistant returned an empty reply, substituting the fallback");
            self.config.fallback_reply.clone()
        } else {
            reply.text
        };

        self.emit(VoiceEvent::BotReply {
            text: bot_text.clone(),
        })
        .await;

        // Stage 3: synthesis
        let speech = match self
            .guarded(Stage::TextToSpeech, self.stages.tts.synthesize(&bot_text))
            .await
        {
            Ok(speech) => speech,
            Err(error) => {
                return self
                    .fail(Stage::TextToSpeech, error, Some(user_text), Some(bot_text))
                    .await
            }
        };

        self.emit(VoiceEvent::SpeechReady(speech.clone())).await;

        PipelineOutcome::Success(PipelineSuccess {
            user_text,
            bot_text,
            speech,
        })
    }

    /// Apply the per-stage timeout when one is configured
    async fn guarded<T, F>(&self, stage: Stage, fut: F) -> Result<T, VoiceError>
    where
        F: Future<Output = Result<T, VoiceError>>,
    {
        if self.config.stage_timeout_ms == 0 {
            return fut.await;
        }

        let timeout = Duration::from_millis(self.config.stage_timeout_ms);
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(VoiceError::Timeout {
                stage,
                timeout_ms: self.config.stage_timeout_ms,
            }),
        }
    }

    async fn fail(
        &self,
        stage: Stage,
        error: VoiceError,
        user_text: Option<String>,
        bot_text: Option<String>,
    ) -> PipelineOutcome {
        warn!("Pipeline stage {} failed: {}", stage, error);
        self.emit(VoiceEvent::StageFailed {
            stage,
            message: error.to_string(),
        })
        .await;

        PipelineOutcome::Failure(PipelineFailure {
            stage,
            error,
            user_text,
            bot_text,
        })
    }

    async fn emit(&self, event: VoiceEvent) {
        if self.events.send(event).await.is_err() {
            debug!("No listener for pipeline events");
        }
    }
}
