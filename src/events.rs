use crate::error::Stage;
use crate::pipeline::SpokenReply;
use crate::session::SessionState;
use crate::vad::StopReason;

/// Progress notifications emitted while a conversation turn runs
///
/// Delivered in order over a bounded channel; a consumer that falls behind
/// delays the pipeline rather than losing events.
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    /// The recording session moved to a new lifecycle state
    StateChanged(SessionState),

    /// Recognition finished for the current turn
    Transcript {
        text: String,
        confidence: Option<f32>,
    },

    /// The assistant's reply text is ready
    BotReply { text: String },

    /// Synthesized speech for the reply is ready to play
    SpeechReady(SpokenReply),

    /// A pipeline stage failed
    StageFailed { stage: Stage, message: String },

    /// A recording finished and its pipeline run (if any) resolved
    SessionEnded { reason: StopReason, had_audio: bool },
}
