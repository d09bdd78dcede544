pub mod audio;
pub mod config;
pub mod converse;
pub mod error;
pub mod events;
pub mod http;
pub mod pipeline;
pub mod session;
pub mod vad;

pub use audio::{AudioChunk, AudioFile, AudioUnit, CaptureBackend, CaptureConfig, CpalBackend};
pub use config::Config;
pub use converse::{ConversationTurn, ConverseConfig, ConverseSession};
pub use error::{Stage, VoiceError};
pub use events::VoiceEvent;
pub use http::{create_router, AppState};
pub use pipeline::{
    ChatCompletion, ChatContext, ChatReply, PatientProfile, PipelineConfig, PipelineOutcome,
    ProxyClient, SpeechToText, SpokenReply, TextToSpeech, Transcript, TurnText, VoicePipeline,
    VoiceStages,
};
pub use session::{SessionConfig, SessionController, SessionOutcome, SessionState, SessionStats};
pub use vad::{chunk_level, StopReason, VadConfig, VoiceActivityMonitor};
