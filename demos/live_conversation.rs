// Live Conversation
//
// The full hands-free loop against a running speech proxy:
// 1. The microphone records until you stop talking
// 2. The recording is recognized, answered, and synthesized
// 3. Listening re-arms automatically for the next turn
//
// Spoken replies are written to reply-<n>.mp3 in the working directory;
// play them with any audio player.
//
// Prerequisites:
// - Speech proxy running (default: http://localhost:8000)
//
// Usage: cargo run --example live_conversation [proxy-url]

use anyhow::Result;
use drwatson_voice::{
    ConverseConfig, ConverseSession, CpalBackend, PatientProfile, PipelineConfig, ProxyClient,
    SessionConfig, VoiceEvent, VoiceStages,
};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8000".to_string());

    info!("🎙️  Live conversation against {}", base_url);
    info!("Speak, pause, and listen; Ctrl-C ends the session");

    // 1. Wire the session together
    let session_config = SessionConfig::default();
    let pipeline_config = PipelineConfig {
        base_url: base_url.clone(),
        ..PipelineConfig::default()
    };
    let converse_config = ConverseConfig {
        auto_restart: true,
        ..ConverseConfig::default()
    };
    let profile = PatientProfile {
        conditions: vec!["hypertension".to_string()],
        medications: vec!["lisinopril".to_string()],
    };

    let backend = Box::new(CpalBackend::new(session_config.capture.clone()));
    let stages = VoiceStages::proxy(ProxyClient::new(&base_url)?);
    let (event_tx, mut event_rx) = mpsc::channel(64);

    let session = ConverseSession::new(
        session_config,
        converse_config,
        pipeline_config,
        profile,
        backend,
        stages,
        event_tx,
    );

    // 2. Print events as the turns resolve
    let printer = tokio::spawn(async move {
        let mut replies = 0usize;
        while let Some(event) = event_rx.recv().await {
            match event {
                VoiceEvent::StateChanged(state) => info!("🎤 {}", state),
                VoiceEvent::Transcript { text, .. } => info!("📝 You: {}", text),
                VoiceEvent::BotReply { text } => info!("💬 Dr. Watson: {}", text),
                VoiceEvent::SpeechReady(reply) => {
                    replies += 1;
                    let path = format!("reply-{}.mp3", replies);
                    if std::fs::write(&path, &reply.data).is_ok() {
                        info!("🔊 Spoken reply saved to {}", path);
                    }
                }
                VoiceEvent::StageFailed { stage, message } => info!("❌ {}: {}", stage, message),
                VoiceEvent::SessionEnded { reason, .. } => info!("⏹  Turn ended ({})", reason),
            }
        }
    });

    // 3. Listen until Ctrl-C
    session.start().await?;
    tokio::signal::ctrl_c().await?;

    info!("🛑 Shutting down");
    session.shutdown().await;
    printer.abort();

    Ok(())
}
