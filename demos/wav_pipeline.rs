// WAV Pipeline Test
//
// Runs a recorded WAV file through the full speech pipeline:
// 1. The file is normalized to 16kHz mono
// 2. The proxy recognizes the speech
// 3. The assistant answers
// 4. The spoken reply is written next to the input file
//
// Prerequisites:
// - Speech proxy running (default: http://localhost:8000)
//
// Usage: cargo run --example wav_pipeline -- recording.wav [proxy-url]

use anyhow::{Context, Result};
use drwatson_voice::{
    AudioFile, ChatContext, PipelineConfig, PipelineOutcome, ProxyClient, VoiceEvent,
    VoicePipeline, VoiceStages,
};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .context("Usage: wav_pipeline <recording.wav> [proxy-url]")?;
    let base_url = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "http://localhost:8000".to_string());

    // Expand home directory
    let path = shellexpand::tilde(&path).into_owned();

    // 1. Load and normalize the recording
    let audio = AudioFile::open(&path)?;
    info!("✅ Loaded {} ({:.1}s)", path, audio.duration_seconds);

    let unit = audio.into_unit(16000, 1)?;
    info!("✅ Normalized to {} bytes of WAV", unit.size_bytes());

    // 2. Build the pipeline against the proxy
    let stages = VoiceStages::proxy(ProxyClient::new(&base_url)?);
    let (event_tx, mut event_rx) = mpsc::channel(16);
    let pipeline = VoicePipeline::new(stages, PipelineConfig::default(), event_tx);

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                VoiceEvent::Transcript { text, .. } => info!("📝 Heard: {}", text),
                VoiceEvent::BotReply { text } => info!("💬 Reply: {}", text),
                VoiceEvent::SpeechReady(reply) => {
                    info!("🔊 Speech ready ({} bytes)", reply.data.len())
                }
                VoiceEvent::StageFailed { stage, message } => {
                    info!("❌ {} failed: {}", stage, message)
                }
                _ => {}
            }
        }
    });

    // 3. Run recognition, chat, and synthesis in order
    match pipeline.run(&unit, &ChatContext::default()).await {
        PipelineOutcome::Success(success) => {
            let suffix = if success.speech.media_type.contains("wav") {
                "reply.wav"
            } else {
                "reply.mp3"
            };
            let out_path = format!("{}.{}", path.trim_end_matches(".wav"), suffix);
            std::fs::write(&out_path, &success.speech.data)
                .with_context(|| format!("Failed to write {out_path}"))?;

            info!("✅ You said:  {}", success.user_text);
            info!("✅ Assistant: {}", success.bot_text);
            info!("✅ Spoken reply written to {}", out_path);
        }
        PipelineOutcome::Failure(failure) => {
            info!("❌ Pipeline stopped at {}: {}", failure.stage, failure.error);
            if let Some(user_text) = failure.user_text {
                info!("   You said:  {}", user_text);
            }
            if let Some(bot_text) = failure.bot_text {
                info!("   Assistant: {}", bot_text);
            }
        }
    }

    Ok(())
}
