// Microphone Level Meter
//
// Captures five seconds from the default input device and prints a
// loudness bar per chunk. Useful to pick a silence threshold for your
// room and microphone.
//
// Usage: cargo run --example mic_levels

use anyhow::Result;
use drwatson_voice::{chunk_level, CaptureBackend, CaptureConfig, CpalBackend};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("🎙️  Starting microphone level meter");

    // 1. Acquire the default input device
    let mut backend = CpalBackend::new(CaptureConfig::default());
    let mut chunk_rx = match backend.acquire().await {
        Ok(rx) => rx,
        Err(e) => {
            eprintln!("Could not open the microphone: {e}");
            return Ok(());
        }
    };
    info!("✅ Microphone acquired, sampling for five seconds");

    // 2. Print one bar per chunk
    let deadline = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            maybe_chunk = chunk_rx.recv() => {
                let Some(chunk) = maybe_chunk else { break };
                let level = chunk_level(&chunk.samples);
                let bar = "#".repeat(((level * 200.0) as usize).min(50));
                println!("{level:>6.3} |{bar:<50}|");
            }
        }
    }

    // 3. Release the device
    backend.release().await?;
    info!("✅ Done");

    Ok(())
}
