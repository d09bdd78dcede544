use super::capture::{AudioChunk, CaptureBackend, CaptureConfig};
use crate::error::VoiceError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Microphone capture backend on the default cpal input device
///
/// cpal streams are not `Send`, so the stream lives on a dedicated thread
/// for the lifetime of one acquire/release cycle. Samples are converted to
/// i16, grouped into fixed-duration chunks, and handed to the session over
/// a bounded channel. The device callback never blocks: when the channel
/// is full the chunk is dropped and counted.
pub struct CpalBackend {
    config: CaptureConfig,
    capturing: Arc<AtomicBool>,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CpalBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for CpalBackend {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioChunk>, VoiceError> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(VoiceError::Capture("capture already active".to_string()));
        }

        let (chunk_tx, chunk_rx) = mpsc::channel(32);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();

        let chunk_ms = self.config.chunk_ms;
        let thread =
            std::thread::spawn(move || capture_thread(chunk_ms, chunk_tx, ready_tx, stop_rx));

        // The stream driver reports readiness (or the typed failure) once
        let ready = tokio::task::spawn_blocking(move || {
            ready_rx.recv_timeout(Duration::from_secs(3))
        })
        .await
        .map_err(|e| VoiceError::Capture(format!("capture startup task failed: {e}")))?;

        match ready {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                self.capturing.store(true, Ordering::SeqCst);
                Ok(chunk_rx)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let _ = stop_tx.send(());
                Err(VoiceError::DeviceUnavailable(
                    "timed out waiting for the input stream".to_string(),
                ))
            }
        }
    }

    async fn release(&mut self) -> Result<(), VoiceError> {
        let stop_tx = match self.stop_tx.take() {
            Some(tx) => tx,
            None => {
                debug!("release: capture already stopped");
                return Ok(());
            }
        };

        let _ = stop_tx.send(());

        if let Some(thread) = self.thread.take() {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
        }

        self.capturing.store(false, Ordering::SeqCst);
        info!("Microphone released");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal-microphone"
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        // Backstop: the thread exits on the signal even if release was never awaited
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Groups converted samples into fixed-duration chunks with monotonic
/// timestamps derived from the frame count
struct ChunkAssembler {
    tx: mpsc::Sender<AudioChunk>,
    pending: Vec<i16>,
    chunk_samples: usize,
    sample_rate: u32,
    channels: u16,
    frames_sent: u64,
    dropped: u64,
}

impl ChunkAssembler {
    fn push(&mut self, samples: &[i16]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.chunk_samples {
            let rest = self.pending.split_off(self.chunk_samples);
            let full = std::mem::replace(&mut self.pending, rest);
            self.send(full);
        }
    }

    fn send(&mut self, samples: Vec<i16>) {
        let frames = samples.len() as u64 / self.channels.max(1) as u64;
        let timestamp_ms = self.frames_sent * 1000 / self.sample_rate.max(1) as u64;
        self.frames_sent += frames;

        let chunk = AudioChunk {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
            timestamp_ms,
        };

        if self.tx.try_send(chunk).is_err() {
            self.dropped += 1;
        }
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.send(rest);
        }
    }
}

fn stream_error(err: cpal::StreamError) {
    warn!("audio stream error: {err}");
}

fn capture_thread(
    chunk_ms: u64,
    chunk_tx: mpsc::Sender<AudioChunk>,
    ready_tx: std::sync::mpsc::Sender<Result<(), VoiceError>>,
    stop_rx: std::sync::mpsc::Receiver<()>,
) {
    let result = (|| -> Result<(cpal::Stream, Arc<Mutex<ChunkAssembler>>), VoiceError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            VoiceError::DeviceUnavailable("no input device available".to_string())
        })?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| classify_capture_error(&e.to_string()))?;
        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels;

        let chunk_samples = (sample_rate as u64 * chunk_ms.max(1) / 1000).max(1) as usize
            * channels.max(1) as usize;

        let assembler = Arc::new(Mutex::new(ChunkAssembler {
            tx: chunk_tx,
            pending: Vec::with_capacity(chunk_samples * 2),
            chunk_samples,
            sample_rate,
            channels,
            frames_sent: 0,
            dropped: 0,
        }));

        let stream = match sample_format {
            SampleFormat::F32 => {
                let sink = Arc::clone(&assembler);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let converted: Vec<i16> = data
                            .iter()
                            .map(|s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                            .collect();
                        if let Ok(mut assembler) = sink.lock() {
                            assembler.push(&converted);
                        }
                    },
                    stream_error,
                    None,
                )
            }
            SampleFormat::I16 => {
                let sink = Arc::clone(&assembler);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut assembler) = sink.lock() {
                            assembler.push(data);
                        }
                    },
                    stream_error,
                    None,
                )
            }
            SampleFormat::U16 => {
                let sink = Arc::clone(&assembler);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        let converted: Vec<i16> =
                            data.iter().map(|s| (*s as i32 - 32768) as i16).collect();
                        if let Ok(mut assembler) = sink.lock() {
                            assembler.push(&converted);
                        }
                    },
                    stream_error,
                    None,
                )
            }
            other => {
                return Err(VoiceError::DeviceUnavailable(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        }
        .map_err(|e| classify_capture_error(&e.to_string()))?;

        stream
            .play()
            .map_err(|e| classify_capture_error(&e.to_string()))?;

        info!(
            "Capturing from '{}' at {}Hz, {} channels ({:?})",
            device_name, sample_rate, channels, sample_format
        );

        Ok((stream, assembler))
    })();

    match result {
        Ok((stream, assembler)) => {
            let _ = ready_tx.send(Ok(()));

            // Park until release; a dropped sender unparks us too
            let _ = stop_rx.recv();

            // Stop callbacks before the final flush
            drop(stream);

            if let Ok(mut assembler) = assembler.lock() {
                assembler.flush();
                if assembler.dropped > 0 {
                    warn!("{} audio chunks dropped on a full channel", assembler.dropped);
                }
            }
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

/// cpal reports permission problems through backend-specific error strings,
/// so the permission/device distinction is made on the message
fn classify_capture_error(message: &str) -> VoiceError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        VoiceError::PermissionDenied(message.to_string())
    } else {
        VoiceError::DeviceUnavailable(message.to_string())
    }
}
