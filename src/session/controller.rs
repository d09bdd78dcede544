use super::config::SessionConfig;
use super::stats::{SessionState, SessionStats};
use crate::audio::{normalize_chunk, AudioChunk, AudioUnit, CaptureBackend};
use crate::error::VoiceError;
use crate::vad::{chunk_level, StopReason, VoiceActivityMonitor};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Result of one finished recording, delivered once per session
#[derive(Debug)]
pub struct SessionOutcome {
    /// Session identifier
    pub session_id: String,

    /// Why the recording stopped
    pub stop_reason: StopReason,

    /// The captured audio, or None when nothing usable was recorded
    pub audio: Option<AudioUnit>,

    /// Final statistics for the recording
    pub stats: SessionStats,
}

/// Mutable session state behind one lock
struct Shared {
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    stop_tx: Option<watch::Sender<Option<StopReason>>>,
    task: Option<JoinHandle<()>>,
    last_stop_reason: Option<StopReason>,
}

/// Drives one microphone recording at a time through the
/// Idle -> Recording -> Finalizing -> Idle lifecycle
///
/// A recording stops on explicit request, on sustained silence, or at the
/// duration ceiling; whichever fires first wins and the rest collapse into
/// the single finalize. The controller returns to Idle before the outcome
/// is delivered, so the consumer can start the next recording from inside
/// its outcome handler.
pub struct SessionController {
    /// Session configuration
    config: SessionConfig,

    /// Capture backend, locked for the acquire/release pair
    backend: Arc<Mutex<Box<dyn CaptureBackend>>>,

    /// Where finished recordings are delivered
    outcome_tx: mpsc::Sender<SessionOutcome>,

    /// Lifecycle state shared with the session task
    shared: Arc<Mutex<Shared>>,

    /// Guards against concurrent start calls racing the acquire
    starting: AtomicBool,

    /// Chunks accumulated by the active recording
    chunks_count: Arc<AtomicUsize>,

    /// Samples accumulated by the active recording
    samples_count: Arc<AtomicUsize>,

    /// Latest observed loudness level
    level_tx: watch::Sender<f32>,
    level_rx: watch::Receiver<f32>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        backend: Box<dyn CaptureBackend>,
        outcome_tx: mpsc::Sender<SessionOutcome>,
    ) -> Self {
        let (level_tx, level_rx) = watch::channel(0.0f32);

        Self {
            config,
            backend: Arc::new(Mutex::new(backend)),
            outcome_tx,
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::Idle,
                started_at: None,
                ended_at: None,
                stop_tx: None,
                task: None,
                last_stop_reason: None,
            })),
            starting: AtomicBool::new(false),
            chunks_count: Arc::new(AtomicUsize::new(0)),
            samples_count: Arc::new(AtomicUsize::new(0)),
            level_tx,
            level_rx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    /// Start recording
    ///
    /// Returns whether a fresh recording was armed: calling while a
    /// recording is active or finalizing is a logged no-op reported as
    /// `Ok(false)`. Acquire failures propagate and leave the session Idle.
    pub async fn start(&self) -> Result<bool, VoiceError> {
        if self.starting.swap(true, Ordering::SeqCst) {
            warn!("Session start already in progress");
            return Ok(false);
        }
        let result = self.start_inner().await;
        self.starting.store(false, Ordering::SeqCst);
        result
    }

    async fn start_inner(&self) -> Result<bool, VoiceError> {
        {
            let shared = self.shared.lock().await;
            if shared.state != SessionState::Idle {
                warn!(
                    "Recording already started (state: {}), ignoring",
                    shared.state
                );
                return Ok(false);
            }
        }

        info!("Starting recording session: {}", self.config.session_id);

        // Acquire the microphone first; on failure the session stays Idle
        let chunk_rx = {
            let mut backend = self.backend.lock().await;
            backend.acquire().await?
        };

        self.chunks_count.store(0, Ordering::SeqCst);
        self.samples_count.store(0, Ordering::SeqCst);
        self.level_tx.send_replace(0.0);

        let (stop_tx, stop_rx) = watch::channel(None::<StopReason>);

        // Go Recording before the task runs so a stop issued right after
        // start is honored
        {
            let mut shared = self.shared.lock().await;
            shared.state = SessionState::Recording;
            shared.started_at = Some(Utc::now());
            shared.ended_at = None;
            shared.stop_tx = Some(stop_tx);
            shared.last_stop_reason = None;
            // A previous task has finished by the time state is Idle again;
            // dropping its handle detaches the remains
            shared.task.take();
        }

        let task = self.spawn_session_task(chunk_rx, stop_rx);

        {
            let mut shared = self.shared.lock().await;
            shared.task = Some(task);
        }

        Ok(true)
    }

    fn spawn_session_task(
        &self,
        mut chunk_rx: mpsc::Receiver<AudioChunk>,
        mut stop_rx: watch::Receiver<Option<StopReason>>,
    ) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.shared);
        let chunks_count = Arc::clone(&self.chunks_count);
        let samples_count = Arc::clone(&self.samples_count);
        let level_tx = self.level_tx.clone();
        let outcome_tx = self.outcome_tx.clone();
        let capture = self.config.capture.clone();
        let vad = self.config.vad.clone();
        let session_id = self.config.session_id.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let mut monitor = VoiceActivityMonitor::new(vad.clone());
            let mut buffer: Vec<AudioChunk> = Vec::new();
            let mut tick_samples: Vec<i16> = Vec::new();
            let mut level = 0.0f32;

            let mut ticker = tokio::time::interval(Duration::from_millis(
                vad.analysis_interval_ms.max(1),
            ));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let reason = loop {
                tokio::select! {
                    maybe_chunk = chunk_rx.recv() => {
                        match maybe_chunk {
                            Some(chunk) => {
                                let chunk = normalize_chunk(
                                    chunk,
                                    capture.sample_rate,
                                    capture.channels,
                                );
                                chunks_count.fetch_add(1, Ordering::SeqCst);
                                samples_count.fetch_add(chunk.samples.len(), Ordering::SeqCst);
                                tick_samples.extend_from_slice(&chunk.samples);
                                buffer.push(chunk);
                            }
                            None => {
                                warn!("Capture stream ended unexpectedly");
                                break StopReason::Fault;
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        // A tick with no new samples holds the previous
                        // level; a stalled stream is not silence
                        if !tick_samples.is_empty() {
                            level = chunk_level(&tick_samples);
                            tick_samples.clear();
                        }
                        level_tx.send_replace(level);

                        if let Some(reason) = monitor.observe(level, started.elapsed()) {
                            break reason;
                        }
                    }
                    changed = stop_rx.changed() => {
                        match changed {
                            Ok(()) => {
                                if let Some(reason) = *stop_rx.borrow_and_update() {
                                    break reason;
                                }
                            }
                            Err(_) => break StopReason::Shutdown,
                        }
                    }
                }
            };

            info!(
                "Recording stopped ({}): {} chunks in {:.1}s",
                reason,
                chunks_count.load(Ordering::SeqCst),
                started.elapsed().as_secs_f64()
            );

            {
                let mut shared = shared.lock().await;
                shared.state = SessionState::Finalizing;
            }

            // Release the device before the audio is assembled
            {
                let mut backend = backend.lock().await;
                if let Err(e) = backend.release().await {
                    error!("Failed to release capture backend: {}", e);
                }
            }

            // The backend flushes its partial tail while releasing; pull
            // whatever reached the channel into the buffer
            while let Ok(chunk) = chunk_rx.try_recv() {
                let chunk = normalize_chunk(chunk, capture.sample_rate, capture.channels);
                chunks_count.fetch_add(1, Ordering::SeqCst);
                samples_count.fetch_add(chunk.samples.len(), Ordering::SeqCst);
                buffer.push(chunk);
            }

            let audio = match AudioUnit::from_chunks(&buffer) {
                Ok(unit) => unit,
                Err(e) => {
                    error!("Failed to assemble recording: {}", e);
                    None
                }
            };

            let audio = audio.filter(|unit| {
                if unit.size_bytes() < capture.min_unit_bytes {
                    debug!(
                        "Recording below the size floor ({} bytes), treating as empty",
                        unit.size_bytes()
                    );
                    false
                } else {
                    true
                }
            });

            if audio.is_none() {
                debug!("Session produced no usable audio");
            }

            // Snapshot stats and return to Idle before delivery, so the
            // consumer can restart from inside its outcome handler
            let stats = {
                let mut shared = shared.lock().await;
                shared.state = SessionState::Idle;
                shared.ended_at = Some(Utc::now());
                shared.last_stop_reason = Some(reason);
                shared.stop_tx = None;

                SessionStats {
                    state: SessionState::Idle,
                    session_id: session_id.clone(),
                    started_at: shared.started_at,
                    duration_secs: started.elapsed().as_millis() as f64 / 1000.0,
                    chunks_count: chunks_count.load(Ordering::SeqCst),
                    samples_count: samples_count.load(Ordering::SeqCst),
                    level,
                    last_stop_reason: Some(reason),
                }
            };

            let outcome = SessionOutcome {
                session_id,
                stop_reason: reason,
                audio,
                stats,
            };

            if outcome_tx.send(outcome).await.is_err() {
                warn!("No consumer for the session outcome");
            }
        })
    }

    /// Request a stop with the given reason
    ///
    /// Repeated and overlapping requests collapse into the single finalize
    /// already underway.
    pub async fn stop(&self, reason: StopReason) {
        let shared = self.shared.lock().await;
        match (&shared.state, &shared.stop_tx) {
            (SessionState::Recording, Some(stop_tx)) => {
                info!("Stop requested ({})", reason);
                stop_tx.send_replace(Some(reason));
            }
            _ => {
                debug!("Stop requested ({}) with no active recording", reason);
            }
        }
    }

    /// Stop the active recording and wait for the session task to finish
    pub async fn shutdown(&self) {
        self.stop(StopReason::Shutdown).await;

        let task = {
            let mut shared = self.shared.lock().await;
            shared.task.take()
        };

        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Session task panicked: {}", e);
            }
        }
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        let shared = self.shared.lock().await;

        let duration_secs = match shared.started_at {
            Some(started_at) => {
                let end = shared.ended_at.unwrap_or_else(Utc::now);
                end.signed_duration_since(started_at).num_milliseconds() as f64 / 1000.0
            }
            None => 0.0,
        };

        SessionStats {
            state: shared.state,
            session_id: self.config.session_id.clone(),
            started_at: shared.started_at,
            duration_secs,
            chunks_count: self.chunks_count.load(Ordering::SeqCst),
            samples_count: self.samples_count.load(Ordering::SeqCst),
            level: *self.level_rx.borrow(),
            last_stop_reason: shared.last_stop_reason,
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        self.shared.lock().await.state
    }

    /// Latest observed loudness level
    pub fn level(&self) -> f32 {
        *self.level_rx.borrow()
    }

    /// Watch channel carrying loudness updates, one per analysis tick
    pub fn level_watch(&self) -> watch::Receiver<f32> {
        self.level_rx.clone()
    }
}
