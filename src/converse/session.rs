use crate::audio::CaptureBackend;
use crate::error::{Stage, VoiceError};
use crate::events::VoiceEvent;
use crate::pipeline::{
    ChatContext, PatientProfile, PipelineConfig, PipelineOutcome, SpokenReply, TurnText,
    VoicePipeline, VoiceStages,
};
use crate::session::{SessionConfig, SessionController, SessionOutcome, SessionState, SessionStats};
use crate::vad::StopReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for a hands-free conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverseConfig {
    /// Start the next recording automatically after each turn resolves
    #[serde(default)]
    pub auto_restart: bool,

    /// How many prior exchanges accompany each chat request
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

fn default_history_turns() -> usize {
    8
}

impl Default for ConverseConfig {
    fn default() -> Self {
        Self {
            auto_restart: false,
            history_turns: default_history_turns(),
        }
    }
}

/// One recorded exchange between the user and the assistant
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    /// What the user said
    pub user_text: String,

    /// The assistant's reply, when the chat stage completed
    pub bot_text: Option<String>,

    /// Synthesized speech for the reply, when synthesis completed
    pub speech: Option<SpokenReply>,

    /// The stage that failed, when the turn ended early
    pub failed_stage: Option<Stage>,

    /// When the turn resolved
    pub completed_at: DateTime<Utc>,
}

/// A voice conversation: recordings gated by voice activity, each one
/// run through the speech pipeline, with the exchange log feeding chat
/// context for later turns
///
/// Playback is the consumer's concern; this type stops at synthesized
/// audio and the event stream.
pub struct ConverseSession {
    /// Session identifier shared with the recording controller
    session_id: String,

    config: ConverseConfig,

    controller: Arc<SessionController>,

    pipeline: Arc<VoicePipeline>,

    /// Patient background forwarded with every chat request
    profile: PatientProfile,

    /// Completed turns, oldest first
    turns: Arc<Mutex<Vec<ConversationTurn>>>,

    events: mpsc::Sender<VoiceEvent>,

    /// Receiver for finished recordings, held by the turn loop
    outcome_rx: Arc<Mutex<mpsc::Receiver<SessionOutcome>>>,

    /// Whether the conversation is live
    active: Arc<AtomicBool>,

    /// Bumped on every activation; an exiting loop only clears `active`
    /// when it is still the current one
    generation: Arc<AtomicU64>,

    /// Handle for the turn loop task
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConverseSession {
    pub fn new(
        session: SessionConfig,
        config: ConverseConfig,
        pipeline_config: PipelineConfig,
        profile: PatientProfile,
        backend: Box<dyn CaptureBackend>,
        stages: VoiceStages,
        events: mpsc::Sender<VoiceEvent>,
    ) -> Self {
        let session_id = session.session_id.clone();
        let (outcome_tx, outcome_rx) = mpsc::channel(4);
        let controller = Arc::new(SessionController::new(session, backend, outcome_tx));
        let pipeline = Arc::new(VoicePipeline::new(stages, pipeline_config, events.clone()));

        Self {
            session_id,
            config,
            controller,
            pipeline,
            profile,
            turns: Arc::new(Mutex::new(Vec::new())),
            events,
            outcome_rx: Arc::new(Mutex::new(outcome_rx)),
            active: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            loop_handle: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start listening
    ///
    /// A stopped conversation can be restarted immediately: the new
    /// activation waits out the previous loop, which may still be
    /// draining its final turn, before arming a fresh recording.
    pub async fn start(&self) -> Result<(), VoiceError> {
        // The handle lock serializes activations end to end
        let mut handle = self.loop_handle.lock().await;

        if self.active.swap(true, Ordering::SeqCst) {
            warn!("Conversation already active");
            return Ok(());
        }

        // Claim the activation before waiting, so the old loop's exit
        // cannot clear the flag out from under the new one
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(task) = handle.take() {
            if let Err(e) = task.await {
                error!("Turn loop panicked: {}", e);
            }
        }

        info!("Starting conversation: {}", self.session_id);

        match self.controller.start().await {
            Ok(true) => {}
            Ok(false) => {
                self.active.store(false, Ordering::SeqCst);
                return Err(VoiceError::Capture(
                    "recording controller is busy".to_string(),
                ));
            }
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        self.emit(VoiceEvent::StateChanged(SessionState::Recording))
            .await;

        *handle = Some(self.spawn_turn_loop(generation));

        Ok(())
    }

    fn spawn_turn_loop(&self, generation: u64) -> JoinHandle<()> {
        let config = self.config.clone();
        let controller = Arc::clone(&self.controller);
        let pipeline = Arc::clone(&self.pipeline);
        let profile = self.profile.clone();
        let turns = Arc::clone(&self.turns);
        let events = self.events.clone();
        let outcome_rx = Arc::clone(&self.outcome_rx);
        let active = Arc::clone(&self.active);
        let latest_generation = Arc::clone(&self.generation);

        tokio::spawn(async move {
            // Serializes loops across restarts: a new loop waits here
            // until the previous one has drained
            let mut outcome_rx = outcome_rx.lock().await;

            while let Some(outcome) = outcome_rx.recv().await {
                let reason = outcome.stop_reason;
                let mut had_audio = false;

                // Audio from a shutdown stop is discarded, everything
                // else goes through the pipeline
                let audio = outcome
                    .audio
                    .filter(|_| reason != StopReason::Shutdown);

                if let Some(audio) = audio {
                    had_audio = true;

                    let context = {
                        let turns = turns.lock().await;
                        build_context(&profile, &turns, config.history_turns)
                    };

                    let result = pipeline.run(&audio, &context).await;
                    record_turn(&turns, result).await;
                } else {
                    debug!("Recording ended with no audio to process ({})", reason);
                }

                if events
                    .send(VoiceEvent::SessionEnded { reason, had_audio })
                    .await
                    .is_err()
                {
                    debug!("No listener for conversation events");
                }

                // Decide whether to listen for another turn
                let restart = match reason {
                    StopReason::Manual | StopReason::Shutdown => false,
                    StopReason::Silence | StopReason::MaxDuration | StopReason::Fault => {
                        config.auto_restart && active.load(Ordering::SeqCst)
                    }
                };

                if !restart {
                    break;
                }

                match controller.start().await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("Recorder busy, not restarting");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to restart listening: {}", e);
                        break;
                    }
                }

                if events
                    .send(VoiceEvent::StateChanged(SessionState::Recording))
                    .await
                    .is_err()
                {
                    debug!("No listener for conversation events");
                }
            }

            // A newer activation may have superseded this loop while it
            // drained; only the current one clears the flag
            if latest_generation.load(Ordering::SeqCst) == generation {
                active.store(false, Ordering::SeqCst);
            }
            info!("Conversation loop ended");
        })
    }

    /// End the current turn
    ///
    /// The recording finishes and its audio still runs through the
    /// pipeline; only the automatic restart is cancelled.
    pub async fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.controller.stop(StopReason::Manual).await;
    }

    /// Stop everything and wait for the turn loop to drain
    pub async fn shutdown(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.controller.shutdown().await;

        let task = {
            let mut handle = self.loop_handle.lock().await;
            handle.take()
        };

        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Turn loop panicked: {}", e);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Completed turns, oldest first
    pub async fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.lock().await.clone()
    }

    /// Statistics for the underlying recording session
    pub async fn stats(&self) -> SessionStats {
        self.controller.stats().await
    }

    /// Current recording lifecycle state
    pub async fn state(&self) -> SessionState {
        self.controller.state().await
    }

    /// Watch channel carrying loudness updates
    pub fn level_watch(&self) -> watch::Receiver<f32> {
        self.controller.level_watch()
    }

    async fn emit(&self, event: VoiceEvent) {
        if self.events.send(event).await.is_err() {
            debug!("No listener for conversation events");
        }
    }
}

/// Assemble chat context from the patient profile and the most recent
/// fully-answered exchanges
fn build_context(
    profile: &PatientProfile,
    turns: &[ConversationTurn],
    history_turns: usize,
) -> ChatContext {
    let mut prior_turns: Vec<TurnText> = turns
        .iter()
        .rev()
        .filter_map(|turn| {
            turn.bot_text.as_ref().map(|bot| TurnText {
                user: turn.user_text.clone(),
                bot: bot.clone(),
            })
        })
        .take(history_turns)
        .collect();
    prior_turns.reverse();

    ChatContext {
        conditions: profile.conditions.clone(),
        medications: profile.medications.clone(),
        prior_turns,
    }
}

/// Append the resolved turn to the log
///
/// A run that produced no user text (nothing was understood) leaves no
/// trace; a failure after recognition is kept as a partial exchange.
async fn record_turn(turns: &Mutex<Vec<ConversationTurn>>, result: PipelineOutcome) {
    let turn = match result {
        PipelineOutcome::Success(success) => ConversationTurn {
            user_text: success.user_text,
            bot_text: Some(success.bot_text),
            speech: Some(success.speech),
            failed_stage: None,
            completed_at: Utc::now(),
        },
        PipelineOutcome::Failure(failure) => {
            let Some(user_text) = failure.user_text else {
                return;
            };
            ConversationTurn {
                user_text,
                bot_text: failure.bot_text,
                speech: None,
                failed_stage: Some(failure.stage),
                completed_at: Utc::now(),
            }
        }
    };

    let mut turns = turns.lock().await;
    turns.push(turn);
}
