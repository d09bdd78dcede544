// Integration tests for the hands-free conversation loop
//
// A scripted backend plays pre-built recordings and instant stage mocks
// stand in for the speech proxy, so whole conversations resolve in
// well under a second.

use anyhow::Result;
use async_trait::async_trait;
use drwatson_voice::{
    AudioChunk, AudioUnit, CaptureBackend, CaptureConfig, ChatCompletion, ChatContext, ChatReply,
    ConversationTurn, ConverseConfig, ConverseSession, PatientProfile, PipelineConfig,
    SessionConfig, SpeechToText, SpokenReply, StopReason, TextToSpeech, Transcript, VadConfig,
    VoiceError, VoiceEvent, VoiceStages,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

const CADENCE_MS: u64 = 25;

// ============================================================================
// Scripted capture backend
// ============================================================================

struct ScriptedBackend {
    scripts: Mutex<VecDeque<Vec<AudioChunk>>>,
    capturing: Arc<AtomicBool>,
    acquires: Arc<AtomicUsize>,
}

#[async_trait]
impl CaptureBackend for ScriptedBackend {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioChunk>, VoiceError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        self.capturing.store(true, Ordering::SeqCst);

        let script = self
            .scripts
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for chunk in script {
                tokio::time::sleep(Duration::from_millis(CADENCE_MS)).await;
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            tx.closed().await;
        });

        Ok(rx)
    }

    async fn release(&mut self) -> Result<(), VoiceError> {
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn loud_chunk(timestamp_ms: u64) -> AudioChunk {
    let samples: Vec<i16> = (0..400).map(|i| if i % 2 == 0 { 8000 } else { -8000 }).collect();
    AudioChunk {
        samples,
        sample_rate: 16000,
        channels: 1,
        timestamp_ms,
    }
}

fn quiet_chunk(timestamp_ms: u64) -> AudioChunk {
    AudioChunk {
        samples: vec![0; 400],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms,
    }
}

fn speech_then_silence(loud: usize, quiet: usize) -> Vec<AudioChunk> {
    let mut script = Vec::new();
    for i in 0..loud {
        script.push(loud_chunk(i as u64 * CADENCE_MS));
    }
    for i in 0..quiet {
        script.push(quiet_chunk((loud + i) as u64 * CADENCE_MS));
    }
    script
}

// ============================================================================
// Instant stage mocks
// ============================================================================

struct FixedStt {
    text: &'static str,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SpeechToText for FixedStt {
    async fn transcribe(&self, _audio: &AudioUnit) -> Result<Transcript, VoiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Transcript {
            text: self.text.to_string(),
            confidence: Some(0.95),
        })
    }
}

struct ContextChat {
    contexts: Arc<Mutex<Vec<ChatContext>>>,
}

#[async_trait]
impl ChatCompletion for ContextChat {
    async fn complete(
        &self,
        _message: &str,
        context: &ChatContext,
    ) -> Result<ChatReply, VoiceError> {
        self.contexts.lock().expect("lock").push(context.clone());
        Ok(ChatReply {
            text: "Noted.".to_string(),
            metadata: Default::default(),
        })
    }
}

struct FixedTts;

#[async_trait]
impl TextToSpeech for FixedTts {
    async fn synthesize(&self, _text: &str) -> Result<SpokenReply, VoiceError> {
        Ok(SpokenReply {
            data: vec![0xFF; 16],
            media_type: "audio/mpeg".to_string(),
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Handles {
    acquires: Arc<AtomicUsize>,
    stt_calls: Arc<AtomicUsize>,
    contexts: Arc<Mutex<Vec<ChatContext>>>,
    events: Arc<Mutex<Vec<VoiceEvent>>>,
}

fn converse_session(
    scripts: Vec<Vec<AudioChunk>>,
    auto_restart: bool,
    stt_text: &'static str,
) -> (ConverseSession, Handles) {
    let acquires = Arc::new(AtomicUsize::new(0));
    let stt_calls = Arc::new(AtomicUsize::new(0));
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let events = Arc::new(Mutex::new(Vec::new()));

    let backend = Box::new(ScriptedBackend {
        scripts: Mutex::new(scripts.into()),
        capturing: Arc::new(AtomicBool::new(false)),
        acquires: Arc::clone(&acquires),
    });

    let stages = VoiceStages {
        stt: Arc::new(FixedStt {
            text: stt_text,
            calls: Arc::clone(&stt_calls),
        }),
        chat: Arc::new(ContextChat {
            contexts: Arc::clone(&contexts),
        }),
        tts: Arc::new(FixedTts),
    };

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let event_log = Arc::clone(&events);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            event_log.lock().expect("lock").push(event);
        }
    });

    let session_config = SessionConfig {
        session_id: "test-conversation".to_string(),
        capture: CaptureConfig {
            min_unit_bytes: 64,
            ..CaptureConfig::default()
        },
        vad: VadConfig {
            silence_threshold: 0.01,
            silence_duration_ms: 200,
            max_recording_ms: 10_000,
            analysis_interval_ms: 25,
        },
    };

    let session = ConverseSession::new(
        session_config,
        ConverseConfig {
            auto_restart,
            history_turns: 8,
        },
        PipelineConfig::default(),
        PatientProfile {
            conditions: vec!["hypertension".to_string()],
            medications: vec!["lisinopril".to_string()],
        },
        backend,
        stages,
        event_tx,
    );

    (
        session,
        Handles {
            acquires,
            stt_calls,
            contexts,
            events,
        },
    )
}

async fn wait_for_turns(session: &ConverseSession, count: usize) -> Vec<ConversationTurn> {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let turns = session.turns().await;
        if turns.len() >= count {
            return turns;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {} turns (got {})",
            count,
            turns.len()
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

async fn wait_until_inactive(session: &ConverseSession) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while session.is_active() {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for the conversation to end"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

// The collector task drains the event channel on its own schedule, so
// give it a moment before inspecting the log
async fn wait_for_session_end(events: &Arc<Mutex<Vec<VoiceEvent>>>) {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let seen = events
            .lock()
            .expect("lock")
            .iter()
            .any(|e| matches!(e, VoiceEvent::SessionEnded { .. }));
        if seen {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for the session end event"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_silence_stop_records_a_full_turn() -> Result<()> {
    let (session, handles) =
        converse_session(vec![speech_then_silence(6, 40)], false, "I feel dizzy");

    session.start().await?;
    let turns = wait_for_turns(&session, 1).await;

    assert_eq!(turns[0].user_text, "I feel dizzy");
    assert_eq!(turns[0].bot_text.as_deref(), Some("Noted."));
    assert!(turns[0].speech.is_some());
    assert!(turns[0].failed_stage.is_none());

    // Without auto-restart the loop ends after the first turn
    wait_until_inactive(&session).await;
    assert_eq!(handles.acquires.load(Ordering::SeqCst), 1);

    wait_for_session_end(&handles.events).await;
    let events = handles.events.lock().expect("lock").clone();
    assert!(events.iter().any(|e| matches!(
        e,
        VoiceEvent::SessionEnded {
            reason: StopReason::Silence,
            had_audio: true
        }
    )));

    Ok(())
}

#[tokio::test]
async fn test_auto_restart_carries_history_between_turns() -> Result<()> {
    let (session, handles) = converse_session(
        vec![speech_then_silence(6, 40), speech_then_silence(6, 40)],
        true,
        "my head hurts",
    );

    session.start().await?;
    wait_for_turns(&session, 2).await;
    session.shutdown().await;

    assert!(handles.acquires.load(Ordering::SeqCst) >= 2);

    let contexts = handles.contexts.lock().expect("lock").clone();
    assert!(contexts.len() >= 2);

    // The first chat request sees the profile but no history
    assert_eq!(contexts[0].conditions, vec!["hypertension"]);
    assert_eq!(contexts[0].medications, vec!["lisinopril"]);
    assert!(contexts[0].prior_turns.is_empty());

    // The second sees the first exchange
    assert_eq!(contexts[1].prior_turns.len(), 1);
    assert_eq!(contexts[1].prior_turns[0].user, "my head hurts");
    assert_eq!(contexts[1].prior_turns[0].bot, "Noted.");

    Ok(())
}

#[tokio::test]
async fn test_manual_stop_processes_the_final_turn() -> Result<()> {
    let (session, handles) =
        converse_session(vec![speech_then_silence(80, 0)], true, "one last thing");

    session.start().await?;
    tokio::time::sleep(Duration::from_millis(150)).await;
    session.stop().await;

    // The interrupted recording still runs through the pipeline
    let turns = wait_for_turns(&session, 1).await;
    assert_eq!(turns[0].user_text, "one last thing");

    // But no new recording starts, auto-restart or not
    wait_until_inactive(&session).await;
    assert_eq!(handles.acquires.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_empty_transcript_leaves_no_turn() -> Result<()> {
    let (session, handles) = converse_session(vec![speech_then_silence(6, 40)], false, "   ");

    session.start().await?;
    wait_until_inactive(&session).await;

    assert!(session.turns().await.is_empty(), "nothing intelligible was said");
    assert_eq!(handles.stt_calls.load(Ordering::SeqCst), 1);

    // The recording itself had audio; only the transcript was blank
    wait_for_session_end(&handles.events).await;
    let events = handles.events.lock().expect("lock").clone();
    assert!(events.iter().any(|e| matches!(
        e,
        VoiceEvent::SessionEnded {
            had_audio: true,
            ..
        }
    )));

    Ok(())
}

#[tokio::test]
async fn test_shutdown_discards_the_recording() -> Result<()> {
    let (session, handles) =
        converse_session(vec![speech_then_silence(80, 0)], true, "cut off mid-word");

    session.start().await?;
    tokio::time::sleep(Duration::from_millis(150)).await;
    session.shutdown().await;

    // Audio captured before a shutdown never reaches the pipeline
    assert!(session.turns().await.is_empty());
    assert_eq!(handles.stt_calls.load(Ordering::SeqCst), 0);
    assert!(!session.is_active());

    wait_for_session_end(&handles.events).await;
    let events = handles.events.lock().expect("lock").clone();
    assert!(events.iter().any(|e| matches!(
        e,
        VoiceEvent::SessionEnded {
            reason: StopReason::Shutdown,
            had_audio: false
        }
    )));

    Ok(())
}

#[tokio::test]
async fn test_start_while_active_is_a_no_op() -> Result<()> {
    let (session, handles) =
        converse_session(vec![speech_then_silence(80, 0)], false, "still talking");

    session.start().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.start().await?;

    assert_eq!(handles.acquires.load(Ordering::SeqCst), 1);

    session.shutdown().await;

    Ok(())
}

#[tokio::test]
async fn test_restart_right_after_stop_rearms_the_microphone() -> Result<()> {
    let (session, handles) = converse_session(
        vec![speech_then_silence(80, 0), speech_then_silence(80, 0)],
        false,
        "had to step away",
    );

    session.start().await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Restart with the old loop still draining its final turn; the new
    // activation must wait it out rather than be clobbered by its exit
    session.stop().await;
    session.start().await?;

    assert!(session.is_active(), "restart left the conversation inactive");
    assert_eq!(handles.acquires.load(Ordering::SeqCst), 2);

    // The stopped turn still resolved on its way out
    let turns = wait_for_turns(&session, 1).await;
    assert_eq!(turns[0].user_text, "had to step away");

    let done = timeout(Duration::from_secs(3), session.shutdown()).await;
    assert!(done.is_ok(), "shutdown hung on an orphaned turn loop");

    Ok(())
}

#[tokio::test]
async fn test_empty_recording_rearms_without_the_pipeline() -> Result<()> {
    // The first recording captures nothing; with auto-restart the loop
    // arms a fresh one and the real turn follows
    let (session, handles) = converse_session(
        vec![Vec::new(), speech_then_silence(6, 40)],
        true,
        "there it is",
    );

    session.start().await?;
    let turns = wait_for_turns(&session, 1).await;
    session.shutdown().await;

    assert_eq!(turns[0].user_text, "there it is");
    assert_eq!(
        handles.stt_calls.load(Ordering::SeqCst),
        1,
        "the empty recording reached a stage"
    );
    assert!(handles.acquires.load(Ordering::SeqCst) >= 2);

    wait_for_session_end(&handles.events).await;
    let events = handles.events.lock().expect("lock").clone();
    assert!(events.iter().any(|e| matches!(
        e,
        VoiceEvent::SessionEnded {
            reason: StopReason::Silence,
            had_audio: false
        }
    )));
    assert!(
        !events.iter().any(|e| matches!(e, VoiceEvent::StageFailed { .. })),
        "an empty recording is not an error"
    );

    Ok(())
}
