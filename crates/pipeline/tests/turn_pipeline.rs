//! End-to-end turn pipeline tests with mock backends

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use parlo_cache::{AudioCache, AudioCacheConfig, InMemoryKvStore};
use parlo_config::OrchestratorSettings;
use parlo_core::{
    BackendError, ClientEvent, GenerationRequest, Language, LanguageModel, MessageRole,
    OutboundFrame, PronunciationAnalyzer, SpeechSynthesizer, SpeechToText, SynthesisRequest,
    TranscriptResult,
};
use parlo_dialog::ContinuityMemory;
use parlo_persistence::{InMemoryStore, SessionStore, WavAudioStore};
use parlo_pipeline::{OrchestratorDeps, SessionOptions, TurnOrchestrator, TurnPhase};
use parlo_scenario::Scenario;
use parlo_telemetry::LatencyMonitor;

type CallLog = Arc<StdMutex<Vec<&'static str>>>;

struct MockStt {
    calls: AtomicUsize,
    reply: StdMutex<String>,
    fail: bool,
    log: CallLog,
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn transcribe(
        &self,
        _samples: &[f32],
        language: Language,
    ) -> Result<TranscriptResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("stt");
        if self.fail {
            return Err(BackendError::Unreachable("stt down".to_string()));
        }
        Ok(TranscriptResult {
            text: self.reply.lock().unwrap().clone(),
            detected_language: language,
            segments: vec![],
        })
    }
}

struct MockLlm {
    calls: AtomicUsize,
    reply: String,
    delay: Option<Duration>,
    log: CallLog,
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn generate(&self, _request: GenerationRequest) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("llm");
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.reply.clone())
    }
}

struct MockTts {
    calls: AtomicUsize,
    stop_calls: AtomicUsize,
    log: CallLog,
}

#[async_trait]
impl SpeechSynthesizer for MockTts {
    async fn synthesize(
        &self,
        _request: SynthesisRequest,
    ) -> Result<mpsc::Receiver<Vec<u8>>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("tts");
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for _ in 0..3 {
                if tx.send(vec![0u8; 640]).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn stop(&self, _session_id: &str) -> Result<(), BackendError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockAnalyzer {
    calls: AtomicUsize,
}

#[async_trait]
impl PronunciationAnalyzer for MockAnalyzer {
    async fn schedule(
        &self,
        _turn_id: Uuid,
        _audio: &[f32],
        _transcript: &str,
    ) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Fixture {
    orchestrator: Arc<TurnOrchestrator>,
    stt: Arc<MockStt>,
    llm: Arc<MockLlm>,
    tts: Arc<MockTts>,
    analyzer: Arc<MockAnalyzer>,
    store: Arc<InMemoryStore>,
    continuity: Arc<ContinuityMemory>,
    log: CallLog,
    _audio_dir: tempfile::TempDir,
}

struct FixtureOptions {
    llm_reply: String,
    llm_delay: Option<Duration>,
    stt_fail: bool,
    gentle_prompt_ms: u64,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            llm_reply: "Très bien ! Continue.\n[EMOTION: encouragement]".to_string(),
            llm_delay: None,
            stt_fail: false,
            // Out of the way unless a test opts in
            gentle_prompt_ms: 1_000_000,
        }
    }
}

fn fixture(options: FixtureOptions) -> Fixture {
    let log: CallLog = Arc::new(StdMutex::new(Vec::new()));
    let stt = Arc::new(MockStt {
        calls: AtomicUsize::new(0),
        reply: StdMutex::new("bonjour coach".to_string()),
        fail: options.stt_fail,
        log: log.clone(),
    });
    let llm = Arc::new(MockLlm {
        calls: AtomicUsize::new(0),
        reply: options.llm_reply,
        delay: options.llm_delay,
        log: log.clone(),
    });
    let tts = Arc::new(MockTts {
        calls: AtomicUsize::new(0),
        stop_calls: AtomicUsize::new(0),
        log: log.clone(),
    });
    let analyzer = Arc::new(MockAnalyzer {
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(InMemoryStore::new());
    let continuity = Arc::new(ContinuityMemory::default());
    let audio_dir = tempfile::tempdir().unwrap();

    let mut settings = OrchestratorSettings::default();
    settings.gentle_prompt_ms = options.gentle_prompt_ms;

    let orchestrator = TurnOrchestrator::new(
        settings,
        OrchestratorDeps {
            stt: stt.clone(),
            llm: llm.clone(),
            tts: tts.clone(),
            analyzer: analyzer.clone(),
            store: store.clone(),
            audio_store: Arc::new(WavAudioStore::new(audio_dir.path())),
            cache: Arc::new(AudioCache::new(
                Arc::new(InMemoryKvStore::new()),
                AudioCacheConfig::default(),
            )),
            continuity: continuity.clone(),
            monitor: Arc::new(LatencyMonitor::new()),
        },
    );

    Fixture {
        orchestrator,
        stt,
        llm,
        tts,
        analyzer,
        store,
        continuity,
        log,
        _audio_dir: audio_dir,
    }
}

/// 96 ms of confident speech (3 analysis windows)
fn speech_chunk() -> Vec<f32> {
    vec![0.3; 1536]
}

/// 96 ms of silence
fn silence_chunk() -> Vec<f32> {
    vec![0.0; 1536]
}

async fn wait_for(mut cond: impl FnMut() -> bool, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

fn drain(rx: &mut mpsc::Receiver<OutboundFrame>) -> Vec<OutboundFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

/// Feed a full utterance: confirmed speech, then enough silence to cross
/// the end-of-speech threshold (19 chunks × 96 ms = 1824 ms).
async fn feed_turn(f: &Fixture, session: &Arc<tokio::sync::Mutex<parlo_pipeline::Session>>) {
    for _ in 0..10 {
        f.orchestrator.process_chunk(session, speech_chunk()).await;
    }
    for _ in 0..19 {
        f.orchestrator.process_chunk(session, silence_chunk()).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_turn_happy_path() {
    let f = fixture(FixtureOptions::default());
    let (tx, mut rx) = mpsc::channel(1024);
    let session = f
        .orchestrator
        .start_session("s1", SessionOptions::default(), tx)
        .await
        .unwrap();

    feed_turn(&f, &session).await;

    assert!(
        wait_for(|| f.tts.calls.load(Ordering::SeqCst) == 1, 3_000).await,
        "synthesis never ran"
    );
    assert!(
        wait_for(|| session.try_lock().map(|g| g.phase == TurnPhase::Listening).unwrap_or(false), 3_000).await,
        "did not return to listening"
    );

    // Exactly one transcription, one generation, one synthesis, in order
    assert_eq!(f.stt.calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.llm.calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.tts.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*f.log.lock().unwrap(), vec!["stt", "llm", "tts"]);

    // Analysis was scheduled in the background
    assert!(wait_for(|| f.analyzer.calls.load(Ordering::SeqCst) == 1, 2_000).await);

    // The reply was bracketed by speech markers with audio in between
    let frames = drain(&mut rx);
    let mut saw_start = false;
    let mut saw_audio_after_start = false;
    let mut saw_end = false;
    for frame in &frames {
        match frame {
            OutboundFrame::Control(e) if *e == ClientEvent::speech_start() => saw_start = true,
            OutboundFrame::Audio(_) if saw_start => saw_audio_after_start = true,
            OutboundFrame::Control(e) if *e == ClientEvent::speech_end() => saw_end = true,
            _ => {}
        }
    }
    assert!(saw_start && saw_audio_after_start && saw_end);

    // Both halves of the turn persisted, transcript and emotion attached
    assert!(wait_for(
        || {
            let store_id = session.try_lock().map(|g| g.store_id).ok();
            store_id
                .map(|id| f.store.turns_for_session(id).len() == 2)
                .unwrap_or(false)
        },
        2_000
    )
    .await);
    let store_id = session.lock().await.store_id;
    let turns = f.store.turns_for_session(store_id);
    assert_eq!(turns[0].role, MessageRole::User);
    assert_eq!(turns[0].text.as_deref(), Some("bonjour coach"));
    assert!(turns[0].audio_ref.is_some());
    assert_eq!(turns[1].role, MessageRole::Assistant);
    assert_eq!(turns[1].text.as_deref(), Some("Très bien ! Continue."));
    assert_eq!(
        turns[1].emotion,
        Some(parlo_core::Emotion::Encouragement)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_below_threshold_audio_never_reaches_transcription() {
    let f = fixture(FixtureOptions::default());
    let (tx, _rx) = mpsc::channel(1024);
    let session = f
        .orchestrator
        .start_session("s1", SessionOptions::default(), tx)
        .await
        .unwrap();

    // Two seconds of quiet audio below the VAD probability threshold
    for _ in 0..21 {
        f.orchestrator
            .process_chunk(&session, vec![0.005; 1536])
            .await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(f.stt.calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.lock().await.phase, TurnPhase::Listening);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_end_of_speech_fires_exactly_once_at_threshold() {
    let f = fixture(FixtureOptions::default());
    let (tx, _rx) = mpsc::channel(1024);
    let session = f
        .orchestrator
        .start_session("s1", SessionOptions::default(), tx)
        .await
        .unwrap();

    for _ in 0..10 {
        f.orchestrator.process_chunk(&session, speech_chunk()).await;
    }

    // 18 chunks = 1728 ms of accumulated silence: below the 1800 ms threshold
    for _ in 0..18 {
        f.orchestrator.process_chunk(&session, silence_chunk()).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(f.stt.calls.load(Ordering::SeqCst), 0);

    // The 19th chunk crosses the threshold
    f.orchestrator.process_chunk(&session, silence_chunk()).await;
    assert!(wait_for(|| f.stt.calls.load(Ordering::SeqCst) == 1, 2_000).await);

    // Further silence never re-fires the turn
    for _ in 0..10 {
        f.orchestrator.process_chunk(&session, silence_chunk()).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(f.stt.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_interrupt_cancels_generation_and_is_idempotent() {
    let f = fixture(FixtureOptions {
        llm_delay: Some(Duration::from_secs(30)),
        ..Default::default()
    });
    let (tx, _rx) = mpsc::channel(1024);
    let session = f
        .orchestrator
        .start_session("s1", SessionOptions::default(), tx)
        .await
        .unwrap();

    feed_turn(&f, &session).await;
    assert!(
        wait_for(|| f.llm.calls.load(Ordering::SeqCst) == 1, 3_000).await,
        "generation never started"
    );

    f.orchestrator.interrupt(&session).await;
    f.orchestrator.interrupt(&session).await;

    assert_eq!(session.lock().await.phase, TurnPhase::Listening);
    assert!(session.lock().await.active().interrupted);

    // The second call had no additional effect
    let entry = f.continuity.get("s1").unwrap();
    assert_eq!(entry.interruption_count, 1);

    // The user's half of the turn commits; no assistant turn is persisted
    let store_id = session.lock().await.store_id;
    assert!(wait_for(|| f.store.turns_for_session(store_id).len() == 1, 2_000).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let turns = f.store.turns_for_session(store_id);
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, MessageRole::User);
    assert_eq!(f.tts.calls.load(Ordering::SeqCst), 0);

    // Interrupting an idle session stays a no-op
    f.orchestrator.interrupt(&session).await;
    assert_eq!(f.continuity.get("s1").unwrap().interruption_count, 1);
    assert_eq!(session.lock().await.phase, TurnPhase::Listening);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scenario_update_applied_and_persisted() {
    let f = fixture(FixtureOptions {
        llm_reply: "Parfait, parlons de ton expérience.\n\
                    [SCENARIO_UPDATE: {\"next_step\": \"experience\", \"variables\": {\"name\": \"Jean\"}}]\n\
                    [EMOTION: curiosite]"
            .to_string(),
        ..Default::default()
    });

    let scenario = Arc::new(
        Scenario::from_yaml(
            r#"
id: entretien
name: Entretien
initial_step: intro
steps:
  - id: intro
    name: Introduction
    prompt_template: "Demande au candidat de se presenter."
    next_steps: [experience]
  - id: experience
    name: Experience
    prompt_template: "Interroge {name}."
    terminal: true
"#,
        )
        .unwrap(),
    );

    let (tx, _rx) = mpsc::channel(1024);
    let session = f
        .orchestrator
        .start_session(
            "s1",
            SessionOptions {
                scenario: Some(scenario),
                ..Default::default()
            },
            tx,
        )
        .await
        .unwrap();

    feed_turn(&f, &session).await;
    assert!(wait_for(|| f.tts.calls.load(Ordering::SeqCst) == 1, 3_000).await);

    assert!(
        wait_for(|| session.try_lock()
            .map(|g| g.scenario_state.as_ref().map(|s| s.current_step == "experience").unwrap_or(false))
            .unwrap_or(false), 2_000)
        .await
    );
    let guard = session.lock().await;
    let state = guard.scenario_state.as_ref().unwrap();
    assert_eq!(state.completed_steps, vec!["intro".to_string()]);
    assert_eq!(state.variables["name"], serde_json::json!("Jean"));
    drop(guard);

    // Round-tripped to the store
    let mut persisted = false;
    for _ in 0..100 {
        let blob = f
            .store
            .find_session("s1")
            .await
            .unwrap()
            .and_then(|r| r.scenario_state);
        if blob.map(|b| b.contains("experience")).unwrap_or(false) {
            persisted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(persisted, "scenario state never reached the store");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_gentle_prompt_fires_once_per_silence_span() {
    let f = fixture(FixtureOptions {
        gentle_prompt_ms: 1_200,
        ..Default::default()
    });
    let (tx, _rx) = mpsc::channel(1024);
    let session = f
        .orchestrator
        .start_session("s1", SessionOptions::default(), tx)
        .await
        .unwrap();

    for _ in 0..10 {
        f.orchestrator.process_chunk(&session, speech_chunk()).await;
    }
    // 13 chunks = 1248 ms: past the gentle threshold, below end-of-speech
    for _ in 0..13 {
        f.orchestrator.process_chunk(&session, silence_chunk()).await;
    }

    assert!(
        wait_for(|| f.llm.calls.load(Ordering::SeqCst) == 1, 2_000).await,
        "gentle prompt never generated"
    );
    // No turn ran: nothing transcribed
    assert_eq!(f.stt.calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.lock().await.phase, TurnPhase::Listening);

    // More silence within the same span: the gentle prompt does not re-fire
    for _ in 0..3 {
        f.orchestrator.process_chunk(&session, silence_chunk()).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(f.llm.calls.load(Ordering::SeqCst), 1);

    // Crossing end-of-speech still runs exactly one full turn
    for _ in 0..3 {
        f.orchestrator.process_chunk(&session, silence_chunk()).await;
    }
    assert!(wait_for(|| f.stt.calls.load(Ordering::SeqCst) == 1, 2_000).await);
    assert!(wait_for(|| f.llm.calls.load(Ordering::SeqCst) == 2, 2_000).await);

    // Gentle prompts are never persisted
    let store_id = session.lock().await.store_id;
    assert!(wait_for(|| f.store.turns_for_session(store_id).len() == 2, 2_000).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_backend_failure_rolls_back_and_session_survives() {
    let f = fixture(FixtureOptions {
        stt_fail: true,
        ..Default::default()
    });
    let (tx, mut rx) = mpsc::channel(1024);
    let session = f
        .orchestrator
        .start_session("s1", SessionOptions::default(), tx)
        .await
        .unwrap();

    feed_turn(&f, &session).await;
    assert!(wait_for(|| f.stt.calls.load(Ordering::SeqCst) == 1, 3_000).await);
    assert!(
        wait_for(|| session.try_lock().map(|g| g.phase == TurnPhase::Listening).unwrap_or(false), 2_000).await
    );

    // Nothing persisted, one generic error frame sent
    let store_id = session.lock().await.store_id;
    assert!(f.store.turns_for_session(store_id).is_empty());
    assert_eq!(f.llm.calls.load(Ordering::SeqCst), 0);

    let frames = drain(&mut rx);
    let errors = frames
        .iter()
        .filter(|f| matches!(f, OutboundFrame::Control(ClientEvent::Error { .. })))
        .count();
    assert_eq!(errors, 1);

    // The session remains usable: the next utterance runs a turn
    feed_turn(&f, &session).await;
    assert!(wait_for(|| f.stt.calls.load(Ordering::SeqCst) == 2, 3_000).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blank_transcript_skips_turn() {
    let f = fixture(FixtureOptions::default());
    *f.stt.reply.lock().unwrap() = "   ".to_string();

    let (tx, _rx) = mpsc::channel(1024);
    let session = f
        .orchestrator
        .start_session("s1", SessionOptions::default(), tx)
        .await
        .unwrap();

    feed_turn(&f, &session).await;
    assert!(wait_for(|| f.stt.calls.load(Ordering::SeqCst) == 1, 3_000).await);
    assert!(
        wait_for(|| session.try_lock().map(|g| g.phase == TurnPhase::Listening).unwrap_or(false), 2_000).await
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(f.llm.calls.load(Ordering::SeqCst), 0);
    let store_id = session.lock().await.store_id;
    assert!(f.store.turns_for_session(store_id).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_end_session_marks_store_record() {
    let f = fixture(FixtureOptions::default());
    let (tx, _rx) = mpsc::channel(1024);
    f.orchestrator
        .start_session("s1", SessionOptions::default(), tx)
        .await
        .unwrap();
    assert_eq!(f.orchestrator.session_count(), 1);

    f.orchestrator
        .end_session("s1", parlo_persistence::SessionStatus::Ended)
        .await;

    assert_eq!(f.orchestrator.session_count(), 0);
    let record = f.store.find_session("s1").await.unwrap().unwrap();
    assert_eq!(record.status, parlo_persistence::SessionStatus::Ended);
}
