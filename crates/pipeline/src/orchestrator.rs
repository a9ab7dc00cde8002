//! Turn Orchestrator
//!
//! Drives the LISTENING → PROCESSING_ASR → PROCESSING_LLM → SPEAKING_TTS →
//! LISTENING loop for every live session. One logical task per session;
//! within a turn the pipeline stages suspend at their I/O boundaries, and
//! the interruption signal cancels the held generation/synthesis task
//! handles rather than flipping flags the pipeline would have to poll.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch, Mutex};

use parlo_cache::AudioCache;
use parlo_config::constants::{continuity as continuity_constants, synthesis, turn};
use parlo_config::OrchestratorSettings;
use parlo_core::{
    audio::rms_energy, ChatMessage, ClientEvent, Emotion, GenerationRequest, Language,
    LanguageModel, MessageRole, OutboundFrame, PronunciationAnalyzer, SpeechSynthesizer,
    SpeechToText, SynthesisRequest,
};
use parlo_dialog::{
    build_gentle_prompt_messages, build_turn_messages, parse_emotion, parse_scenario_update,
    ContinuityMemory, DirectiveOutcome, InterruptionKind, PromptContext,
};
use parlo_persistence::{
    AudioStore, SessionRecord, SessionStatus, SessionStore, TurnBatch, TurnRecord,
};
use parlo_scenario::{Scenario, ScenarioContext};
use parlo_telemetry::{LatencyMonitor, PipelineStep};

use crate::session::{NewSession, Session, SessionManager, TurnPhase};
use crate::vad::{EnergyVad, SpeechGateConfig};
use crate::PipelineError;

/// Error text a client sees on any recoverable turn failure.
const GENERIC_ERROR_MESSAGE: &str = "Une erreur est survenue. Tu peux reprendre quand tu veux.";

/// Options for starting a session.
pub struct SessionOptions {
    pub language: Language,
    pub goal: Option<String>,
    pub scenario: Option<Arc<Scenario>>,
    pub speaker_id: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            language: Language::Fr,
            goal: None,
            scenario: None,
            speaker_id: "coach_fr".to_string(),
        }
    }
}

/// External collaborators and owned services injected at construction.
pub struct OrchestratorDeps {
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn LanguageModel>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub analyzer: Arc<dyn PronunciationAnalyzer>,
    pub store: Arc<dyn SessionStore>,
    pub audio_store: Arc<dyn AudioStore>,
    pub cache: Arc<AudioCache>,
    pub continuity: Arc<ContinuityMemory>,
    pub monitor: Arc<LatencyMonitor>,
}

/// The top-level engine.
pub struct TurnOrchestrator {
    settings: OrchestratorSettings,
    deps: OrchestratorDeps,
    sessions: SessionManager,
}

enum SpeakOutcome {
    Completed,
    Cancelled,
    Failed(PipelineError),
}

impl TurnOrchestrator {
    pub fn new(settings: OrchestratorSettings, deps: OrchestratorDeps) -> Arc<Self> {
        let sessions = SessionManager::new(
            settings.max_sessions,
            Duration::from_secs(settings.session_timeout_secs),
            Duration::from_secs(settings.cleanup_interval_secs),
        );
        Arc::new(Self {
            settings,
            deps,
            sessions,
        })
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn session(&self, external_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(external_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.count()
    }

    /// Create (or re-attach to) a session. Loads or creates the persistent
    /// record and seeds the default user/agent participants.
    pub async fn start_session(
        self: &Arc<Self>,
        external_id: &str,
        options: SessionOptions,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Result<Arc<Mutex<Session>>, PipelineError> {
        if let Some(existing) = self.sessions.get(external_id) {
            return Ok(existing);
        }

        let record = {
            let _t = self
                .deps
                .monitor
                .scoped(PipelineStep::StoreWrite, Some(external_id));
            match self.deps.store.find_session(external_id).await? {
                Some(record) => record,
                None => {
                    let mut record = SessionRecord::new(external_id, options.language);
                    record.goal = options.goal.clone();
                    record.scenario_id = options.scenario.as_ref().map(|s| s.id.clone());
                    self.deps.store.create_session(record.clone()).await?;
                    record
                }
            }
        };

        let scenario_state = options.scenario.as_ref().map(|scenario| {
            record
                .scenario_state
                .as_deref()
                .and_then(parlo_scenario::ScenarioState::from_blob)
                .unwrap_or_else(|| scenario.initial_state())
        });

        let gate_config = SpeechGateConfig {
            threshold: self.settings.vad_threshold,
            window_samples: self.settings.vad_window_samples,
            speech_confirm_frames: self.settings.speech_confirm_frames,
            silence_confirm_frames: self.settings.silence_confirm_frames,
            sample_rate: parlo_core::audio::SAMPLE_RATE_HZ,
        };

        let session = self.sessions.insert(NewSession {
            external_id: external_id.to_string(),
            store_id: record.id,
            language: record.language,
            goal: record.goal.clone(),
            scenario: options.scenario,
            scenario_state,
            vad: Box::new(EnergyVad),
            gate_config,
            outbound,
        })?;

        {
            let mut guard = session.lock().await;
            guard.agent().voice_id = Some(options.speaker_id);
        }

        tracing::info!(session_id = %external_id, "session started");
        Ok(session)
    }

    /// Feed one incoming audio chunk through voice-activity gating and the
    /// turn-taking heuristics.
    pub async fn process_chunk(
        self: &Arc<Self>,
        session: &Arc<Mutex<Session>>,
        samples: Vec<f32>,
    ) {
        let mut guard = session.lock().await;
        guard.touch();
        guard.chunk_sequence += 1;

        let interrupted = {
            let active = guard.active();
            active.interrupted
        };
        if guard.phase != TurnPhase::Listening && !interrupted {
            // Mid-pipeline audio is dropped; the user can speak again right
            // after interrupting, which keeps accumulation alive below.
            return;
        }

        let update = {
            let _t = self
                .deps
                .monitor
                .scoped(PipelineStep::VoiceActivity, Some(&guard.external_id));
            let Session { gate, vad, .. } = &mut *guard;
            gate.process(&samples, vad.as_mut())
        };

        let now = Instant::now();
        let speech_pad_ms = self.settings.speech_pad_ms;

        if update.speech_started {
            guard.gentle_prompt_fired = false;
            let active = guard.active();
            active.speaking = true;
            active.speech_start = Some(now);
            active.silence_start = None;
            active.touch();
        }

        if update.is_speech {
            let active = guard.active();
            if active.speaking {
                active.utterance.extend_from_slice(&samples);
                active.silence_start = None;
            }
        } else {
            let active = guard.active();
            if active.speaking {
                if active.silence_start.is_none() {
                    active.silence_start = Some(now);
                }
                // Trailing padding keeps the end of the utterance intact
                if update.silence_ms <= speech_pad_ms {
                    active.utterance.extend_from_slice(&samples);
                }
            }
        }

        let speaking = guard.active().speaking;
        if !speaking || update.is_speech || guard.phase != TurnPhase::Listening {
            return;
        }

        if update.silence_ms >= self.settings.end_of_speech_ms {
            // End of speech: finalize the turn
            guard.phase = TurnPhase::ProcessingAsr;
            guard.turn_counter += 1;
            let turn_number = guard.turn_counter;
            guard.gate.reset();
            guard.vad.reset();
            guard.gentle_prompt_fired = false;
            let audio = {
                let active = guard.active();
                active.speaking = false;
                active.speech_start = None;
                active.silence_start = None;
                active.drain_utterance()
            };
            drop(guard);

            let this = Arc::clone(self);
            let session = Arc::clone(session);
            tokio::spawn(async move {
                this.run_turn(session, audio, turn_number).await;
            });
        } else if update.silence_ms >= self.settings.gentle_prompt_ms
            && !guard.gentle_prompt_fired
        {
            let synthesis_busy = guard.agent().synthesis_task.is_some();
            if !synthesis_busy {
                guard.gentle_prompt_fired = true;
                drop(guard);

                let this = Arc::clone(self);
                let session = Arc::clone(session);
                tokio::spawn(async move {
                    this.gentle_prompt(session).await;
                });
            }
        }
    }

    /// The end-of-speech pipeline: persist → transcribe → generate → speak.
    async fn run_turn(self: Arc<Self>, session: Arc<Mutex<Session>>, audio: Vec<f32>, turn_number: u64) {
        let (sid, store_id, language) = {
            let guard = session.lock().await;
            (guard.external_id.clone(), guard.store_id, guard.language)
        };

        // Empty or near-silent utterances never reach the transcription
        // backend and are never persisted.
        if audio.is_empty() || rms_energy(&audio) < turn::NEAR_SILENT_RMS {
            tracing::info!(session_id = %sid, turn = turn_number, "empty utterance, skipping turn");
            session.lock().await.phase = TurnPhase::Listening;
            return;
        }

        let _whole_turn = self
            .deps
            .monitor
            .scoped(PipelineStep::WholeTurn, Some(&sid));

        let mut batch = TurnBatch::new(self.deps.store.clone(), store_id);

        // 1. Persist raw utterance audio, create the user turn record
        let audio_ref = {
            let _t = self
                .deps
                .monitor
                .scoped(PipelineStep::AudioPersist, Some(&sid));
            match self
                .deps
                .audio_store
                .persist_utterance(&sid, turn_number, &audio)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    self.fail_turn(&session, batch, e.into()).await;
                    return;
                }
            }
        };
        let user_turn = TurnRecord::user(store_id, turn_number, audio_ref);
        let user_turn_id = user_turn.id;
        batch.append_turn(user_turn);

        // 2. Transcribe
        let transcript = {
            let _t = self
                .deps
                .monitor
                .scoped(PipelineStep::Transcription, Some(&sid));
            match self.deps.stt.transcribe(&audio, language).await {
                Ok(t) => t,
                Err(e) => {
                    self.fail_turn(&session, batch, e.into()).await;
                    return;
                }
            }
        };
        if transcript.is_empty() {
            tracing::info!(session_id = %sid, turn = turn_number, "blank transcript, skipping turn");
            batch.rollback();
            session.lock().await.phase = TurnPhase::Listening;
            return;
        }
        batch.attach_transcript(user_turn_id, transcript.text.clone());

        // 3. Fire-and-forget pronunciation analysis
        {
            let analyzer = self.deps.analyzer.clone();
            let monitor = self.deps.monitor.clone();
            let audio_for_analysis = audio.clone();
            let text = transcript.text.clone();
            let sid_for_analysis = sid.clone();
            tokio::spawn(async move {
                let _t = monitor.scoped(PipelineStep::AnalysisSchedule, Some(&sid_for_analysis));
                if let Err(e) = analyzer
                    .schedule(user_turn_id, &audio_for_analysis, &text)
                    .await
                {
                    tracing::warn!(error = %e, "pronunciation analysis scheduling failed");
                }
            });
        }

        // 4. Build generation context
        let (messages, spliced_continuity, scenario_attached) = {
            let mut guard = session.lock().await;
            guard
                .active()
                .history
                .push(ChatMessage::user(transcript.text.clone()));
            guard.phase = TurnPhase::ProcessingLlm;

            let interrupted = guard.active().interrupted;
            let scenario_context = scenario_context(&guard);
            let history = guard.active().history.clone();
            let goal = guard.goal.clone();
            let agent_prompt = guard.agent().system_prompt.clone();

            let continuity_entry = if interrupted {
                None
            } else {
                self.deps.continuity.get(&sid)
            };
            let kind = interruption_kind(&transcript.text);

            let ctx = PromptContext {
                language,
                goal: goal.as_deref(),
                scenario: scenario_context.as_ref(),
                history: &history,
                history_window: self.settings.history_window,
                interrupted,
                continuity: continuity_entry.as_ref().map(|e| (e, kind)),
                agent_prompt: agent_prompt.as_deref(),
            };
            (
                build_turn_messages(&ctx),
                continuity_entry.is_some(),
                guard.scenario.is_some(),
            )
        };
        if spliced_continuity {
            // A resumption phrase is used exactly once
            self.deps.continuity.clear(&sid);
        }

        // 5. Generate, holding a cancellable handle on the agent participant
        let raw_reply = {
            let _t = self
                .deps
                .monitor
                .scoped(PipelineStep::Generation, Some(&sid));
            let (tx, rx) = oneshot::channel();
            let llm = self.deps.llm.clone();
            let request = GenerationRequest::new(messages);
            let handle = tokio::spawn(async move {
                let _ = tx.send(llm.generate(request).await);
            });
            session.lock().await.agent().generation_task = Some(handle);
            let outcome = rx.await;
            session.lock().await.agent().generation_task = None;

            match outcome {
                Err(_) => {
                    // Aborted by an interruption: not an error. The user's
                    // side of the turn still commits; no assistant turn.
                    tracing::info!(session_id = %sid, turn = turn_number, "generation cancelled");
                    self.commit_batch(&sid, batch).await;
                    return;
                }
                Ok(Err(e)) => {
                    self.fail_turn(&session, batch, e.into()).await;
                    return;
                }
                Ok(Ok(raw)) => raw,
            }
        };

        // 6. Parse directives, apply scenario update, persist assistant turn
        let reply = parse_emotion(&raw_reply);
        let (reply_text, update_outcome) = parse_scenario_update(&reply.text);
        let emotion = reply.emotion;

        if let DirectiveOutcome::Found(update) = update_outcome {
            if scenario_attached {
                let mut guard = session.lock().await;
                let Session {
                    scenario,
                    scenario_state,
                    ..
                } = &mut *guard;
                if let (Some(scenario), Some(state)) = (scenario.as_ref(), scenario_state.as_mut())
                {
                    let outcome = scenario.apply_update(state, &update);
                    tracing::debug!(session_id = %sid, ?outcome, "scenario update applied");
                    batch.update_scenario_state(state.to_blob());
                }
            }
        }

        let speaker_id = {
            let mut guard = session.lock().await;
            guard.active().interrupted = false;
            guard
                .active()
                .history
                .push(ChatMessage::assistant(reply_text.clone()));
            guard.phase = TurnPhase::SpeakingTts;
            guard
                .agent()
                .voice_id
                .clone()
                .unwrap_or_else(|| "coach_fr".to_string())
        };
        batch.append_turn(TurnRecord::assistant(
            store_id,
            turn_number,
            reply_text.clone(),
            emotion,
        ));

        // 7. Speak (cache-first), holding a cancellable handle
        match self
            .speak(&session, &sid, &reply_text, emotion, &speaker_id, language)
            .await
        {
            SpeakOutcome::Completed => {
                let mut guard = session.lock().await;
                if guard.phase == TurnPhase::SpeakingTts {
                    guard.phase = TurnPhase::Listening;
                }
            }
            SpeakOutcome::Cancelled => {
                // The interruption handler owns the state from here
                tracing::info!(session_id = %sid, turn = turn_number, "synthesis cancelled");
            }
            SpeakOutcome::Failed(e) => {
                self.fail_turn(&session, batch, e).await;
                return;
            }
        }

        // 8. Commit this turn's writes as one unit
        self.commit_batch(&sid, batch).await;
    }

    /// Cache-first synthesis with chunked streaming to the client.
    async fn speak(
        self: &Arc<Self>,
        session: &Arc<Mutex<Session>>,
        sid: &str,
        text: &str,
        emotion: Emotion,
        speaker_id: &str,
        language: Language,
    ) -> SpeakOutcome {
        let outbound = session.lock().await.outbound.clone();
        if outbound
            .send(OutboundFrame::Control(ClientEvent::speech_start()))
            .await
            .is_err()
        {
            return SpeakOutcome::Failed(PipelineError::Session(
                "client channel closed".to_string(),
            ));
        }

        let _t = self.deps.monitor.scoped(PipelineStep::Synthesis, Some(sid));

        let (done_tx, done_rx) = oneshot::channel();
        let this = Arc::clone(self);
        let request = SynthesisRequest {
            text: text.to_string(),
            speaker_id: speaker_id.to_string(),
            language,
            session_id: sid.to_string(),
        };
        let key = self.deps.cache.key(
            text,
            language.code(),
            speaker_id,
            Some(emotion.as_str()),
            None,
        );
        let outbound_for_task = outbound.clone();
        let handle = tokio::spawn(async move {
            let result = this.stream_speech(key, request, outbound_for_task).await;
            let _ = done_tx.send(result);
        });
        session.lock().await.agent().synthesis_task = Some(handle);

        let outcome = done_rx.await;
        session.lock().await.agent().synthesis_task = None;

        match outcome {
            Err(_) => SpeakOutcome::Cancelled,
            Ok(Err(e)) => {
                // Close the bracket even on a failed stream
                let _ = outbound
                    .send(OutboundFrame::Control(ClientEvent::speech_end()))
                    .await;
                SpeakOutcome::Failed(e)
            }
            Ok(Ok(())) => {
                let _ = outbound
                    .send(OutboundFrame::Control(ClientEvent::speech_end()))
                    .await;
                SpeakOutcome::Completed
            }
        }
    }

    /// Stream one reply's audio: cached bytes if present, otherwise the
    /// synthesis backend, writing back to the cache without delaying the
    /// client-facing stream.
    async fn stream_speech(
        self: Arc<Self>,
        key: parlo_cache::CacheKey,
        request: SynthesisRequest,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Result<(), PipelineError> {
        // Cache first
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(8);
        let forwarder = {
            let outbound = outbound.clone();
            tokio::spawn(async move {
                while let Some(chunk) = rx.recv().await {
                    if outbound.send(OutboundFrame::Audio(chunk)).await.is_err() {
                        break;
                    }
                }
            })
        };
        let hit = self.deps.cache.stream(&key, tx).await?;
        let _ = forwarder.await;
        if hit {
            tracing::debug!(key = %key, "synthesis served from cache");
            return Ok(());
        }

        // Miss: stream from the backend while assembling for the cache
        let mut backend_rx = self.deps.tts.synthesize(request).await?;
        let mut assembled: Vec<u8> = Vec::new();
        while let Some(chunk) = backend_rx.recv().await {
            assembled.extend_from_slice(&chunk);
            if outbound.send(OutboundFrame::Audio(chunk)).await.is_err() {
                return Err(PipelineError::Session("client channel closed".to_string()));
            }
        }

        if !assembled.is_empty() {
            let cache = self.deps.cache.clone();
            tokio::spawn(async move {
                if let Err(e) = cache.set(&key, &assembled).await {
                    tracing::warn!(error = %e, "audio cache write failed");
                }
            });
        }
        Ok(())
    }

    /// Short non-persisted encouragement during a pause. Deliberately does
    /// not use the cancellable task slots, so an interruption during a
    /// gentle prompt is not guaranteed to stop it.
    async fn gentle_prompt(self: Arc<Self>, session: Arc<Mutex<Session>>) {
        let (sid, language, speaker_id, scenario_context) = {
            let mut guard = session.lock().await;
            if guard.phase != TurnPhase::Listening
                || !guard.active().speaking
                || guard.agent().synthesis_task.is_some()
            {
                return;
            }
            let scenario_context = scenario_context(&guard);
            let sid = guard.external_id.clone();
            let language = guard.language;
            let speaker_id = guard
                .agent()
                .voice_id
                .clone()
                .unwrap_or_else(|| "coach_fr".to_string());
            (sid, language, speaker_id, scenario_context)
        };

        tracing::debug!(session_id = %sid, "gentle prompt");

        let messages = build_gentle_prompt_messages(language, scenario_context.as_ref());
        let raw = match self
            .deps
            .llm
            .generate(GenerationRequest::new(messages))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(session_id = %sid, error = %e, "gentle prompt generation failed");
                return;
            }
        };
        let reply = parse_emotion(&raw);

        let outbound = session.lock().await.outbound.clone();
        let _ = outbound
            .send(OutboundFrame::Control(ClientEvent::speech_start()))
            .await;
        let key = self.deps.cache.key(
            &reply.text,
            language.code(),
            &speaker_id,
            Some(reply.emotion.as_str()),
            None,
        );
        let request = SynthesisRequest {
            text: reply.text.clone(),
            speaker_id,
            language,
            session_id: sid.clone(),
        };
        if let Err(e) = Arc::clone(&self).stream_speech(key, request, outbound.clone()).await {
            tracing::warn!(session_id = %sid, error = %e, "gentle prompt synthesis failed");
        }
        let _ = outbound
            .send(OutboundFrame::Control(ClientEvent::speech_end()))
            .await;
    }

    /// Interruption: idempotent, safe in any state.
    pub async fn interrupt(self: &Arc<Self>, session: &Arc<Mutex<Session>>) {
        let (sid, outbound, synth_handle, gen_handle, had_activity) = {
            let mut guard = session.lock().await;
            let sid = guard.external_id.clone();
            let outbound = guard.outbound.clone();

            let synth = guard.agent().synthesis_task.take();
            let generation = guard.agent().generation_task.take();
            let had_activity =
                synth.is_some() || generation.is_some() || guard.phase != TurnPhase::Listening;

            guard.active().interrupted = true;

            if had_activity {
                // Remember what we were talking about so the next
                // non-interrupted reply can resume naturally.
                let history = guard.active().history.clone();
                if let Some(topic) = ContinuityMemory::extract_topic(
                    &history,
                    continuity_constants::TOPIC_MAX_MESSAGES,
                ) {
                    let last_reply = history
                        .iter()
                        .rev()
                        .find(|m| m.role == MessageRole::Assistant)
                        .map(|m| m.content.clone())
                        .unwrap_or_default();
                    self.deps.continuity.save(&sid, topic, last_reply, 0.5);
                }
            }

            // The pending utterance buffer is kept: the user is assumed to
            // keep talking right through the interruption.
            guard.phase = TurnPhase::Listening;
            guard.gate.reset();
            guard.vad.reset();
            guard.gentle_prompt_fired = false;

            (sid, outbound, synth, generation, had_activity)
        };

        if let Some(handle) = synth_handle {
            // Prefer a cooperative stop; fall back to hard cancellation.
            let stop = tokio::time::timeout(
                Duration::from_millis(synthesis::STOP_TIMEOUT_MS),
                self.deps.tts.stop(&sid),
            )
            .await;
            match stop {
                Ok(Ok(())) => tracing::debug!(session_id = %sid, "synthesis stopped cooperatively"),
                Ok(Err(e)) => {
                    tracing::debug!(session_id = %sid, error = %e, "synthesis stop request failed")
                }
                Err(_) => tracing::debug!(session_id = %sid, "synthesis stop timed out"),
            }
            handle.abort();
            // Close the speech bracket the aborted task can no longer send
            let _ = outbound
                .send(OutboundFrame::Control(ClientEvent::speech_end()))
                .await;
        }

        if let Some(handle) = gen_handle {
            handle.abort();
        }

        if had_activity {
            tracing::info!(session_id = %sid, "interruption handled");
        }
    }

    /// Tear the session down: cancel tasks, drop it from the live map and
    /// mark the persistent record.
    pub async fn end_session(self: &Arc<Self>, external_id: &str, status: SessionStatus) {
        let Some(session) = self.sessions.remove(external_id) else {
            return;
        };

        let store_id = {
            let mut guard = session.lock().await;
            guard.agent().abort_generation();
            guard.agent().abort_synthesis();
            guard.store_id
        };

        {
            let _t = self
                .deps
                .monitor
                .scoped(PipelineStep::StoreWrite, Some(external_id));
            if let Err(e) = self.deps.store.mark_ended(store_id, status).await {
                tracing::warn!(session_id = %external_id, error = %e, "failed to mark session ended");
            }
        }

        self.deps.continuity.clear(external_id);
        self.deps.monitor.forget_session(external_id);
        tracing::info!(session_id = %external_id, ?status, "session ended");
    }

    /// Background reaper for idle sessions. Returns a shutdown sender.
    pub fn spawn_cleanup(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.sessions.cleanup_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for id in this.sessions.expired_ids().await {
                            tracing::info!(session_id = %id, "reaping idle session");
                            this.end_session(&id, SessionStatus::Disconnected).await;
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    async fn commit_batch(&self, sid: &str, batch: TurnBatch) {
        let _t = self.deps.monitor.scoped(PipelineStep::StoreWrite, Some(sid));
        if let Err(e) = batch.commit().await {
            tracing::error!(session_id = %sid, error = %e, "turn commit failed");
        }
    }

    /// Abort the turn: roll back its writes, notify the client once, return
    /// to listening. The session itself stays alive and usable.
    async fn fail_turn(&self, session: &Arc<Mutex<Session>>, batch: TurnBatch, error: PipelineError) {
        batch.rollback();

        let mut guard = session.lock().await;
        tracing::error!(
            session_id = %guard.external_id,
            error = %error,
            "turn failed, returning to listening"
        );
        guard.phase = TurnPhase::Listening;
        let outbound = guard.outbound.clone();
        drop(guard);

        let _ = outbound
            .send(OutboundFrame::Control(ClientEvent::error(
                GENERIC_ERROR_MESSAGE,
            )))
            .await;
    }
}

/// Scenario context for the current state, if a scenario is attached.
fn scenario_context(session: &Session) -> Option<ScenarioContext> {
    match (&session.scenario, &session.scenario_state) {
        (Some(scenario), Some(state)) => scenario.context(state),
        _ => None,
    }
}

/// Rough classification of what kind of utterance interrupted the reply.
fn interruption_kind(transcript: &str) -> InterruptionKind {
    let trimmed = transcript.trim();
    if trimmed.ends_with('?') {
        InterruptionKind::Question
    } else if trimmed.split_whitespace().count() < 6 {
        InterruptionKind::Comment
    } else {
        InterruptionKind::General
    }
}
