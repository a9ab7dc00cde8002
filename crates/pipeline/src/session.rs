//! Session model and the in-memory session map

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use parlo_core::{Language, OutboundFrame, VoiceActivityDetector};
use parlo_scenario::{Scenario, ScenarioState};

use crate::participant::Participant;
use crate::vad::{SpeechGate, SpeechGateConfig};
use crate::PipelineError;

/// Turn-taking state of a session.
///
/// `Waiting` is the conceptual post-speech cooldown; the implementation
/// folds it straight back into `Listening`, so a live session is never
/// observed in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Listening,
    ProcessingAsr,
    ProcessingLlm,
    SpeakingTts,
    Waiting,
}

/// One live conversation.
///
/// Exclusively owned by its session task; every field is mutated through
/// the orchestrator while the session's lock is held, with the interruption
/// signal communicating through task-handle cancellation rather than shared
/// flags.
pub struct Session {
    pub external_id: String,
    /// Persistent-store id
    pub store_id: Uuid,
    pub language: Language,
    pub goal: Option<String>,
    pub scenario: Option<Arc<Scenario>>,
    pub scenario_state: Option<ScenarioState>,
    pub multi_agent: bool,
    pub participants: HashMap<String, Participant>,
    /// The participant currently driving the conversation (the human)
    pub active_participant: String,
    /// Primary agent participant
    pub agent_participant: String,
    pub phase: TurnPhase,
    pub turn_counter: u64,
    pub last_activity: Instant,
    /// A gentle prompt already fired for the current silence span
    pub gentle_prompt_fired: bool,
    pub gate: SpeechGate,
    pub vad: Box<dyn VoiceActivityDetector>,
    /// Outbound half of the client channel
    pub outbound: mpsc::Sender<OutboundFrame>,
    pub chunk_sequence: u64,
}

impl Session {
    pub fn active(&mut self) -> &mut Participant {
        self.participants
            .get_mut(&self.active_participant)
            .expect("active participant always exists")
    }

    pub fn agent(&mut self) -> &mut Participant {
        self.participants
            .get_mut(&self.agent_participant)
            .expect("agent participant always exists")
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }
}

/// Options for creating a session.
pub struct NewSession {
    pub external_id: String,
    pub store_id: Uuid,
    pub language: Language,
    pub goal: Option<String>,
    pub scenario: Option<Arc<Scenario>>,
    pub scenario_state: Option<ScenarioState>,
    pub vad: Box<dyn VoiceActivityDetector>,
    pub gate_config: SpeechGateConfig,
    pub outbound: mpsc::Sender<OutboundFrame>,
}

/// In-memory map of live sessions.
///
/// Sessions never share mutable state, so the map itself is the only
/// cross-session structure.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    max_sessions: usize,
    timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize, timeout: Duration, cleanup_interval: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
            timeout,
            cleanup_interval,
        }
    }

    /// Insert a freshly built session with default participants.
    pub fn insert(&self, new: NewSession) -> Result<Arc<Mutex<Session>>, PipelineError> {
        if self.sessions.len() >= self.max_sessions {
            return Err(PipelineError::Session("max sessions reached".to_string()));
        }

        let mut participants = HashMap::new();
        let user = Participant::user("user", "Participant");
        let agent = Participant::agent("coach", "Coach");

        let active_participant = user.id.clone();
        let agent_participant = agent.id.clone();
        participants.insert(user.id.clone(), user);
        participants.insert(agent.id.clone(), agent);

        let session = Arc::new(Mutex::new(Session {
            external_id: new.external_id.clone(),
            store_id: new.store_id,
            language: new.language,
            goal: new.goal,
            scenario: new.scenario,
            scenario_state: new.scenario_state,
            multi_agent: false,
            participants,
            active_participant,
            agent_participant,
            phase: TurnPhase::Listening,
            turn_counter: 0,
            last_activity: Instant::now(),
            gentle_prompt_fired: false,
            gate: SpeechGate::new(new.gate_config),
            vad: new.vad,
            outbound: new.outbound,
            chunk_sequence: 0,
        }));

        self.sessions.insert(new.external_id, session.clone());
        Ok(session)
    }

    pub fn get(&self, external_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(external_id).map(|s| s.clone())
    }

    pub fn remove(&self, external_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.remove(external_id).map(|(_, s)| s)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Ids of sessions idle past the timeout.
    pub async fn expired_ids(&self) -> Vec<String> {
        // Snapshot first so no shard lock is held across an await
        let snapshot: Vec<(String, Arc<Mutex<Session>>)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut expired = Vec::new();
        for (id, session) in snapshot {
            if session.lock().await.is_expired(self.timeout) {
                expired.push(id);
            }
        }
        expired
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }
}
