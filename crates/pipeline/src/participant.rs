//! Conversation participants

use std::time::Instant;
use tokio::task::JoinHandle;

use parlo_core::ChatMessage;

/// A party in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantRole {
    User,
    Agent,
}

/// Per-participant state.
///
/// The generation/synthesis handles are non-null only while that stage is
/// in flight, and only one of the two is ever held past the hand-off from
/// generation to synthesis.
pub struct Participant {
    pub id: String,
    pub role: ParticipantRole,
    pub display_name: String,
    /// Primary participant for its role; extra participants are allowed
    /// for multi-agent sessions but only one primary per role.
    pub primary: bool,
    pub agent_profile: Option<String>,
    pub voice_id: Option<String>,
    pub system_prompt: Option<String>,
    /// Private conversation history (user and assistant messages)
    pub history: Vec<ChatMessage>,
    /// Mid-utterance flag: set at confirmed speech start, cleared when the
    /// turn finalizes
    pub speaking: bool,
    /// Pending utterance accumulation buffer
    pub utterance: Vec<f32>,
    pub speech_start: Option<Instant>,
    pub silence_start: Option<Instant>,
    pub last_activity: Instant,
    /// Advisory: the participant interrupted the last reply. Prompt
    /// building reads this; cancellation never does.
    pub interrupted: bool,
    /// In-flight generation sub-task
    pub generation_task: Option<JoinHandle<()>>,
    /// In-flight synthesis sub-task
    pub synthesis_task: Option<JoinHandle<()>>,
}

impl Participant {
    pub fn user(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, ParticipantRole::User, display_name)
    }

    pub fn agent(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, ParticipantRole::Agent, display_name)
    }

    fn new(id: impl Into<String>, role: ParticipantRole, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            display_name: display_name.into(),
            primary: true,
            agent_profile: None,
            voice_id: None,
            system_prompt: None,
            history: Vec::new(),
            speaking: false,
            utterance: Vec::new(),
            speech_start: None,
            silence_start: None,
            last_activity: Instant::now(),
            interrupted: false,
            generation_task: None,
            synthesis_task: None,
        }
    }

    /// Take the accumulated utterance, leaving an empty buffer.
    pub fn drain_utterance(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.utterance)
    }

    /// Abort the in-flight generation, if any. Idempotent.
    pub fn abort_generation(&mut self) {
        if let Some(handle) = self.generation_task.take() {
            handle.abort();
        }
    }

    /// Abort the in-flight synthesis, if any. Idempotent.
    pub fn abort_synthesis(&mut self) {
        if let Some(handle) = self.synthesis_task.take() {
            handle.abort();
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_utterance() {
        let mut p = Participant::user("u1", "Participant");
        p.utterance = vec![0.1, 0.2];
        let drained = p.drain_utterance();
        assert_eq!(drained.len(), 2);
        assert!(p.utterance.is_empty());
    }

    #[test]
    fn test_abort_without_task_is_noop() {
        let mut p = Participant::agent("a1", "Coach");
        p.abort_generation();
        p.abort_synthesis();
        assert!(p.generation_task.is_none());
    }
}
