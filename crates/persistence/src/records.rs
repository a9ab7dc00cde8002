//! Persisted record shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parlo_core::{audio::AudioRef, Emotion, Language, MessageRole};

/// Lifecycle status of a persisted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
    Disconnected,
}

/// One conversation, as the store sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Internal store id
    pub id: Uuid,
    /// Client-facing session id
    pub external_id: String,
    pub language: Language,
    pub goal: Option<String>,
    pub scenario_id: Option<String>,
    /// Serialized `ScenarioState`, round-tripped after every update
    pub scenario_state: Option<String>,
    pub multi_agent: bool,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(external_id: impl Into<String>, language: Language) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            language,
            goal: None,
            scenario_id: None,
            scenario_state: None,
            multi_agent: false,
            status: SessionStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// One user-utterance/agent-reply half, numbered within its session.
///
/// Never mutated once written, except to attach the transcript or emotion
/// label produced slightly after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub turn_number: u64,
    pub role: MessageRole,
    pub text: Option<String>,
    pub emotion: Option<Emotion>,
    pub audio_ref: Option<AudioRef>,
    pub created_at: DateTime<Utc>,
}

impl TurnRecord {
    pub fn user(session_id: Uuid, turn_number: u64, audio_ref: AudioRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            turn_number,
            role: MessageRole::User,
            text: None,
            emotion: None,
            audio_ref: Some(audio_ref),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(
        session_id: Uuid,
        turn_number: u64,
        text: impl Into<String>,
        emotion: Emotion,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            turn_number,
            role: MessageRole::Assistant,
            text: Some(text.into()),
            emotion: Some(emotion),
            audio_ref: None,
            created_at: Utc::now(),
        }
    }
}
