//! In-memory session store

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use parlo_core::Emotion;

use crate::records::{SessionRecord, SessionStatus, TurnRecord};
use crate::store::SessionStore;
use crate::PersistenceError;

/// HashMap-backed store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<Uuid, SessionRecord>>,
    turns: RwLock<Vec<TurnRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: every turn appended for a session, in append order.
    pub fn turns_for_session(&self, session_id: Uuid) -> Vec<TurnRecord> {
        self.turns
            .read()
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_session(&self, record: SessionRecord) -> Result<(), PersistenceError> {
        self.sessions.write().insert(record.id, record);
        Ok(())
    }

    async fn find_session(
        &self,
        external_id: &str,
    ) -> Result<Option<SessionRecord>, PersistenceError> {
        Ok(self
            .sessions
            .read()
            .values()
            .find(|s| s.external_id == external_id)
            .cloned())
    }

    async fn append_turn(&self, turn: TurnRecord) -> Result<(), PersistenceError> {
        if !self.sessions.read().contains_key(&turn.session_id) {
            return Err(PersistenceError::SessionNotFound(
                turn.session_id.to_string(),
            ));
        }
        self.turns.write().push(turn);
        Ok(())
    }

    async fn attach_transcript(&self, turn_id: Uuid, text: &str) -> Result<(), PersistenceError> {
        let mut turns = self.turns.write();
        let turn = turns
            .iter_mut()
            .find(|t| t.id == turn_id)
            .ok_or(PersistenceError::TurnNotFound(turn_id))?;
        turn.text = Some(text.to_string());
        Ok(())
    }

    async fn attach_emotion(
        &self,
        turn_id: Uuid,
        emotion: Emotion,
    ) -> Result<(), PersistenceError> {
        let mut turns = self.turns.write();
        let turn = turns
            .iter_mut()
            .find(|t| t.id == turn_id)
            .ok_or(PersistenceError::TurnNotFound(turn_id))?;
        turn.emotion = Some(emotion);
        Ok(())
    }

    async fn update_scenario_state(
        &self,
        session_id: Uuid,
        blob: &str,
    ) -> Result<(), PersistenceError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| PersistenceError::SessionNotFound(session_id.to_string()))?;
        session.scenario_state = Some(blob.to_string());
        Ok(())
    }

    async fn mark_ended(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<(), PersistenceError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| PersistenceError::SessionNotFound(session_id.to_string()))?;
        session.status = status;
        session.ended_at = Some(chrono::Utc::now());
        Ok(())
    }
}
