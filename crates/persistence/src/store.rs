//! Store contract

use async_trait::async_trait;
use uuid::Uuid;

use parlo_core::Emotion;

use crate::records::{SessionRecord, SessionStatus, TurnRecord};
use crate::PersistenceError;

/// The persistent operations the orchestration core relies on.
///
/// Exact schema and transport belong to the backing store; this trait is
/// the whole contract.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, record: SessionRecord) -> Result<(), PersistenceError>;

    async fn find_session(
        &self,
        external_id: &str,
    ) -> Result<Option<SessionRecord>, PersistenceError>;

    async fn append_turn(&self, turn: TurnRecord) -> Result<(), PersistenceError>;

    /// Attach the transcript produced after the turn record was created.
    async fn attach_transcript(&self, turn_id: Uuid, text: &str) -> Result<(), PersistenceError>;

    /// Attach the emotion label produced after the turn record was created.
    async fn attach_emotion(
        &self,
        turn_id: Uuid,
        emotion: Emotion,
    ) -> Result<(), PersistenceError>;

    async fn update_scenario_state(
        &self,
        session_id: Uuid,
        blob: &str,
    ) -> Result<(), PersistenceError>;

    async fn mark_ended(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<(), PersistenceError>;
}
