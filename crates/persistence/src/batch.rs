//! Per-turn write batching
//!
//! The turn pipeline stages its store writes here and flushes them in one
//! `commit` at the end of the turn. Dropping the batch without committing
//! discards everything, which is how a failed or interrupted turn rolls
//! back: nothing partial ever reaches the store.

use std::sync::Arc;
use uuid::Uuid;

use parlo_core::Emotion;

use crate::records::TurnRecord;
use crate::store::SessionStore;
use crate::PersistenceError;

enum StagedOp {
    AppendTurn(TurnRecord),
    AttachTranscript { turn_id: Uuid, text: String },
    AttachEmotion { turn_id: Uuid, emotion: Emotion },
    UpdateScenarioState { session_id: Uuid, blob: String },
}

/// Staged writes for one turn.
pub struct TurnBatch {
    store: Arc<dyn SessionStore>,
    session_id: Uuid,
    ops: Vec<StagedOp>,
}

impl TurnBatch {
    pub fn new(store: Arc<dyn SessionStore>, session_id: Uuid) -> Self {
        Self {
            store,
            session_id,
            ops: Vec::new(),
        }
    }

    pub fn append_turn(&mut self, turn: TurnRecord) {
        self.ops.push(StagedOp::AppendTurn(turn));
    }

    pub fn attach_transcript(&mut self, turn_id: Uuid, text: impl Into<String>) {
        self.ops.push(StagedOp::AttachTranscript {
            turn_id,
            text: text.into(),
        });
    }

    pub fn attach_emotion(&mut self, turn_id: Uuid, emotion: Emotion) {
        self.ops.push(StagedOp::AttachEmotion { turn_id, emotion });
    }

    pub fn update_scenario_state(&mut self, blob: impl Into<String>) {
        self.ops.push(StagedOp::UpdateScenarioState {
            session_id: self.session_id,
            blob: blob.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Flush every staged write, in order.
    pub async fn commit(self) -> Result<(), PersistenceError> {
        for op in self.ops {
            match op {
                StagedOp::AppendTurn(turn) => self.store.append_turn(turn).await?,
                StagedOp::AttachTranscript { turn_id, text } => {
                    self.store.attach_transcript(turn_id, &text).await?
                }
                StagedOp::AttachEmotion { turn_id, emotion } => {
                    self.store.attach_emotion(turn_id, emotion).await?
                }
                StagedOp::UpdateScenarioState { session_id, blob } => {
                    self.store.update_scenario_state(session_id, &blob).await?
                }
            }
        }
        Ok(())
    }

    /// Discard the staged writes.
    pub fn rollback(self) {
        if !self.ops.is_empty() {
            tracing::info!(
                session_id = %self.session_id,
                staged_ops = self.ops.len(),
                "rolling back turn writes"
            );
        }
    }
}
