//! Persistence layer for parlo
//!
//! Defines the store contracts the orchestrator needs (create/find session,
//! append turn, update scenario blob, mark ended) plus the per-turn write
//! batch that gives each turn a single commit/rollback unit. The in-memory
//! store backs tests and single-process runs; database-backed stores are
//! external collaborators behind the same trait.

mod audio_store;
mod batch;
mod memory;
mod records;
mod store;

pub use audio_store::{AudioStore, WavAudioStore};
pub use batch::TurnBatch;
pub use memory::InMemoryStore;
pub use records::{SessionRecord, SessionStatus, TurnRecord};
pub use store::SessionStore;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("turn not found: {0}")]
    TurnNotFound(uuid::Uuid),

    #[error("audio storage failed: {0}")]
    Audio(String),

    #[error("store operation failed: {0}")]
    Store(String),
}
