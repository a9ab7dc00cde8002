//! Turn orchestration
//!
//! The heart of the engine: consumes incoming audio chunks, runs
//! voice-activity gating, decides speech/silence transitions, and on
//! end-of-speech drives the transcribe→generate→speak pipeline with
//! cancellation on interruption. The scenario machine and continuity
//! memory are consulted around the generation step, the audio cache around
//! the synthesis step, and every stage is timed by the latency monitor.

mod orchestrator;
mod participant;
mod session;
mod vad;

pub use orchestrator::{OrchestratorDeps, SessionOptions, TurnOrchestrator};
pub use participant::{Participant, ParticipantRole};
pub use session::{Session, SessionManager, TurnPhase};
pub use vad::{EnergyVad, GateUpdate, SpeechGate, SpeechGateConfig};

use parlo_core::BackendError;

/// Pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("persistence error: {0}")]
    Persistence(#[from] parlo_persistence::PersistenceError),

    #[error("cache error: {0}")]
    Cache(#[from] parlo_cache::CacheError),

    #[error("session error: {0}")]
    Session(String),
}
