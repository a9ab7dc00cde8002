//! Backend traits
//!
//! Every external collaborator the orchestrator talks to sits behind one of
//! these traits so the pipeline can be exercised with mocks and backends can
//! be swapped without touching orchestration code.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::conversation::{ChatMessage, TranscriptResult};
use crate::error::BackendError;
use crate::language::Language;

/// Speech-to-text backend.
///
/// Input is linear PCM, 16 kHz mono. Empty or near-silent input is
/// short-circuited by the caller and never reaches an implementation.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        samples: &[f32],
        language: Language,
    ) -> Result<TranscriptResult, BackendError>;
}

/// Request for the generation backend.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: 256,
            temperature: 0.7,
        }
    }
}

/// Language-generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a reply. Returns the raw text, directive tags included;
    /// parsing them out is the dialog layer's job.
    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError>;
}

/// Request for the synthesis backend.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub speaker_id: String,
    pub language: Language,
    /// Session the synthesis belongs to, for cooperative stop requests.
    pub session_id: String,
}

/// Speech-synthesis backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Start synthesis and return a stream of audio byte chunks
    /// (16-bit LE PCM). The channel closes when synthesis completes.
    async fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<mpsc::Receiver<Vec<u8>>, BackendError>;

    /// Ask the backend to stop an in-flight synthesis for a session.
    /// Best-effort; callers fall back to hard task cancellation.
    async fn stop(&self, session_id: &str) -> Result<(), BackendError>;
}

/// Pronunciation-analysis background job.
///
/// Scheduling failures are logged and never surfaced to the conversational
/// flow; the orchestrator fires this and forgets it.
#[async_trait]
pub trait PronunciationAnalyzer: Send + Sync {
    async fn schedule(
        &self,
        turn_id: Uuid,
        audio: &[f32],
        transcript: &str,
    ) -> Result<(), BackendError>;
}

/// Voice-activity detection over fixed-size analysis windows.
///
/// Implementations keep whatever internal state they need between windows;
/// `reset` clears it at turn boundaries.
pub trait VoiceActivityDetector: Send {
    /// Speech probability in [0.0, 1.0] for one analysis window.
    fn speech_probability(&mut self, window: &[f32]) -> f32;

    /// Clear internal state for the next turn.
    fn reset(&mut self);
}
