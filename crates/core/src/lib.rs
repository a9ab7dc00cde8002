//! Core traits and types for the parlo coaching engine
//!
//! This crate provides foundational types used across all other crates:
//! - Audio chunk types and PCM conversion
//! - Language and emotion vocabularies
//! - Conversation types (messages, transcripts)
//! - Backend traits (transcription, generation, synthesis, analysis)
//! - Client control frames
//! - Shared backend error type

pub mod audio;
pub mod control;
pub mod conversation;
pub mod emotion;
pub mod error;
pub mod language;
pub mod traits;

pub use audio::AudioChunk;
pub use control::{ClientEvent, OutboundFrame};
pub use conversation::{ChatMessage, MessageRole, TranscriptResult, TranscriptSegment};
pub use emotion::Emotion;
pub use error::BackendError;
pub use language::Language;
pub use traits::{
    GenerationRequest, LanguageModel, PronunciationAnalyzer, SpeechSynthesizer, SpeechToText,
    SynthesisRequest, VoiceActivityDetector,
};
