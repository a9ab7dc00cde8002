//! Centralized tunable constants
//!
//! Every timing heuristic and threshold the orchestrator uses lives here so
//! the defaults are greppable in one place. `Settings` exposes the subset
//! that is deployment-tunable; the rest are engine invariants.

/// Voice-activity detection
pub mod vad {
    /// Speech probability at or above which a window counts as speech
    pub const PROBABILITY_THRESHOLD: f32 = 0.40;
    /// Fixed analysis window size in samples (32 ms at 16 kHz)
    pub const WINDOW_SAMPLES: usize = 512;
    /// Consecutive speech windows required to confirm a speech edge
    pub const SPEECH_CONFIRM_FRAMES: u32 = 2;
    /// Consecutive silence windows required to confirm a silence edge
    pub const SILENCE_CONFIRM_FRAMES: u32 = 3;
    /// Padding kept around detected speech when trimming buffers
    pub const SPEECH_PAD_MS: u64 = 400;
}

/// Turn taking
pub mod turn {
    /// Silence duration that finalizes a user turn
    pub const END_OF_SPEECH_MS: u64 = 1_800;
    /// Silence duration that triggers a gentle prompt
    /// (must stay strictly below END_OF_SPEECH_MS)
    pub const GENTLE_PROMPT_MS: u64 = 1_200;
    /// Cooldown after the agent finishes speaking
    pub const POST_SPEECH_WAIT_MS: u64 = 600;
    /// Conversation history window passed to generation
    pub const HISTORY_WINDOW: usize = 6;
    /// RMS energy below which an utterance is treated as near-silent and
    /// never sent to the transcription backend
    pub const NEAR_SILENT_RMS: f32 = 0.004;
}

/// Latency alert thresholds, milliseconds
pub mod latency {
    pub const VOICE_ACTIVITY_MS: u64 = 50;
    pub const TRANSCRIPTION_MS: u64 = 2_000;
    pub const GENERATION_MS: u64 = 3_000;
    pub const SYNTHESIS_MS: u64 = 1_000;
    pub const WHOLE_TURN_MS: u64 = 5_000;
    pub const AUDIO_PERSIST_MS: u64 = 200;
    pub const STORE_WRITE_MS: u64 = 100;
    pub const ANALYSIS_SCHEDULE_MS: u64 = 100;
    /// Rolling window cap per step (global and per session)
    pub const WINDOW_CAP: usize = 1_000;
    /// Sessions included in a stats export
    pub const EXPORT_SESSION_CAP: usize = 50;
}

/// Synthesized-audio cache
pub mod cache {
    /// Key prefix for all cache entries
    pub const NAMESPACE: &str = "parlo:tts";
    /// Entry time-to-live in seconds
    pub const TTL_SECS: u64 = 86_400;
    /// Payloads above this size are compressed before storage
    pub const COMPRESS_THRESHOLD_BYTES: usize = 1_024;
    /// Chunk size used when streaming a cached clip to a sink
    pub const STREAM_CHUNK_BYTES: usize = 32 * 1_024;
    /// Texts at or below this length are embedded literally in the key
    pub const KEY_TEXT_EMBED_MAX: usize = 48;
}

/// Conversation-continuity memory
pub mod continuity {
    /// Entry time-to-live in seconds
    pub const TTL_SECS: u64 = 1_800;
    /// History messages examined when deriving a topic
    pub const TOPIC_MAX_MESSAGES: usize = 6;
    /// Interruption count past which resumption phrasing escalates
    pub const ESCALATION_COUNT: u32 = 2;
}

/// Synthesis cancellation
pub mod synthesis {
    /// How long to wait for a cooperative stop before hard-aborting
    pub const STOP_TIMEOUT_MS: u64 = 200;
}

/// Session lifecycle
pub mod session {
    /// Inactivity after which a session is reaped
    pub const TIMEOUT_SECS: u64 = 1_800;
    /// Reaper interval
    pub const CLEANUP_INTERVAL_SECS: u64 = 300;
    /// Hard cap on concurrent sessions
    pub const MAX_SESSIONS: usize = 500;
}
