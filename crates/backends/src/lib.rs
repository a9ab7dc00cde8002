//! HTTP backend clients
//!
//! Reqwest-based implementations of the core backend traits. Each client
//! owns its endpoint and timeout; none of them owns orchestration policy —
//! retries here cover transport-level transients only, cancellation and
//! turn-level error handling live in the pipeline.

mod analysis;
mod generation;
mod synthesis;
mod transcription;

pub use analysis::HttpAnalysisScheduler;
pub use generation::{GeneratorConfig, HttpGenerator};
pub use synthesis::HttpSynthesizer;
pub use transcription::HttpTranscriber;

use parlo_core::BackendError;

/// Map a transport error onto the shared backend error type.
pub(crate) fn map_reqwest(e: reqwest::Error, timeout_ms: u64) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(timeout_ms)
    } else if e.is_connect() {
        BackendError::Unreachable(e.to_string())
    } else {
        BackendError::Request(e.to_string())
    }
}
