//! Shared backend error type

/// Errors surfaced by the external backend clients.
///
/// Cancellation is separated from failure so the orchestrator can treat an
/// interruption-triggered abort as control flow rather than an error.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend request failed: {0}")]
    Request(String),

    #[error("backend returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("backend request timed out after {0} ms")]
    Timeout(u64),

    #[error("operation cancelled")]
    Cancelled,
}

impl BackendError {
    /// True when the failure is transient and a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Unreachable(_) | BackendError::Timeout(_)
        )
    }
}
