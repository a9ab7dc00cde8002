//! WebSocket and HTTP surface
//!
//! Deliberately thin: the protocol layer decodes frames and forwards them
//! to the orchestrator; every orchestration decision lives in
//! `parlo-pipeline`.

pub mod http;
pub mod state;
pub mod websocket;

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("session error: {0}")]
    Session(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
