//! Client-facing control frames
//!
//! The client channel carries binary frames (raw PCM both directions) and
//! JSON control frames. The engine only ever emits the control messages
//! below; everything else on the wire belongs to the transport layer.

use serde::{Deserialize, Serialize};

/// Outbound JSON control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Brackets every streamed reply: `ia_speech_start` before the first
    /// audio chunk, `ia_speech_end` after the last.
    AudioControl { event: SpeechMarker },
    /// Generic recoverable-failure notification. The session stays usable.
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechMarker {
    IaSpeechStart,
    IaSpeechEnd,
}

impl ClientEvent {
    pub fn speech_start() -> Self {
        ClientEvent::AudioControl {
            event: SpeechMarker::IaSpeechStart,
        }
    }

    pub fn speech_end() -> Self {
        ClientEvent::AudioControl {
            event: SpeechMarker::IaSpeechEnd,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ClientEvent::Error {
            message: message.into(),
        }
    }
}

/// One frame on the outbound half of the client channel.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// Raw audio chunk (16-bit LE PCM)
    Audio(Vec<u8>),
    /// JSON control message
    Control(ClientEvent),
}
