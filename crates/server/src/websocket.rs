//! WebSocket handler
//!
//! Binary frames carry 16-bit LE PCM audio in both directions. JSON text
//! frames carry control messages: the engine's outbound events, and the
//! client's interrupt/end signals.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use parlo_core::{AudioChunk, OutboundFrame};
use parlo_persistence::SessionStatus;
use parlo_pipeline::SessionOptions;

use crate::state::AppState;

/// Inbound JSON control messages.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundMessage {
    /// The user interrupted the agent mid-reply
    Interrupt,
    /// Explicit end of the conversation
    EndSession,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Scenario id to attach, from the loaded template library
    scenario: Option<String>,
}

/// Handle a WebSocket upgrade for one session.
pub async fn handle(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, query))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String, query: WsQuery) {
    let (mut sender, mut receiver) = socket.split();

    let scenario = query
        .scenario
        .as_deref()
        .and_then(|id| state.scenarios.get(id).cloned());
    if query.scenario.is_some() && scenario.is_none() {
        tracing::warn!(session_id = %session_id, "requested scenario not found, continuing without");
    }

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(256);
    let options = SessionOptions {
        scenario,
        ..Default::default()
    };

    let session = match state
        .orchestrator
        .start_session(&session_id, options, outbound_tx)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "failed to start session");
            let _ = sender.close().await;
            return;
        }
    };

    // Outbound half: engine frames → wire
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let message = match frame {
                OutboundFrame::Audio(bytes) => Message::Binary(bytes),
                OutboundFrame::Control(event) => match serde_json::to_string(&event) {
                    Ok(json) => Message::Text(json),
                    Err(_) => continue,
                },
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Inbound half: wire → orchestrator
    let mut chunk_sequence: u64 = 0;
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Binary(bytes)) => {
                chunk_sequence += 1;
                let chunk = AudioChunk::from_pcm16(&bytes, chunk_sequence);
                state
                    .orchestrator
                    .process_chunk(&session, chunk.samples)
                    .await;
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<InboundMessage>(&text) {
                Ok(InboundMessage::Interrupt) => {
                    state.orchestrator.interrupt(&session).await;
                }
                Ok(InboundMessage::EndSession) => {
                    state
                        .orchestrator
                        .end_session(&session_id, SessionStatus::Ended)
                        .await;
                    break;
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "ignoring unknown control message");
                }
            },
            Ok(Message::Close(_)) | Err(_) => {
                state
                    .orchestrator
                    .end_session(&session_id, SessionStatus::Disconnected)
                    .await;
                break;
            }
            Ok(_) => {}
        }
    }

    send_task.abort();
    tracing::info!(session_id = %session_id, "websocket closed");
}
