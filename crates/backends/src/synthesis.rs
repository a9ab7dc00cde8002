//! Synthesis backend client
//!
//! Streams the backend's audio bytes into a channel chunk-by-chunk so the
//! caller can forward them to the client (and into the cache) as they
//! arrive. The `stop` variant asks the backend to cease an in-flight
//! synthesis for a session; callers treat it as best-effort.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

use parlo_core::{BackendError, SpeechSynthesizer, SynthesisRequest};

use crate::map_reqwest;

#[derive(Serialize)]
struct SynthesizePayload<'a> {
    text: &'a str,
    speaker: &'a str,
    language: &'a str,
    session_id: &'a str,
}

#[derive(Serialize)]
struct StopPayload<'a> {
    session_id: &'a str,
}

/// HTTP speech-synthesis client.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpSynthesizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        // Connect timeout only: the body is an open-ended stream.
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<mpsc::Receiver<Vec<u8>>, BackendError> {
        let payload = SynthesizePayload {
            text: &request.text,
            speaker: &request.speaker_id,
            language: request.language.code(),
            session_id: &request.session_id,
        };

        let response = self
            .client
            .post(format!("{}/v1/synthesize", self.endpoint))
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.timeout.as_millis() as u64))?
            .error_for_status()
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let (tx, rx) = mpsc::channel(32);
        let session_id = request.session_id.clone();

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        if tx.send(bytes.to_vec()).await.is_err() {
                            // Receiver gone: synthesis was cancelled downstream
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            session_id = %session_id,
                            error = %e,
                            "synthesis stream ended with error"
                        );
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn stop(&self, session_id: &str) -> Result<(), BackendError> {
        self.client
            .post(format!("{}/v1/synthesize/stop", self.endpoint))
            .json(&StopPayload { session_id })
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.timeout.as_millis() as u64))?
            .error_for_status()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(())
    }
}
