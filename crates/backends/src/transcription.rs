//! Transcription backend client

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use parlo_core::{
    BackendError, Language, SpeechToText, TranscriptResult, TranscriptSegment,
};

use crate::map_reqwest;

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    /// Base64-encoded 16-bit LE PCM, 16 kHz mono
    audio: String,
    language: &'a str,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<SegmentPayload>,
}

#[derive(Deserialize)]
struct SegmentPayload {
    text: String,
    start_ms: u64,
    end_ms: u64,
}

/// HTTP speech-to-text client.
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTranscriber {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
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
impl SpeechToText for HttpTranscriber {
    async fn transcribe(
        &self,
        samples: &[f32],
        language: Language,
    ) -> Result<TranscriptResult, BackendError> {
        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            pcm.extend_from_slice(&((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes());
        }

        let request = TranscribeRequest {
            audio: BASE64.encode(&pcm),
            language: language.code(),
        };

        let response = self
            .client
            .post(format!("{}/v1/transcribe", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.timeout.as_millis() as u64))?
            .error_for_status()
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let payload: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        Ok(TranscriptResult {
            text: payload.text,
            detected_language: payload
                .language
                .as_deref()
                .map(Language::from_code)
                .unwrap_or(language),
            segments: payload
                .segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    text: s.text,
                    start_ms: s.start_ms,
                    end_ms: s.end_ms,
                })
                .collect(),
        })
    }
}
