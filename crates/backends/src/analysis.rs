//! Pronunciation-analysis scheduling client
//!
//! Fires analysis jobs at the background service. An optional KV fast-path
//! skips scheduling when an identical utterance+transcript was already
//! analyzed. Failures are the caller's to log and swallow; they must never
//! reach the conversational flow.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use parlo_cache::KvStore;
use parlo_core::{BackendError, PronunciationAnalyzer};

use crate::map_reqwest;

const SCHEDULED_MARKER_PREFIX: &str = "parlo:analysis";
const SCHEDULED_MARKER_TTL_SECS: u64 = 3_600;

#[derive(Serialize)]
struct AnalysisPayload<'a> {
    turn_id: Uuid,
    audio: String,
    transcript: &'a str,
}

/// HTTP analysis-job scheduler.
pub struct HttpAnalysisScheduler {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    /// Optional dedup fast-path
    kv: Option<Arc<dyn KvStore>>,
}

impl HttpAnalysisScheduler {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
            kv: None,
        })
    }

    /// Enable the already-scheduled fast-path backed by a KV store.
    pub fn with_kv(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    fn dedup_key(audio: &[f32], transcript: &str) -> String {
        let mut hasher = Sha256::new();
        for s in audio {
            hasher.update(s.to_le_bytes());
        }
        hasher.update(transcript.as_bytes());
        format!("{}:{:x}", SCHEDULED_MARKER_PREFIX, hasher.finalize())
    }
}

#[async_trait]
impl PronunciationAnalyzer for HttpAnalysisScheduler {
    async fn schedule(
        &self,
        turn_id: Uuid,
        audio: &[f32],
        transcript: &str,
    ) -> Result<(), BackendError> {
        let dedup_key = Self::dedup_key(audio, transcript);
        if let Some(kv) = &self.kv {
            if let Ok(Some(_)) = kv.get(&dedup_key).await {
                tracing::debug!(%turn_id, "identical analysis already scheduled, skipping");
                return Ok(());
            }
        }

        let mut pcm = Vec::with_capacity(audio.len() * 2);
        for s in audio {
            pcm.extend_from_slice(&((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes());
        }

        self.client
            .post(format!("{}/v1/analysis", self.endpoint))
            .json(&AnalysisPayload {
                turn_id,
                audio: BASE64.encode(&pcm),
                transcript,
            })
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.timeout.as_millis() as u64))?
            .error_for_status()
            .map_err(|e| BackendError::Request(e.to_string()))?;

        if let Some(kv) = &self.kv {
            let _ = kv
                .set(
                    &dedup_key,
                    vec![1],
                    Some(Duration::from_secs(SCHEDULED_MARKER_TTL_SECS)),
                )
                .await;
        }

        Ok(())
    }
}
