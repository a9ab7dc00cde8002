//! Generation backend client
//!
//! Ollama-compatible chat endpoint with bounded retry for transport-level
//! transients. Cancellation happens by aborting the task that awaits this
//! call; the client itself never blocks past its request timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use parlo_core::{BackendError, GenerationRequest, LanguageModel, MessageRole};

use crate::map_reqwest;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    /// Retry attempts for retryable transport failures
    pub max_retries: u32,
    /// Initial backoff, doubled each retry
    pub initial_backoff: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "qwen3:4b-instruct".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessagePayload>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessagePayload {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// HTTP language-generation client.
pub struct HttpGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl HttpGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn call_once(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let payload = ChatRequest {
            model: &self.config.model,
            messages: request
                .messages
                .iter()
                .map(|m| ChatMessagePayload {
                    role: match m.role {
                        MessageRole::System => "system",
                        MessageRole::User => "user",
                        MessageRole::Assistant => "assistant",
                    },
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
            options: ChatOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.endpoint))
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.config.timeout.as_millis() as u64))?
            .error_for_status()
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        Ok(parsed.message.content)
    }
}

#[async_trait]
impl LanguageModel for HttpGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0;

        loop {
            match self.call_once(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "generation call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
