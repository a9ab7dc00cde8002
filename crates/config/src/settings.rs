//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{cache, session, turn, vad};
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Orchestrator timing configuration
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Backend endpoints
    #[serde(default)]
    pub backends: BackendSettings,

    /// Synthesized-audio cache configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Directory utterance recordings are written to
    #[serde(default = "default_audio_dir")]
    pub audio_store_dir: String,
}

fn default_audio_dir() -> String {
    "data/utterances".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Deployment-tunable orchestrator timings. Defaults come from `constants`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    pub vad_threshold: f32,
    pub vad_window_samples: usize,
    pub speech_confirm_frames: u32,
    pub silence_confirm_frames: u32,
    pub end_of_speech_ms: u64,
    pub gentle_prompt_ms: u64,
    pub post_speech_wait_ms: u64,
    pub speech_pad_ms: u64,
    pub history_window: usize,
    pub session_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub max_sessions: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            vad_threshold: vad::PROBABILITY_THRESHOLD,
            vad_window_samples: vad::WINDOW_SAMPLES,
            speech_confirm_frames: vad::SPEECH_CONFIRM_FRAMES,
            silence_confirm_frames: vad::SILENCE_CONFIRM_FRAMES,
            end_of_speech_ms: turn::END_OF_SPEECH_MS,
            gentle_prompt_ms: turn::GENTLE_PROMPT_MS,
            post_speech_wait_ms: turn::POST_SPEECH_WAIT_MS,
            speech_pad_ms: vad::SPEECH_PAD_MS,
            history_window: turn::HISTORY_WINDOW,
            session_timeout_secs: session::TIMEOUT_SECS,
            cleanup_interval_secs: session::CLEANUP_INTERVAL_SECS,
            max_sessions: session::MAX_SESSIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    pub transcription_url: String,
    pub generation_url: String,
    pub synthesis_url: String,
    pub analysis_url: String,
    /// Connect/read timeout applied to every backend client, seconds
    pub request_timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            transcription_url: "http://localhost:9000".to_string(),
            generation_url: "http://localhost:11434".to_string(),
            synthesis_url: "http://localhost:9100".to_string(),
            analysis_url: "http://localhost:9200".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub namespace: String,
    pub ttl_secs: u64,
    pub compress_threshold_bytes: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: cache::NAMESPACE.to_string(),
            ttl_secs: cache::TTL_SECS,
            compress_threshold_bytes: cache::COMPRESS_THRESHOLD_BYTES,
        }
    }
}

impl Settings {
    /// Load settings from an optional file, then `PARLO_`-prefixed
    /// environment variables (`PARLO_SERVER__PORT=9090` style).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(Environment::with_prefix("PARLO").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    /// Validate cross-field invariants the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let o = &self.orchestrator;
        if o.gentle_prompt_ms >= o.end_of_speech_ms {
            return Err(ConfigError::Invalid(format!(
                "gentle_prompt_ms ({}) must be strictly less than end_of_speech_ms ({})",
                o.gentle_prompt_ms, o.end_of_speech_ms
            )));
        }
        if !(0.0..=1.0).contains(&o.vad_threshold) {
            return Err(ConfigError::Invalid(format!(
                "vad_threshold ({}) must be within [0.0, 1.0]",
                o.vad_threshold
            )));
        }
        if o.vad_window_samples == 0 {
            return Err(ConfigError::Invalid(
                "vad_window_samples must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.orchestrator.end_of_speech_ms, 1_800);
        assert_eq!(settings.orchestrator.gentle_prompt_ms, 1_200);
        assert_eq!(settings.orchestrator.vad_threshold, 0.40);
    }

    #[test]
    fn test_gentle_prompt_must_precede_end_of_speech() {
        let mut settings = Settings::default();
        settings.orchestrator.gentle_prompt_ms = 2_000;
        assert!(settings.validate().is_err());
    }
}
