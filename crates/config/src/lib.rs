//! Settings and constants for the parlo coaching engine

pub mod constants;
mod settings;

pub use settings::{
    BackendSettings, CacheSettings, OrchestratorSettings, ServerConfig, Settings,
};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
