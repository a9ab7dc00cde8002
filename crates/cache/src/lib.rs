//! Key-value store abstraction and the synthesized-audio cache

mod audio;
mod kv;

pub use audio::{AudioCache, AudioCacheConfig, CacheKey, CacheMetrics};
pub use kv::{InMemoryKvStore, KvStats, KvStore};

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("key-value store error: {0}")]
    Kv(String),

    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("corrupt cache metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}
