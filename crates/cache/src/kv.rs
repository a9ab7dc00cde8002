//! Key-value store trait and in-memory implementation
//!
//! The engine consumes a Redis-shaped store: get, set-with-TTL, delete,
//! scan-by-prefix. The in-memory implementation below backs tests and
//! single-process deployments; a networked store plugs in behind the same
//! trait.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::CacheError;

/// Store-level stats, restricted to a key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KvStats {
    pub key_count: usize,
    pub value_bytes: usize,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Set a value. `ttl = None` means no expiry.
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Returns true when the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// All live keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Key count and payload bytes under `prefix`.
    async fn stats(&self, prefix: &str) -> Result<KvStats, CacheError>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|t| now >= t).unwrap_or(false)
    }
}

/// In-memory store with lazy TTL eviction.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(now) {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn stats(&self, prefix: &str) -> Result<KvStats, CacheError> {
        let now = Instant::now();
        let mut key_count = 0;
        let mut value_bytes = 0;
        for e in self.entries.iter() {
            if e.key().starts_with(prefix) && !e.value().is_expired(now) {
                key_count += 1;
                value_bytes += e.value().value.len();
            }
        }
        Ok(KvStats {
            key_count,
            value_bytes,
        })
    }
}
