//! Content-addressed cache for synthesized speech
//!
//! Keys are deterministic over (normalized text, language, speaker,
//! optional emotion, optional explicit voice). Short texts are embedded
//! literally so cache contents stay debuggable; long texts are hashed.
//! Payloads above a size threshold are gzip-compressed, with a metadata
//! record stored alongside under the same TTL.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use parlo_config::constants::cache as cache_constants;

use crate::kv::{KvStats, KvStore};
use crate::CacheError;

/// Deterministic cache key for one synthesis request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(pub String);

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct AudioCacheConfig {
    pub namespace: String,
    pub ttl: Duration,
    pub compress_threshold: usize,
}

impl Default for AudioCacheConfig {
    fn default() -> Self {
        Self {
            namespace: cache_constants::NAMESPACE.to_string(),
            ttl: Duration::from_secs(cache_constants::TTL_SECS),
            compress_threshold: cache_constants::COMPRESS_THRESHOLD_BYTES,
        }
    }
}

/// Metadata stored alongside each payload.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    compressed: bool,
    original_size: usize,
}

/// Hit/miss and latency counters.
#[derive(Debug, Clone, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub avg_get_ms: f64,
    pub avg_set_ms: f64,
    pub kv: KvStats,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    get_micros: AtomicU64,
    get_ops: AtomicU64,
    set_micros: AtomicU64,
    set_ops: AtomicU64,
}

/// Content-addressed audio cache over a key-value store.
pub struct AudioCache {
    kv: Arc<dyn KvStore>,
    config: AudioCacheConfig,
    counters: Counters,
}

impl AudioCache {
    pub fn new(kv: Arc<dyn KvStore>, config: AudioCacheConfig) -> Self {
        Self {
            kv,
            config,
            counters: Counters::default(),
        }
    }

    /// Build the deterministic key for a synthesis request.
    pub fn key(
        &self,
        text: &str,
        language: &str,
        speaker_id: &str,
        emotion: Option<&str>,
        voice_id: Option<&str>,
    ) -> CacheKey {
        let normalized = normalize_text(text);
        let text_part = if normalized.chars().count() <= cache_constants::KEY_TEXT_EMBED_MAX {
            sanitize_for_key(&normalized)
        } else {
            let mut hasher = Sha256::new();
            hasher.update(normalized.as_bytes());
            format!("h{:x}", hasher.finalize())
        };

        CacheKey(format!(
            "{}:{}:{}:{}:{}:{}",
            self.config.namespace,
            language,
            speaker_id,
            emotion.unwrap_or("-"),
            voice_id.unwrap_or("-"),
            text_part
        ))
    }

    /// Fetch a clip, transparently decompressing if needed.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let start = Instant::now();
        let result = self.get_inner(key).await;
        self.counters
            .get_micros
            .fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.counters.get_ops.fetch_add(1, Ordering::Relaxed);

        match &result {
            Ok(Some(_)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {}
        }
        result
    }

    async fn get_inner(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let Some(payload) = self.kv.get(&key.0).await? else {
            return Ok(None);
        };

        let compressed = match self.kv.get(&meta_key(key)).await? {
            Some(raw) => serde_json::from_slice::<EntryMeta>(&raw)?.compressed,
            // Metadata expired out from under the payload; treat as a miss
            // rather than guess at the encoding.
            None => {
                tracing::warn!(key = %key.0, "cache payload present without metadata, evicting");
                let _ = self.kv.delete(&key.0).await;
                return Ok(None);
            }
        };

        if compressed {
            let mut decoder = flate2::read::GzDecoder::new(payload.as_slice());
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            Ok(Some(out))
        } else {
            Ok(Some(payload))
        }
    }

    /// Store a clip, compressing above the configured threshold.
    pub async fn set(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        let start = Instant::now();

        let original_size = bytes.len();
        let compress = original_size > self.config.compress_threshold;
        let payload = if compress {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(bytes)?;
            encoder.finish()?
        } else {
            bytes.to_vec()
        };

        let meta = serde_json::to_vec(&EntryMeta {
            compressed: compress,
            original_size,
        })?;

        let ttl = Some(self.config.ttl);
        self.kv.set(&meta_key(key), meta, ttl).await?;
        self.kv.set(&key.0, payload, ttl).await?;

        self.counters
            .set_micros
            .fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.counters.set_ops.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Feed a cached clip to `sink` in fixed-size chunks.
    /// Returns false (and sends nothing) when the key is absent.
    pub async fn stream(
        &self,
        key: &CacheKey,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<bool, CacheError> {
        let Some(bytes) = self.get(key).await? else {
            return Ok(false);
        };

        for chunk in bytes.chunks(cache_constants::STREAM_CHUNK_BYTES) {
            if sink.send(chunk.to_vec()).await.is_err() {
                // Receiver hung up mid-stream; the clip stays cached.
                break;
            }
        }
        Ok(true)
    }

    /// Delete every key in this cache's namespace. Returns deleted count.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let prefix = format!("{}:", self.config.namespace);
        let keys = self.kv.scan_prefix(&prefix).await?;
        let mut deleted = 0;
        for key in keys {
            if self.kv.delete(&key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Current hit/miss/latency counters plus namespace-restricted KV stats.
    pub async fn metrics(&self) -> Result<CacheMetrics, CacheError> {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        let get_ops = self.counters.get_ops.load(Ordering::Relaxed).max(1);
        let set_ops = self.counters.set_ops.load(Ordering::Relaxed).max(1);

        Ok(CacheMetrics {
            hits,
            misses,
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            avg_get_ms: self.counters.get_micros.load(Ordering::Relaxed) as f64
                / get_ops as f64
                / 1_000.0,
            avg_set_ms: self.counters.set_micros.load(Ordering::Relaxed) as f64
                / set_ops as f64
                / 1_000.0,
            kv: self
                .kv
                .stats(&format!("{}:", self.config.namespace))
                .await?,
        })
    }
}

fn meta_key(key: &CacheKey) -> String {
    format!("{}#meta", key.0)
}

/// Collapse whitespace and trim so formatting differences never split keys.
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep embedded key text readable while staying safe for key syntax.
fn sanitize_for_key(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;

    fn cache() -> AudioCache {
        AudioCache::new(Arc::new(InMemoryKvStore::new()), AudioCacheConfig::default())
    }

    #[test]
    fn test_key_deterministic() {
        let c = cache();
        let a = c.key("Bonjour !", "fr", "coach", None, None);
        let b = c.key("Bonjour !", "fr", "coach", None, None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_varies_with_emotion_and_voice() {
        let c = cache();
        let base = c.key("Bonjour", "fr", "coach", None, None);
        let with_emotion = c.key("Bonjour", "fr", "coach", Some("encouragement"), None);
        let with_voice = c.key("Bonjour", "fr", "coach", None, Some("v2"));
        assert_ne!(base, with_emotion);
        assert_ne!(base, with_voice);
        assert_ne!(with_emotion, with_voice);
    }

    #[test]
    fn test_key_embeds_short_text_and_hashes_long() {
        let c = cache();
        let short = c.key("Bonjour Jean", "fr", "coach", None, None);
        assert!(short.0.ends_with("bonjour_jean"));

        let long_text = "x".repeat(500);
        let long = c.key(&long_text, "fr", "coach", None, None);
        assert!(long.0.split(':').last().unwrap().starts_with('h'));
    }

    #[test]
    fn test_key_normalizes_whitespace() {
        let c = cache();
        assert_eq!(
            c.key("Bonjour  Jean", "fr", "coach", None, None),
            c.key(" Bonjour Jean ", "fr", "coach", None, None)
        );
    }

    #[tokio::test]
    async fn test_round_trip_uncompressed() {
        let c = cache();
        let key = c.key("petit", "fr", "coach", None, None);
        let data = vec![7u8; 100];
        c.set(&key, &data).await.unwrap();
        assert_eq!(c.get(&key).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_round_trip_compressed() {
        let c = cache();
        let key = c.key("grand", "fr", "coach", None, None);
        // Well above the compression threshold, compressible content
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 16) as u8).collect();
        c.set(&key, &data).await.unwrap();
        assert_eq!(c.get(&key).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_stream_chunks_and_reports_presence() {
        let c = cache();
        let key = c.key("flux", "fr", "coach", None, None);
        let data = vec![1u8; cache_constants::STREAM_CHUNK_BYTES + 10];
        c.set(&key, &data).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        assert!(c.stream(&key, tx).await.unwrap());

        let mut received = Vec::new();
        while let Some(chunk) = rx.recv().await {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, data);

        let (tx, _rx) = mpsc::channel(1);
        let missing = c.key("absent", "fr", "coach", None, None);
        assert!(!c.stream(&missing, tx).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_and_metrics() {
        let c = cache();
        let k1 = c.key("un", "fr", "coach", None, None);
        let k2 = c.key("deux", "fr", "coach", None, None);
        c.set(&k1, &[1, 2, 3]).await.unwrap();
        c.set(&k2, &[4, 5, 6]).await.unwrap();

        let _ = c.get(&k1).await.unwrap();
        let _ = c.get(&c.key("absent", "fr", "coach", None, None)).await.unwrap();

        let metrics = c.metrics().await.unwrap();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert!((metrics.hit_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(metrics.kv.key_count, 4); // 2 payloads + 2 metadata records

        // Payload + metadata records both live under the namespace
        assert_eq!(c.clear().await.unwrap(), 4);
        assert_eq!(c.get(&k1).await.unwrap(), None);
    }
}
