//! In-process response cache for read-only queries
//!
//! Ranking, overview and topic list responses are expensive to recompute
//! and change only when new aggregates are stored. This module caches their
//! JSON bodies:
//! - Keys are SHA-256 digests of the route plus its query parameters
//! - Entries expire after a fixed TTL
//! - The oldest entry is evicted once `max_entries` is reached
//! - Storing new aggregates invalidates everything
//!
//! # Example
//!
//! ```rust,ignore
//! use topicpulse::cache::ResponseCache;
//!
//! let cache = ResponseCache::new(Duration::from_secs(300), 1024);
//! let key = ResponseCache::key("rankings", &[("rank_by", "recent_volume")]);
//! if let Some(body) = cache.get(&key).await { /* ... */ }
//! ```

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::CacheConfig;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Entries currently held (expired ones included until touched)
    pub entries: usize,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

/// TTL cache of JSON response bodies
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a cache; `max_entries` is at least 1
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a cache from configuration, or `None` when caching is disabled
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(Duration::from_secs(config.ttl_secs), config.max_entries))
    }

    /// Cache key for a route and its parameters
    ///
    /// Parameter order does not matter.
    pub fn key(route: &str, params: &[(&str, &str)]) -> String {
        let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
        sorted.sort();

        let mut hasher = Sha256::new();
        hasher.update(route.as_bytes());
        for (name, value) in sorted {
            hasher.update([0u8]);
            hasher.update(name.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Get a live entry
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().await;

        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_lookup(true);
                tracing::debug!(key, "Response cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_lookup(false);
        tracing::debug!(key, "Response cache miss");
        None
    }

    /// Store an entry, evicting the oldest one when full
    pub async fn insert(&self, key: String, value: Value) {
        let mut entries = self.entries.lock().await;

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);

            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every entry, returning how many were removed
    pub async fn invalidate_all(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();

        if count > 0 {
            tracing::info!(count, "Invalidated cached responses");
        }
        count
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().await.len(),
        }
    }
}
