//! Single-flight compute on top of a [`CacheStore`].
//!
//! Flow for `with_single_flight(key, lock_ttl, compute)`:
//!   1. Cache hit → return it.
//!   2. Try the lock `lock:<key>`. The winner computes, writes the entry, and
//!      releases the lock.
//!   3. Losers re-read the cache `poll_attempts` times with growing backoff,
//!      then compute on their own without writing.
//!   4. Any store failure degrades to a direct compute.
//!
//! At-most-one-writer-per-key is best effort, not linearizable.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use efficacy_common::config::CacheConfig;

use crate::envelope::{CacheEnvelope, Cacheable};
use crate::store::{CacheStore, MemoryStore};

#[derive(Debug, Clone)]
pub struct SingleFlightConfig {
    pub value_ttl: Duration,
    pub lock_ttl: Duration,
    pub poll_attempts: u32,
    pub poll_backoff: Duration,
}

impl Default for SingleFlightConfig {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for SingleFlightConfig {
    fn from(cfg: &CacheConfig) -> Self {
        Self {
            value_ttl: Duration::from_secs(cfg.value_ttl_secs),
            lock_ttl: Duration::from_secs(cfg.lock_ttl_secs),
            poll_attempts: cfg.poll_attempts,
            poll_backoff: Duration::from_millis(cfg.poll_backoff_ms),
        }
    }
}

/// Counters for observing single-flight behaviour.
#[derive(Debug, Default)]
pub struct SingleFlightStats {
    pub hits: AtomicU64,
    pub computed_as_leader: AtomicU64,
    pub served_after_wait: AtomicU64,
    pub computed_after_wait: AtomicU64,
    pub store_failures: AtomicU64,
}

impl SingleFlightStats {
    pub fn snapshot(&self) -> [u64; 5] {
        [
            self.hits.load(Ordering::Relaxed),
            self.computed_as_leader.load(Ordering::Relaxed),
            self.served_after_wait.load(Ordering::Relaxed),
            self.computed_after_wait.load(Ordering::Relaxed),
            self.store_failures.load(Ordering::Relaxed),
        ]
    }
}

/// Process-wide cache service. Clone the `Arc` to share it.
pub struct CacheService {
    store: Arc<dyn CacheStore>,
    config: SingleFlightConfig,
    stats: SingleFlightStats,
}

impl CacheService {
    pub fn new(store: Arc<dyn CacheStore>, config: SingleFlightConfig) -> Self {
        Self { store, config, stats: SingleFlightStats::default() }
    }

    pub fn in_memory(cfg: &CacheConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new(cfg.max_entries)), SingleFlightConfig::from(cfg))
    }

    pub fn config(&self) -> &SingleFlightConfig {
        &self.config
    }

    pub fn stats(&self) -> &SingleFlightStats {
        &self.stats
    }

    /// Namespaced key with a hashed body, so arbitrary request parts stay short.
    pub fn key(namespace: &str, parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        format!("{namespace}:{:x}", hasher.finalize())
    }

    /// Typed read. Store errors and stale schemas read as a miss.
    pub async fn get<T: Cacheable>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => CacheEnvelope::<T>::decode(&raw),
            Ok(None) => None,
            Err(e) => {
                self.stats.store_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "Cache read failed; treating as miss");
                None
            }
        }
    }

    /// Typed write. Failures are logged, never surfaced.
    pub async fn set<T: Cacheable + Clone>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let encoded = match CacheEnvelope::encode(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(key, error = %e, "Cache encode failed; skipping write");
                return;
            }
        };
        if let Err(e) = self.store.set(key, encoded, ttl.unwrap_or(self.config.value_ttl)).await {
            self.stats.store_failures.fetch_add(1, Ordering::Relaxed);
            warn!(key, error = %e, "Cache write failed");
        }
    }

    /// Run `compute` at most once per key across concurrent callers (best effort).
    pub async fn with_single_flight<T, E, F, Fut>(
        &self,
        key: &str,
        lock_ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Cacheable + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "Single-flight cache hit");
            return Ok(hit);
        }

        let lock_key = format!("lock:{key}");
        match self.store.try_lock(&lock_key, lock_ttl).await {
            Ok(true) => {
                self.stats.computed_as_leader.fetch_add(1, Ordering::Relaxed);
                let result = compute().await;
                if let Ok(value) = &result {
                    self.set(key, value, None).await;
                }
                if let Err(e) = self.store.unlock(&lock_key).await {
                    self.stats.store_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(key, error = %e, "Failed to release single-flight lock; it will expire");
                }
                result
            }
            Ok(false) => {
                for attempt in 1..=self.config.poll_attempts {
                    tokio::time::sleep(self.config.poll_backoff * attempt).await;
                    if let Some(hit) = self.get::<T>(key).await {
                        self.stats.served_after_wait.fetch_add(1, Ordering::Relaxed);
                        debug!(key, attempt, "Single-flight served after wait");
                        return Ok(hit);
                    }
                }
                self.stats.computed_after_wait.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Single-flight leader too slow; computing directly");
                compute().await
            }
            Err(e) => {
                self.stats.store_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "Lock acquisition failed; computing without single-flight");
                compute().await
            }
        }
    }
}
