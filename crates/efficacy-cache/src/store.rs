//! Cache/lock store abstraction and the in-process implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;

use efficacy_common::Result;

/// Shared key/value store with TTL and mutual-exclusion locks.
///
/// Values are opaque strings; typing and versioning happen one layer up in
/// [`crate::envelope`]. Implementations may be remote (and therefore fail),
/// which is why every call returns a `Result`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Atomically take the lock if nobody holds it. Returns `false` when held.
    async fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool>;

    async fn unlock(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Entry {
    body: Arc<str>,
    ttl: Duration,
}

/// Per-entry TTL: each value carries its own lifetime.
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory store backed by moka. Locks live in a separate map so a value
/// eviction can never release a lock.
pub struct MemoryStore {
    values: Cache<String, Entry>,
    locks: Cache<String, Entry>,
}

impl MemoryStore {
    pub fn new(max_entries: u64) -> Self {
        let values = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryExpiry)
            .build();
        let locks = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryExpiry)
            .build();
        Self { values, locks }
    }

    pub fn entry_count(&self) -> u64 {
        self.values.entry_count()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).await.map(|e| e.body.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.values
            .insert(key.to_string(), Entry { body: Arc::from(value), ttl })
            .await;
        Ok(())
    }

    async fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        let entry = self
            .locks
            .entry(key.to_string())
            .or_insert(Entry { body: Arc::from("held"), ttl })
            .await;
        Ok(entry.is_fresh())
    }

    async fn unlock(&self, key: &str) -> Result<()> {
        self.locks.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryStore::new(100);
        store.set("k", "v".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let store = MemoryStore::new(100);
        assert!(store.try_lock("lock:a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.try_lock("lock:a", Duration::from_secs(5)).await.unwrap());
        store.unlock("lock:a").await.unwrap();
        assert!(store.try_lock("lock:a", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let store = MemoryStore::new(100);
        store.set("short", "v".to_string(), Duration::from_millis(20)).await.unwrap();
        // moka expiry runs on the real clock
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_locks_do_not_shadow_values() {
        let store = MemoryStore::new(100);
        assert!(store.try_lock("x", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.get("x").await.unwrap(), None);
    }
}
