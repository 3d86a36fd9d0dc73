//! Cache storage: the tolerant result-cache facade and the in-process store.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::application::ports::{CacheStore, CacheStoreError};

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "insights_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "insights_cache_miss_total";
pub(crate) const METRIC_CACHE_ERROR: &str = "insights_cache_error_total";

/// JSON result cache over a [`CacheStore`].
///
/// Store failures and undecodable payloads read as misses; write failures are logged and
/// dropped. Callers never observe a cache error.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    debug!(target = "insights::cache", key, "cache hit");
                    Some(value)
                }
                Err(err) => {
                    counter!(METRIC_CACHE_ERROR).increment(1);
                    warn!(
                        target = "insights::cache",
                        key,
                        error = %err,
                        "discarding undecodable cache entry"
                    );
                    None
                }
            },
            Ok(None) => {
                counter!(METRIC_CACHE_MISS).increment(1);
                debug!(target = "insights::cache", key, "cache miss");
                None
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR).increment(1);
                warn!(
                    target = "insights::cache",
                    key,
                    error = %err,
                    "cache read failed; treating as miss"
                );
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                counter!(METRIC_CACHE_ERROR).increment(1);
                warn!(
                    target = "insights::cache",
                    key,
                    error = %err,
                    "cache value not serializable; skipping write"
                );
                return;
            }
        };
        if let Err(err) = self.store.set(key, encoded, ttl_seconds).await {
            counter!(METRIC_CACHE_ERROR).increment(1);
            warn!(
                target = "insights::cache",
                key,
                ttl_seconds,
                error = %err,
                "cache write failed"
            );
        }
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process [`CacheStore`] with LRU eviction and per-entry expiry.
pub struct MemoryCacheStore {
    entries: RwLock<LruCache<String, Entry>>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.memory_capacity_non_zero())),
        }
    }

    /// Number of stored entries, expired ones included until next touched.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl_seconds: u64,
    ) -> Result<(), CacheStoreError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        rw_write(&self.entries, SOURCE, "set").put(key.to_string(), Entry { value, expires_at });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheStoreError> {
            Err(CacheStoreError::unavailable("connection refused"))
        }

        async fn set(
            &self,
            _key: &str,
            _value: String,
            _ttl_seconds: u64,
        ) -> Result<(), CacheStoreError> {
            Err(CacheStoreError::unavailable("connection refused"))
        }
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryCacheStore::default();
        assert!(store.get("k").await.expect("get").is_none());

        store.set("k", "v".to_string(), 60).await.expect("set");
        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn memory_store_expires_entries() {
        let store = MemoryCacheStore::default();
        store.set("k", "v".to_string(), 0).await.expect("set");

        assert!(store.get("k").await.expect("get").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn memory_store_evicts_least_recently_used() {
        let store = MemoryCacheStore::new(&CacheConfig {
            memory_capacity: 2,
            ..Default::default()
        });
        store.set("a", "1".into(), 60).await.expect("set");
        store.set("b", "2".into(), 60).await.expect("set");
        store.get("a").await.expect("get");
        store.set("c", "3".into(), 60).await.expect("set");

        assert!(store.get("b").await.expect("get").is_none());
        assert!(store.get("a").await.expect("get").is_some());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn result_cache_round_trips_json() {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::default()));
        cache.set("k", &vec![1_u32, 2, 3], 60).await;

        let cached: Option<Vec<u32>> = cache.get("k").await;
        assert_eq!(cached, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn store_failures_degrade_to_misses() {
        let cache = ResultCache::new(Arc::new(FailingStore));
        cache.set("k", &"value", 60).await;

        let cached: Option<String> = cache.get("k").await;
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn unserializable_values_are_skipped() {
        let store = Arc::new(MemoryCacheStore::default());
        let cache = ResultCache::new(store.clone());
        let tuple_keys: std::collections::HashMap<(u32, u32), u32> =
            [((1, 2), 3)].into_iter().collect();

        cache.set("k", &tuple_keys, 60).await;

        assert!(store.get("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn undecodable_entries_are_misses() {
        let store = Arc::new(MemoryCacheStore::default());
        store.set("k", "{not json".into(), 60).await.expect("set");

        let cache = ResultCache::new(store);
        let cached: Option<Vec<u32>> = cache.get("k").await;
        assert!(cached.is_none());
    }
}
