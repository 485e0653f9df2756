use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::metrics::{CACHE_ENTRIES, CACHE_LOOKUPS};

/// Route class deciding an entry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    /// Category, search and paged listings.
    List,
    /// Item detail and chapter/episode lists.
    Detail,
    /// Chapter text, image sets and resolved media.
    Content,
    /// Hot and latest rankings.
    Hot,
}

impl TtlClass {
    pub fn ttl(&self, config: &CacheConfig) -> Duration {
        Duration::from_secs(match self {
            Self::List => config.list_ttl_secs,
            Self::Detail => config.detail_ttl_secs,
            Self::Content => config.content_ttl_secs,
            Self::Hot => config.hot_ttl_secs,
        })
    }
}

#[derive(Debug)]
struct Entry {
    payload: String,
    stored_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// In-memory TTL cache of serialized JSON responses.
#[derive(Debug)]
pub struct ResponseCache {
    config: CacheConfig,
    entries: RwLock<HashMap<String, Entry>>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Look up a live entry; expired entries are removed.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.enabled {
            CACHE_LOOKUPS.with_label_values(&["disabled"]).inc();
            return None;
        }

        let expired = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => {
                    CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
                    return None;
                }
                Some(entry) if !entry.is_expired() => {
                    match serde_json::from_str(&entry.payload) {
                        Ok(value) => {
                            CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                            return Some(value);
                        }
                        Err(e) => {
                            warn!(key, error = %e, "Dropping undecodable cache entry");
                            false
                        }
                    }
                }
                Some(_) => true,
            }
        };

        let mut entries = self.entries.write().await;
        // Another reader may have refreshed it meanwhile.
        if entries.get(key).is_some_and(|e| !expired || e.is_expired()) {
            entries.remove(key);
            CACHE_ENTRIES.set(entries.len() as i64);
        }
        CACHE_LOOKUPS
            .with_label_values(&[if expired { "expired" } else { "miss" }])
            .inc();
        None
    }

    pub async fn put<T: Serialize>(&self, key: &str, class: TtlClass, value: &T) {
        if !self.config.enabled {
            return;
        }
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Response not cacheable");
                return;
            }
        };
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                payload,
                stored_at: Instant::now(),
                ttl: class.ttl(&self.config),
            },
        );
        CACHE_ENTRIES.set(entries.len() as i64);
    }

    /// Serve from cache or run `f`, storing only successful results.
    pub async fn cached<T, E, F, Fut>(&self, key: &str, class: TtlClass, f: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cached_if(key, class, |_| true, f).await
    }

    /// Like [`cached`](Self::cached), storing only results accepted by `keep`.
    pub async fn cached_if<T, E, F, Fut>(
        &self,
        key: &str,
        class: TtlClass,
        keep: impl FnOnce(&T) -> bool,
        f: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }
        let value = f().await?;
        if keep(&value) {
            self.put(key, class, &value).await;
        } else {
            debug!(key, "Result not cached");
        }
        Ok(value)
    }

    /// Drop every expired entry.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        CACHE_ENTRIES.set(entries.len() as i64);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
        CACHE_ENTRIES.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(ttl_secs: u64) -> CacheConfig {
        CacheConfig {
            enabled: true,
            list_ttl_secs: ttl_secs,
            detail_ttl_secs: ttl_secs,
            content_ttl_secs: ttl_secs,
            hot_ttl_secs: ttl_secs,
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = ResponseCache::new(config(60));
        cache.put("k", TtlClass::List, &vec![1, 2, 3]).await;
        assert_eq!(cache.get::<Vec<i32>>("k").await, Some(vec![1, 2, 3]));
        assert_eq!(cache.get::<Vec<i32>>("other").await, None);
    }

    #[tokio::test]
    async fn test_expired_entries_removed_on_read() {
        let cache = ResponseCache::new(config(0));
        cache.put("k", TtlClass::Detail, &"v").await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get::<String>("k").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_misses() {
        let mut cfg = config(60);
        cfg.enabled = false;
        let cache = ResponseCache::new(cfg);
        cache.put("k", TtlClass::Hot, &1).await;
        assert_eq!(cache.get::<i32>("k").await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_cached_stores_only_success() {
        let cache = ResponseCache::new(config(60));
        let calls = AtomicUsize::new(0);

        let failed: Result<i32, &str> = cache
            .cached("k", TtlClass::Content, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("upstream down")
            })
            .await;
        assert!(failed.is_err());

        for _ in 0..3 {
            let value: Result<i32, &str> = cache
                .cached("k", TtlClass::Content, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_if_skips_rejected() {
        let cache = ResponseCache::new(config(60));
        let empty: Result<Vec<i32>, ()> = cache
            .cached_if("k", TtlClass::List, |v: &Vec<i32>| !v.is_empty(), || async {
                Ok(vec![])
            })
            .await;
        assert_eq!(empty, Ok(vec![]));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = ResponseCache::new(CacheConfig {
            list_ttl_secs: 0,
            ..config(60)
        });
        cache.put("a", TtlClass::List, &1).await;
        cache.put("b", TtlClass::Detail, &2).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.get::<i32>("b").await, Some(2));
    }
}
