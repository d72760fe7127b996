//! Cache backends for translation results.
//!
//! Two interchangeable backends behind one enum: an in-process LRU for
//! single-instance deployments and Redis for multi-instance ones. Both
//! expose the same `get` / `set` / `delete` / `exists` / `clear` contract
//! with optional per-key TTL.
//!
//! Redis errors are logged and degrade to cache misses; the cache is an
//! optimization, never a correctness dependency.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::Mutex;

/// Default capacity of the in-memory backend
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis connection failed: {0}")]
    Redis(#[from] redis::RedisError),
}

/// A cache backend. Construct via [`Cache::memory`] or [`Cache::redis`].
pub enum Cache {
    Memory(MemoryCache),
    Redis(RedisCache),
}

impl Cache {
    /// In-process LRU backend with the given capacity (entries).
    pub fn memory(capacity: usize) -> Self {
        Cache::Memory(MemoryCache::new(capacity))
    }

    /// Redis backend. Connects eagerly so a bad URL fails at startup
    /// instead of surfacing as silent misses later.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Redis`] when the URL is invalid or the server
    /// is unreachable.
    pub async fn redis(url: &str) -> Result<Self, CacheError> {
        Ok(Cache::Redis(RedisCache::connect(url).await?))
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self {
            Cache::Memory(c) => c.get(key).await,
            Cache::Redis(c) => c.get(key).await,
        }
    }

    /// Stores a value. `ttl = None` means no expiry. Returns whether the
    /// write was accepted.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        match self {
            Cache::Memory(c) => c.set(key, value, ttl).await,
            Cache::Redis(c) => c.set(key, value, ttl).await,
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self {
            Cache::Memory(c) => c.delete(key).await,
            Cache::Redis(c) => c.delete(key).await,
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self {
            Cache::Memory(c) => c.exists(key).await,
            Cache::Redis(c) => c.exists(key).await,
        }
    }

    pub async fn clear(&self) {
        match self {
            Cache::Memory(c) => c.clear().await,
            Cache::Redis(c) => c.clear().await,
        }
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// LRU cache with per-entry expiry, serialized by an async mutex.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, (String, Option<Instant>)>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            Some((_, Some(expires_at))) => *expires_at <= Instant::now(),
            Some((_, None)) => false,
            None => return None,
        };
        if expired {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|(value, _)| value.clone())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.lock().await;
        entries.put(key.to_string(), (value.to_string(), expires_at));
        true
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.lock().await.pop(key).is_some()
    }

    async fn exists(&self, key: &str) -> bool {
        // Route through get() so expired entries count as absent
        self.get(key).await.is_some()
    }

    async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Current number of cached entries (expired ones included until read).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

// ============================================================================
// Redis backend
// ============================================================================

/// Redis-backed cache. The connection manager reconnects on its own; every
/// operation failure is logged and treated as a miss.
pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.manager.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Redis GET failed");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        let mut conn = self.manager.clone();
        let result = match ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                    .await
            }
            None => conn.set::<_, _, ()>(key, value).await,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Redis SET failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let mut conn = self.manager.clone();
        match conn.del::<_, i64>(key).await {
            Ok(n) => n > 0,
            Err(e) => {
                tracing::warn!(error = %e, "Redis DEL failed");
                false
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let mut conn = self.manager.clone();
        match conn.exists::<_, bool>(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Redis EXISTS failed");
                false
            }
        }
    }

    async fn clear(&self) {
        let mut conn = self.manager.clone();
        if let Err(e) = redis::cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
        {
            tracing::warn!(error = %e, "Redis FLUSHDB failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_set_get() {
        let cache = Cache::memory(16);
        assert!(cache.set("k", "v", None).await);
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert!(cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_memory_miss() {
        let cache = Cache::memory(16);
        assert_eq!(cache.get("absent").await, None);
        assert!(!cache.exists("absent").await);
    }

    #[tokio::test]
    async fn test_memory_delete() {
        let cache = Cache::memory(16);
        cache.set("k", "v", None).await;
        assert!(cache.delete("k").await);
        assert!(!cache.delete("k").await);
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_memory_clear() {
        let cache = Cache::memory(16);
        cache.set("a", "1", None).await;
        cache.set("b", "2", None).await;
        cache.clear().await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, None);
    }

    #[tokio::test]
    async fn test_memory_ttl_expiry() {
        let cache = Cache::memory(16);
        cache.set("k", "v", Some(Duration::from_millis(20))).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_memory_lru_eviction() {
        let inner = MemoryCache::new(2);
        inner.set("a", "1", None).await;
        inner.set("b", "2", None).await;
        inner.set("c", "3", None).await;
        assert_eq!(inner.len().await, 2);
        assert_eq!(inner.get("a").await, None); // oldest evicted
        assert_eq!(inner.get("c").await.as_deref(), Some("3"));
    }
}
