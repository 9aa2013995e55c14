//! Cache layer
//!
//! In-process moka cache used for computed read models such as the
//! analytics summary. Writers invalidate by glob pattern.
//!
//! ```rust,ignore
//! use copydesk::cache::{create_cache, CacheLayer};
//!
//! let cache = create_cache(&config.cache);
//! cache.set("analytics:summary", &summary, cache.default_ttl()).await?;
//! cache.delete_pattern("analytics:*").await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache layer trait
///
/// The generic methods make this trait unusable as `dyn CacheLayer`; share a
/// concrete [`Cache`] instead.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values whose key matches a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Application cache: a [`MemoryCache`] plus the configured default TTL
///
/// Every delete bumps a generation counter so computed values can be
/// stored without resurrecting data that was invalidated mid-computation.
#[derive(Debug)]
pub struct Cache {
    inner: MemoryCache,
    default_ttl: Duration,
    generation: AtomicU64,
}

impl Cache {
    pub fn new(inner: MemoryCache, default_ttl: Duration) -> Self {
        Self {
            inner,
            default_ttl,
            generation: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Current invalidation generation; read it before computing a value
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store `value` unless an invalidation happened after `since`.
    ///
    /// Returns whether the value is still cached.
    pub async fn set_unless_invalidated<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        since: u64,
    ) -> Result<bool> {
        if self.generation() != since {
            return Ok(false);
        }
        self.inner.set(key, value, ttl).await?;
        // An invalidation between the check and the write would miss this entry
        if self.generation() != since {
            self.inner.delete(key).await?;
            return Ok(false);
        }
        Ok(true)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        self.inner.get(key).await
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.bump();
        self.inner.delete(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        self.bump();
        self.inner.delete_pattern(pattern).await
    }

    async fn clear(&self) -> Result<()> {
        self.bump();
        self.inner.clear().await
    }
}

/// Create the shared cache from configuration
pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    let ttl = Duration::from_secs(config.ttl_seconds);
    tracing::debug!(
        "Using in-memory cache (capacity {}, ttl {:?})",
        config.max_capacity,
        ttl
    );
    Arc::new(Cache::new(MemoryCache::with_capacity(config.max_capacity), ttl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_from_config() {
        let config = CacheConfig {
            ttl_seconds: 120,
            max_capacity: 50,
        };
        let cache = create_cache(&config);
        assert_eq!(cache.default_ttl(), Duration::from_secs(120));

        cache.set("k", &"v", cache.default_ttl()).await.unwrap();
        assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("v"));
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get::<String>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_unless_invalidated() {
        let cache = create_cache(&CacheConfig::default());
        let ttl = cache.default_ttl();

        let since = cache.generation();
        assert!(cache.set_unless_invalidated("stats:a", &1, ttl, since).await.unwrap());
        assert_eq!(cache.get::<i32>("stats:a").await.unwrap(), Some(1));

        let since = cache.generation();
        cache.delete_pattern("stats:*").await.unwrap();
        assert!(!cache.set_unless_invalidated("stats:a", &2, ttl, since).await.unwrap());
        assert_eq!(cache.get::<i32>("stats:a").await.unwrap(), None);
    }
}
