//! In-memory cache implementation using moka
//!
//! Entries expire after the cache-wide TTL and are evicted by size once
//! `max_capacity` is reached.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// In-memory cache using moka
///
/// Values are stored as JSON strings to support generic types.
pub struct MemoryCache {
    cache: Cache<String, Arc<String>>,
    ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl MemoryCache {
    /// Create a memory cache holding at most `max_capacity` entries, each living `ttl`
    pub fn with_capacity_and_ttl(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache, ttl }
    }

    /// Get the current number of entries in the cache
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(json) => {
                let value =
                    serde_json::from_str(&json).context("Failed to deserialize cache value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        self.cache.insert(key.to_string(), Arc::new(json)).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(60));

        cache.set("k", &vec![1, 2, 3]).await.unwrap();
        let value: Option<Vec<i32>> = cache.get("k").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));

        cache.delete("k").await.unwrap();
        let value: Option<Vec<i32>> = cache.get("k").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(60));
        cache.set("a", &1).await.unwrap();
        cache.set("b", &2).await.unwrap();

        cache.clear().await.unwrap();
        assert_eq!(cache.get::<i32>("a").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(60));
        cache.set("k", &"text").await.unwrap();
        assert!(cache.get::<i64>("k").await.is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(10))]

        #[test]
        fn entries_expire_after_ttl(key in "[a-z]{1,10}", value in "[a-z]{1,50}") {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_millis(10));

                cache.set(&key, &value).await.unwrap();
                let present: Option<String> = cache.get(&key).await.unwrap();
                prop_assert_eq!(present, Some(value.clone()));

                tokio::time::sleep(Duration::from_millis(50)).await;
                cache.cache.run_pending_tasks().await;

                let expired: Option<String> = cache.get(&key).await.unwrap();
                prop_assert_eq!(expired, None);
                Ok(())
            })?;
        }
    }
}
