//! Cache layer
//!
//! In-process caching (moka) for hot lookups. The marking pipeline caches class
//! session rows by id; the commit always re-validates against storage, so a
//! stale entry can never admit a record on its own.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rollcall::cache::{create_cache, CacheLayer};
//! use rollcall::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("class_session:1", &session).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache layer trait
///
/// Values are stored serialized, so any serde type can be cached. The generic
/// methods make this trait unusable as `dyn`; hold the concrete cache instead.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache; it expires after the configured TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;
}

/// Cache key for a class session row
pub fn class_session_key(id: i64) -> String {
    format!("class_session:{}", id)
}

/// Create the shared cache from configuration
pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}
