//! Key-value cache with TTL
//!
//! Backends implement the raw string contract ([`KvCache`]); [`Cache`] adds the
//! key prefix, JSON encoding and compute-if-absent on top.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppResult;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get_raw(&self, key: &str) -> AppResult<Option<String>>;

    /// `ttl == None` keeps the value until it is deleted
    async fn set_raw(&self, key: &str, value: String, ttl: Option<Duration>) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Removes every key starting with `prefix`, returns how many were removed
    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64>;
}

/// Prefixed, typed view over a [`KvCache`] backend
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn KvCache>,
    prefix: String,
}

impl Cache {
    pub fn new(backend: Arc<dyn KvCache>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    /// In-process cache, mostly for tests
    pub fn in_memory(prefix: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryCache::new()), prefix)
    }

    pub fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.backend.get_raw(&self.key(key)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Option<Duration>) -> AppResult<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.set_raw(&self.key(key), raw, ttl).await
    }

    pub async fn delete(&self, key: &str) -> AppResult<()> {
        self.backend.delete(&self.key(key)).await
    }

    pub async fn delete_prefix(&self, prefix: &str) -> AppResult<u64> {
        self.backend.delete_prefix(&self.key(prefix)).await
    }

    /// Returns the cached value, or computes, stores and returns it
    ///
    /// Errors from `compute` are returned as is and nothing is cached.
    /// A cached entry that no longer decodes is treated as a miss.
    pub async fn once<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        match self.get_json::<T>(key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => log::warn!("Cache entry {} unreadable, recomputing: {}", key, e),
        }

        let value = compute().await?;
        self.set_json(key, &value, Some(ttl)).await?;
        Ok(value)
    }
}
