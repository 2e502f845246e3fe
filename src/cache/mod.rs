//! Cache storage backends.
//!
//! The cache is an optimization, not a source of truth: reads and
//! writes fail soft (returning `None`/`false` after logging), while
//! `del`/`exists`/`expire` propagate hard errors so callers holding an
//! explicit reference can decide for themselves.
//!
//! Three interchangeable implementations: Redis (production),
//! in-memory (tests and single-instance deployments), and no-op
//! (store-less contexts).

mod memory_backend;
mod noop_backend;
mod redis_backend;

pub use memory_backend::MemoryCache;
pub use noop_backend::NoopCache;
pub use redis_backend::RedisCache;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{CacheBackendKind, RedisConfig};
use crate::error::Result;
use crate::redis::RedisConnectionManager;

/// Options for a cache write.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Time-to-live in seconds
    pub ttl: Option<u64>,
    /// Only write if the key does not already exist
    pub nx: bool,
}

impl SetOptions {
    /// Unconditional write with no expiry
    pub fn none() -> Self {
        Self::default()
    }

    /// Write with a time-to-live in seconds
    pub fn with_ttl(seconds: u64) -> Self {
        Self {
            ttl: Some(seconds),
            nx: false,
        }
    }

    /// Synonym for [`SetOptions::with_ttl`], matching the `EX` command
    /// argument
    pub fn with_ex(seconds: u64) -> Self {
        Self::with_ttl(seconds)
    }

    /// Set-if-not-exists
    pub fn if_not_exists() -> Self {
        Self {
            ttl: None,
            nx: true,
        }
    }

    pub fn and_ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn and_nx(mut self) -> Self {
        self.nx = true;
        self
    }
}

/// Storage adapter behind the cache operations.
///
/// Values cross this boundary already serialized; the typed JSON layer
/// lives in the service.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend identifier for health/stats reporting
    fn backend_type(&self) -> &'static str;

    /// Store a serialized value. Returns whether the write happened;
    /// failures are logged and absorbed.
    async fn set_raw(&self, key: &str, value: String, options: &SetOptions) -> bool;

    /// Fetch a serialized value. Returns `None` on miss or failure.
    async fn get_raw(&self, key: &str) -> Option<String>;

    /// Delete a key. `Ok(true)` if a key was removed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// Check key existence.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Set a key's expiry in seconds. `Ok(true)` if the key existed.
    async fn expire(&self, key: &str, seconds: u64) -> Result<bool>;

    /// Whether the backing store is currently usable.
    fn is_available(&self) -> bool;
}

/// Create a cache backend for the configured kind.
///
/// Falls back to the no-op backend with a warning when the Redis
/// backend is requested without a connection manager.
pub fn create_cache_backend(
    config: &RedisConfig,
    manager: Option<Arc<RedisConnectionManager>>,
) -> Arc<dyn CacheBackend> {
    match config.backend {
        CacheBackendKind::Redis => {
            if let Some(manager) = manager {
                tracing::info!(
                    backend = "redis",
                    key_prefix = %config.key_prefix,
                    "Creating Redis cache backend"
                );
                Arc::new(RedisCache::new(manager))
            } else {
                tracing::warn!(
                    "Redis cache backend requested but no connection manager provided, \
                     falling back to no-op"
                );
                Arc::new(NoopCache::new())
            }
        }
        CacheBackendKind::Memory => {
            tracing::info!(backend = "memory", "Creating in-memory cache backend");
            Arc::new(MemoryCache::new(config.key_prefix.clone()))
        }
        CacheBackendKind::Noop => {
            tracing::info!(backend = "noop", "Creating no-op cache backend");
            Arc::new(NoopCache::new())
        }
    }
}
