//! No-op cache backend for store-less contexts.
//!
//! Calling code written against a distributed cache keeps working when
//! no store is configured: reads and writes return their safe
//! defaults, while the operations whose callers are expected to check
//! `is_healthy()` first report the missing client explicitly.

use async_trait::async_trait;

use crate::error::{CacheError, Result};

use super::{CacheBackend, SetOptions};

pub struct NoopCache;

impl NoopCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoopCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NoopCache {
    fn backend_type(&self) -> &'static str {
        "noop"
    }

    async fn set_raw(&self, key: &str, _value: String, _options: &SetOptions) -> bool {
        tracing::debug!(key = %key, "Cache set skipped: no backing store configured");
        false
    }

    async fn get_raw(&self, _key: &str) -> Option<String> {
        None
    }

    async fn del(&self, _key: &str) -> Result<bool> {
        Err(CacheError::NotInitialized)
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        Err(CacheError::NotInitialized)
    }

    async fn expire(&self, _key: &str, _seconds: u64) -> Result<bool> {
        Err(CacheError::NotInitialized)
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_and_writes_degrade_to_defaults() {
        let cache = NoopCache::new();
        assert!(!cache.set_raw("k", "\"v\"".to_string(), &SetOptions::none()).await);
        assert_eq!(cache.get_raw("k").await, None);
        assert!(!cache.is_available());
    }

    #[tokio::test]
    async fn test_hard_paths_report_not_initialized() {
        let cache = NoopCache::new();
        assert!(matches!(
            cache.del("k").await,
            Err(CacheError::NotInitialized)
        ));
        assert!(matches!(
            cache.exists("k").await,
            Err(CacheError::NotInitialized)
        ));
        assert!(matches!(
            cache.expire("k", 1).await,
            Err(CacheError::NotInitialized)
        ));
    }
}
