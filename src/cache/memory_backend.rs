//! In-memory cache backend.
//!
//! Process-local stand-in with the same TTL and set-if-not-exists
//! semantics as the Redis backend. Expiry is lazy: entries are checked
//! on access rather than swept in the background.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;

use super::{CacheBackend, SetOptions};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

/// Cache backend holding entries in a concurrent map.
pub struct MemoryCache {
    entries: DashMap<String, MemoryEntry>,
    key_prefix: String,
}

impl MemoryCache {
    pub fn new(key_prefix: String) -> Self {
        Self {
            entries: DashMap::new(),
            key_prefix,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Remove and ignore an entry that has passed its deadline.
    fn take_live(&self, key: &str) -> Option<MemoryEntry> {
        let entry = self.entries.get(key)?.clone();
        if entry.is_expired() {
            drop(self.entries.remove(key));
            return None;
        }
        Some(entry)
    }

    /// Number of live entries (test/diagnostic helper).
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn set_raw(&self, key: &str, value: String, options: &SetOptions) -> bool {
        let key = self.full_key(key);

        if options.nx && self.take_live(&key).is_some() {
            return false;
        }

        let expires_at = options
            .ttl
            .map(|seconds| Instant::now() + Duration::from_secs(seconds));
        self.entries.insert(key, MemoryEntry { value, expires_at });
        true
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        let key = self.full_key(key);
        self.take_live(&key).map(|entry| entry.value)
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let key = self.full_key(key);
        let removed = match self.entries.remove(&key) {
            Some((_, entry)) => !entry.is_expired(),
            None => false,
        };
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = self.full_key(key);
        Ok(self.take_live(&key).is_some())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        let key = self.full_key(key);
        if self.take_live(&key).is_none() {
            return Ok(false);
        }

        if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
            return Ok(true);
        }
        Ok(false)
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MemoryCache {
        MemoryCache::new("test:".to_string())
    }

    #[tokio::test]
    async fn test_set_then_get_returns_value() {
        let cache = cache();
        assert!(cache.set_raw("k", "\"v\"".to_string(), &SetOptions::none()).await);
        assert_eq!(cache.get_raw("k").await, Some("\"v\"".to_string()));
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let cache = cache();
        assert_eq!(cache.get_raw("absent").await, None);
    }

    #[tokio::test]
    async fn test_nx_preserves_existing_value() {
        let cache = cache();
        assert!(cache.set_raw("k", "\"v1\"".to_string(), &SetOptions::none()).await);
        assert!(
            !cache
                .set_raw("k", "\"v2\"".to_string(), &SetOptions::if_not_exists())
                .await
        );
        assert_eq!(cache.get_raw("k").await, Some("\"v1\"".to_string()));
    }

    #[tokio::test]
    async fn test_nx_writes_when_absent() {
        let cache = cache();
        assert!(
            cache
                .set_raw("k", "\"v\"".to_string(), &SetOptions::if_not_exists())
                .await
        );
        assert_eq!(cache.get_raw("k").await, Some("\"v\"".to_string()));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = cache();
        assert!(cache.set_raw("k", "\"v\"".to_string(), &SetOptions::with_ttl(1)).await);
        assert!(cache.exists("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.get_raw("k").await, None);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_del() {
        let cache = cache();
        cache.set_raw("k", "\"v\"".to_string(), &SetOptions::none()).await;
        assert!(cache.del("k").await.unwrap());
        assert!(!cache.del("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_on_missing_key() {
        let cache = cache();
        assert!(!cache.expire("absent", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_sets_deadline() {
        let cache = cache();
        cache.set_raw("k", "\"v\"".to_string(), &SetOptions::none()).await;
        assert!(cache.expire("k", 1).await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.get_raw("k").await, None);
    }

    #[tokio::test]
    async fn test_len_counts_only_live_entries() {
        let cache = cache();
        assert!(cache.is_empty());

        cache.set_raw("a", "\"1\"".to_string(), &SetOptions::none()).await;
        cache.set_raw("b", "\"2\"".to_string(), &SetOptions::with_ttl(1)).await;
        assert_eq!(cache.len(), 2);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_prefixed() {
        let cache = cache();
        cache.set_raw("k", "\"v\"".to_string(), &SetOptions::none()).await;
        assert!(cache.entries.contains_key("test:k"));
    }
}
