//! Redis cache backend.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::metrics::CACHE_OPERATIONS_TOTAL;
use crate::redis::RedisConnectionManager;

use super::{CacheBackend, SetOptions};

/// Cache backend over the shared Redis connection.
///
/// Every key is namespaced with the connection's key prefix. Writes
/// use a single `SET` with `EX`/`NX` arguments so that TTL and
/// set-if-not-exists semantics are applied server-side in one round
/// trip.
pub struct RedisCache {
    manager: Arc<RedisConnectionManager>,
}

impl RedisCache {
    pub fn new(manager: Arc<RedisConnectionManager>) -> Self {
        Self { manager }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.manager.key_prefix(), key)
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn backend_type(&self) -> &'static str {
        "redis"
    }

    async fn set_raw(&self, key: &str, value: String, options: &SetOptions) -> bool {
        let key = self.full_key(key);
        let op_key = key.clone();
        let ttl = options.ttl;
        let nx = options.nx;

        let result = self
            .manager
            .execute(|mut conn| async move {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&op_key).arg(&value);
                if let Some(ttl) = ttl {
                    cmd.arg("EX").arg(ttl);
                }
                if nx {
                    cmd.arg("NX");
                }
                // With NX the reply is nil when the key already exists
                let reply: Option<String> = cmd.query_async(&mut conn).await?;
                Ok(reply)
            })
            .await;

        match result {
            Ok(reply) => {
                let written = reply.is_some();
                let outcome = if written { "ok" } else { "skipped" };
                CACHE_OPERATIONS_TOTAL
                    .with_label_values(&["set", outcome])
                    .inc();
                written
            }
            Err(e) => {
                CACHE_OPERATIONS_TOTAL
                    .with_label_values(&["set", "error"])
                    .inc();
                tracing::error!(key = %key, error = %e, "Cache set failed");
                false
            }
        }
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        let key = self.full_key(key);
        let op_key = key.clone();

        let result = self
            .manager
            .execute(|mut conn| async move {
                let value: Option<String> =
                    redis::cmd("GET").arg(&op_key).query_async(&mut conn).await?;
                Ok(value)
            })
            .await;

        match result {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache get failed");
                None
            }
        }
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let key = self.full_key(key);
        let removed: i64 = self
            .manager
            .execute(|mut conn| async move {
                redis::cmd("DEL").arg(&key).query_async(&mut conn).await
            })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = self.full_key(key);
        let found: i64 = self
            .manager
            .execute(|mut conn| async move {
                redis::cmd("EXISTS").arg(&key).query_async(&mut conn).await
            })
            .await?;
        Ok(found > 0)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        let key = self.full_key(key);
        let applied: i64 = self
            .manager
            .execute(|mut conn| async move {
                redis::cmd("EXPIRE")
                    .arg(&key)
                    .arg(seconds)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(applied > 0)
    }

    fn is_available(&self) -> bool {
        self.manager.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    #[test]
    fn test_key_prefixing() {
        let config = RedisConfig {
            key_prefix: "astral-turf:".to_string(),
            ..Default::default()
        };
        let manager = Arc::new(RedisConnectionManager::new(config).unwrap());
        let cache = RedisCache::new(manager);

        assert_eq!(cache.full_key("player:42"), "astral-turf:player:42");
    }

    #[test]
    fn test_unconnected_backend_reports_unavailable() {
        let manager = Arc::new(RedisConnectionManager::new(RedisConfig::default()).unwrap());
        let cache = RedisCache::new(manager);
        assert!(!cache.is_available());
    }

    #[tokio::test]
    async fn test_reads_and_writes_fail_soft_without_server() {
        // Port 1 is never a Redis server; both paths must log the key
        // and absorb the failure.
        let config = RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout_ms: 200,
            ..Default::default()
        };
        let manager = Arc::new(RedisConnectionManager::new(config).unwrap());
        let cache = RedisCache::new(manager);

        assert!(
            !cache
                .set_raw("k", "\"v\"".to_string(), &SetOptions::with_ttl(5))
                .await
        );
        assert_eq!(cache.get_raw("k").await, None);
    }
}
