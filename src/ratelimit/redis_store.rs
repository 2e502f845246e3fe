//! Redis rate-limit store.
//!
//! The whole admission check executes as one Lua script so concurrent
//! checks against the same identifier serialize inside Redis.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redis::Script;

use crate::error::Result;
use crate::redis::RedisConnectionManager;

use super::{RateLimitStore, WindowOutcome};

/// Prune expired timestamps, count the remainder, and record the new
/// timestamp only when under the limit. Returns `{admitted, count}`
/// where `count` is the post-prune size before any insertion.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_start = tonumber(ARGV[2])
local max_requests = tonumber(ARGV[3])
local window_seconds = tonumber(ARGV[4])
local member = ARGV[5]

redis.call('ZREMRANGEBYSCORE', key, '-inf', window_start)
local count = redis.call('ZCARD', key)

if count < max_requests then
    redis.call('ZADD', key, now, member)
    redis.call('EXPIRE', key, window_seconds)
    return {1, count}
end

return {0, count}
"#;

pub struct RedisRateLimitStore {
    manager: Arc<RedisConnectionManager>,
    script: Script,
    /// Disambiguates members for admissions landing in the same
    /// millisecond, so each admitted request records its own entry
    sequence: AtomicU64,
}

impl RedisRateLimitStore {
    pub fn new(manager: Arc<RedisConnectionManager>) -> Self {
        Self {
            manager,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            sequence: AtomicU64::new(0),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.manager.key_prefix(), key)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn check(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        max_requests: u32,
    ) -> Result<WindowOutcome> {
        let key = self.full_key(key);
        let window_start = now_ms - window_ms;
        let window_seconds = (window_ms / 1000).max(1);
        let member = format!("{}-{}", now_ms, self.sequence.fetch_add(1, Ordering::Relaxed));

        let script = &self.script;
        let (admitted, count): (i64, i64) = self
            .manager
            .execute(|mut conn| async move {
                script
                    .key(&key)
                    .arg(now_ms)
                    .arg(window_start)
                    .arg(max_requests)
                    .arg(window_seconds)
                    .arg(&member)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        Ok(WindowOutcome {
            admitted: admitted == 1,
            count_before: count as u32,
        })
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let key = self.full_key(key);
        let _: i64 = self
            .manager
            .execute(|mut conn| async move {
                redis::cmd("DEL").arg(&key).query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }
}
