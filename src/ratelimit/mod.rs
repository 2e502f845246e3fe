//! Sliding-window-log rate limiting.
//!
//! Each identifier owns a window of admission timestamps. A check
//! prunes entries older than the window, counts what remains, and
//! records the new timestamp only when the request is admitted. The
//! prune/count/record sequence is atomic: a server-side script on the
//! Redis store, a single locked section on the memory store. Never
//! decompose it into separate read and write calls, or concurrent
//! checks can both observe "under limit" and over-admit.
//!
//! When the store fails the limiter fails open: rate limiting must not
//! become an outage amplifier.

mod memory_store;
mod redis_store;

pub use memory_store::MemoryRateLimitStore;
pub use redis_store::RedisRateLimitStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{CacheBackendKind, RateLimitConfig, RedisConfig};
use crate::error::{CacheError, Result};
use crate::metrics::RATE_LIMIT_DECISIONS_TOTAL;
use crate::redis::{current_time_ms, RedisConnectionManager};

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request was admitted
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Upper bound (ms since epoch) on when the window fully clears.
    /// This is `now + window`, not the moment the next slot frees up.
    pub reset_time_ms: i64,
    /// Requests observed in the window, including this one if admitted
    pub total_requests: u32,
}

/// What the store observed during an atomic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    /// Whether a new timestamp was recorded
    pub admitted: bool,
    /// Entries in the window after pruning, before any new entry
    pub count_before: u32,
}

/// Storage for rate-limit windows.
///
/// `check` must prune expired timestamps, count the remainder, and
/// record the new timestamp (when under the limit) in one atomic step.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        max_requests: u32,
    ) -> Result<WindowOutcome>;

    /// Drop the window, immediately restoring full budget.
    async fn reset(&self, key: &str) -> Result<()>;
}

/// Store used in no-op configurations; every check fails, which the
/// limiter turns into a fail-open admission.
pub struct NoopRateLimitStore;

#[async_trait]
impl RateLimitStore for NoopRateLimitStore {
    async fn check(
        &self,
        _key: &str,
        _now_ms: i64,
        _window_ms: i64,
        _max_requests: u32,
    ) -> Result<WindowOutcome> {
        Err(CacheError::NotInitialized)
    }

    async fn reset(&self, _key: &str) -> Result<()> {
        Err(CacheError::NotInitialized)
    }
}

/// Admission control over a [`RateLimitStore`].
pub struct SlidingWindowLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    fn window_key(&self, identifier: &str, prefix: Option<&str>) -> String {
        let prefix = prefix.unwrap_or(&self.config.key_prefix);
        format!("{}:{}", prefix, identifier)
    }

    /// Admission check using the configured default limit and window.
    pub async fn check_rate_limit_default(&self, identifier: &str) -> RateLimitDecision {
        self.check_rate_limit(
            identifier,
            self.config.default_max_requests,
            self.config.default_window_seconds,
            None,
        )
        .await
    }

    /// Check whether a request for `identifier` is admitted.
    ///
    /// Rejections are logged as security-relevant events. Store
    /// failures admit the request with `remaining = max - 1`.
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        max_requests: u32,
        window_seconds: u64,
        prefix: Option<&str>,
    ) -> RateLimitDecision {
        let key = self.window_key(identifier, prefix);
        let now = current_time_ms();
        let window_ms = window_seconds as i64 * 1000;
        let reset_time_ms = now + window_ms;

        match self.store.check(&key, now, window_ms, max_requests).await {
            Ok(outcome) if outcome.admitted => {
                RATE_LIMIT_DECISIONS_TOTAL
                    .with_label_values(&["allowed"])
                    .inc();
                RateLimitDecision {
                    allowed: true,
                    remaining: max_requests.saturating_sub(outcome.count_before + 1),
                    reset_time_ms,
                    total_requests: outcome.count_before + 1,
                }
            }
            Ok(outcome) => {
                RATE_LIMIT_DECISIONS_TOTAL
                    .with_label_values(&["rejected"])
                    .inc();
                tracing::warn!(
                    target: "security",
                    identifier = %identifier,
                    max_requests = max_requests,
                    window_seconds = window_seconds,
                    total_requests = outcome.count_before,
                    "Rate limit exceeded"
                );
                RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_time_ms,
                    total_requests: outcome.count_before,
                }
            }
            Err(e) => {
                RATE_LIMIT_DECISIONS_TOTAL
                    .with_label_values(&["fail_open"])
                    .inc();
                tracing::error!(
                    identifier = %identifier,
                    error = %e,
                    "Rate limit check failed, failing open"
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: max_requests.saturating_sub(1),
                    reset_time_ms,
                    total_requests: 1,
                }
            }
        }
    }

    /// Delete the identifier's window, restoring full budget.
    pub async fn reset_rate_limit(&self, identifier: &str, prefix: Option<&str>) -> Result<()> {
        let key = self.window_key(identifier, prefix);
        self.store.reset(&key).await?;
        tracing::debug!(identifier = %identifier, "Rate limit window reset");
        Ok(())
    }
}

/// Create a rate-limit store for the configured backend kind.
pub fn create_rate_limit_store(
    config: &RedisConfig,
    manager: Option<Arc<RedisConnectionManager>>,
) -> Arc<dyn RateLimitStore> {
    match config.backend {
        CacheBackendKind::Redis => {
            if let Some(manager) = manager {
                tracing::info!(backend = "redis", "Creating Redis rate-limit store");
                Arc::new(RedisRateLimitStore::new(manager))
            } else {
                tracing::warn!(
                    "Redis rate-limit store requested but no connection manager provided, \
                     falling back to no-op (checks fail open)"
                );
                Arc::new(NoopRateLimitStore)
            }
        }
        CacheBackendKind::Memory => {
            tracing::info!(backend = "memory", "Creating in-memory rate-limit store");
            Arc::new(MemoryRateLimitStore::new())
        }
        CacheBackendKind::Noop => Arc::new(NoopRateLimitStore),
    }
}

/// Build a limiter with the prefix and defaults from settings.
pub fn create_limiter(
    ratelimit: &RateLimitConfig,
    store: Arc<dyn RateLimitStore>,
) -> SlidingWindowLimiter {
    SlidingWindowLimiter::new(store, ratelimit.clone())
}
