//! Composed cache service.
//!
//! `CacheService` wires the connection manager, cache backend, rate
//! limiter, session store, and message bus together and exposes the
//! full programmatic surface. It is constructed explicitly and passed
//! by `Arc`; callers needing a different backend build a second
//! instance instead of flipping global state.

mod info;

pub use info::{CacheStatistics, HealthReport, HealthStatus};

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{create_cache_backend, CacheBackend, MemoryCache, NoopCache, SetOptions};
use crate::config::Settings;
use crate::error::{CacheError, Result};
use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, CONNECTION_STATUS};
use crate::pubsub::{
    create_message_bus, MemoryMessageBus, MessageBus, MessageHandler, NoopMessageBus,
};
use crate::ratelimit::{
    create_limiter, create_rate_limit_store, MemoryRateLimitStore, NoopRateLimitStore,
    RateLimitDecision, SlidingWindowLimiter,
};
use crate::redis::RedisConnectionManager;
use crate::session::SessionStore;

pub struct CacheService {
    manager: Option<Arc<RedisConnectionManager>>,
    cache: Arc<dyn CacheBackend>,
    limiter: SlidingWindowLimiter,
    sessions: SessionStore,
    bus: Arc<dyn MessageBus>,
}

impl CacheService {
    /// Connect to Redis and build the service around the live
    /// connection. Fails hard when the connection cannot be
    /// established; use [`CacheService::degraded`] for a service that
    /// starts without a store.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let manager = Arc::new(RedisConnectionManager::new(settings.redis.clone())?);
        manager.initialize().await?;
        CONNECTION_STATUS.set(1);

        let cache = create_cache_backend(&settings.redis, Some(manager.clone()));
        let store = create_rate_limit_store(&settings.redis, Some(manager.clone()));
        let bus = create_message_bus(&settings.redis, Some(manager.clone()));

        Ok(Self {
            manager: Some(manager),
            limiter: create_limiter(&settings.ratelimit, store),
            sessions: SessionStore::new(&settings.session, cache.clone()),
            cache,
            bus,
        })
    }

    /// Build a service over process-local storage. No external store is
    /// contacted; suitable for tests and single-instance deployments.
    pub fn in_memory(settings: &Settings) -> Self {
        let cache: Arc<dyn CacheBackend> =
            Arc::new(MemoryCache::new(settings.redis.key_prefix.clone()));
        let store = Arc::new(MemoryRateLimitStore::new());

        Self {
            manager: None,
            limiter: create_limiter(&settings.ratelimit, store),
            sessions: SessionStore::new(&settings.session, cache.clone()),
            cache,
            bus: Arc::new(MemoryMessageBus::new()),
        }
    }

    /// Build a service with no storage at all. Cache reads miss, writes
    /// are dropped, rate limiting fails open, and pub/sub reports
    /// [`CacheError::NotInitialized`].
    pub fn degraded(settings: &Settings) -> Self {
        let cache: Arc<dyn CacheBackend> = Arc::new(NoopCache::new());
        let store = Arc::new(NoopRateLimitStore);

        Self {
            manager: None,
            limiter: create_limiter(&settings.ratelimit, store),
            sessions: SessionStore::new(&settings.session, cache.clone()),
            cache,
            bus: Arc::new(NoopMessageBus),
        }
    }

    /// Build whichever service the configured backend kind calls for.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        use crate::config::CacheBackendKind;

        match settings.redis.backend {
            CacheBackendKind::Redis => Self::connect(settings).await,
            CacheBackendKind::Memory => Ok(Self::in_memory(settings)),
            CacheBackendKind::Noop => Ok(Self::degraded(settings)),
        }
    }

    /// Identifier of the active cache backend.
    pub fn backend_type(&self) -> &'static str {
        self.cache.backend_type()
    }

    // ---- cache ----

    /// Store a value as JSON. Serialization failures and backend errors
    /// are logged and reported as `false`.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, options: &SetOptions) -> bool {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache value serialization failed");
                return false;
            }
        };

        self.cache.set_raw(key, payload, options).await
    }

    /// Fetch a value and deserialize it. Misses, backend errors, and
    /// malformed payloads all come back as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = match self.cache.get_raw(key).await {
            Some(payload) => payload,
            None => {
                CACHE_MISSES_TOTAL.inc();
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(value) => {
                CACHE_HITS_TOTAL.inc();
                Some(value)
            }
            Err(e) => {
                CACHE_MISSES_TOTAL.inc();
                tracing::error!(key = %key, error = %e, "Cache value deserialization failed");
                None
            }
        }
    }

    pub async fn del(&self, key: &str) -> Result<bool> {
        self.cache.del(key).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.cache.exists(key).await
    }

    pub async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        self.cache.expire(key, seconds).await
    }

    // ---- rate limiting ----

    /// Admit or reject a request for `identifier` under a sliding
    /// window of `window_seconds` holding at most `max_requests`.
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        max_requests: u32,
        window_seconds: u64,
        prefix: Option<&str>,
    ) -> RateLimitDecision {
        self.limiter
            .check_rate_limit(identifier, max_requests, window_seconds, prefix)
            .await
    }

    /// Admission check using the configured default limit and window.
    pub async fn check_rate_limit_default(&self, identifier: &str) -> RateLimitDecision {
        self.limiter.check_rate_limit_default(identifier).await
    }

    pub async fn reset_rate_limit(&self, identifier: &str, prefix: Option<&str>) -> Result<()> {
        self.limiter.reset_rate_limit(identifier, prefix).await
    }

    // ---- sessions ----

    pub async fn set_session<T: Serialize>(
        &self,
        session_id: &str,
        data: &T,
        ttl_seconds: Option<u64>,
    ) -> bool {
        self.sessions.set_session(session_id, data, ttl_seconds).await
    }

    pub async fn get_session<T: DeserializeOwned>(&self, session_id: &str) -> Option<T> {
        self.sessions.get_session(session_id).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        self.sessions.delete_session(session_id).await
    }

    // ---- pub/sub ----

    /// Serialize `message` and publish it. Returns the subscriber count
    /// on success and `Ok(0)` after a logged transport failure;
    /// [`CacheError::NotInitialized`] still propagates so callers can
    /// tell a missing bus from a flaky one.
    pub async fn publish<T: Serialize>(&self, channel: &str, message: &T) -> Result<u32> {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(channel = %channel, error = %e, "Message serialization failed");
                return Ok(0);
            }
        };

        match self.bus.publish(channel, payload).await {
            Ok(receivers) => Ok(receivers),
            Err(CacheError::NotInitialized) => Err(CacheError::NotInitialized),
            Err(e) => {
                tracing::error!(channel = %channel, error = %e, "Publish failed");
                Ok(0)
            }
        }
    }

    /// Subscribe to a channel with a typed callback. Messages whose
    /// payload does not deserialize to `T` are logged and dropped.
    pub async fn subscribe<T, F>(&self, channel: &str, callback: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let channel_name = channel.to_string();
        let handler: MessageHandler = Arc::new(move |value| {
            match serde_json::from_value::<T>(value) {
                Ok(message) => callback(message),
                Err(e) => {
                    tracing::warn!(
                        channel = %channel_name,
                        error = %e,
                        "Dropping message with unexpected shape"
                    );
                }
            }
        });

        self.bus.subscribe(channel, handler).await
    }

    // ---- diagnostics ----

    /// Probe the backing store. Never errors: a failed probe is an
    /// unhealthy report with `connected = false`.
    pub async fn health_check(&self) -> HealthReport {
        let manager = match &self.manager {
            Some(manager) => manager,
            None => {
                return if self.cache.is_available() {
                    HealthReport::healthy(self.backend_type(), 0, "")
                } else {
                    HealthReport::unhealthy(self.backend_type())
                };
            }
        };

        let started = Instant::now();
        if let Err(e) = manager.ping().await {
            CONNECTION_STATUS.set(0);
            tracing::error!(error = %e, "Health check ping failed");
            return HealthReport::unhealthy(self.backend_type());
        }
        let latency_ms = started.elapsed().as_millis() as u64;
        CONNECTION_STATUS.set(1);

        match self.fetch_info(manager).await {
            Ok(info) => HealthReport::healthy(self.backend_type(), latency_ms, &info),
            Err(e) => {
                tracing::warn!(error = %e, "INFO unavailable, reporting health without details");
                HealthReport::healthy(self.backend_type(), latency_ms, "")
            }
        }
    }

    /// Snapshot server statistics. Always produces a snapshot; fields
    /// the store does not report (or cannot be fetched) are zero.
    pub async fn get_statistics(&self) -> CacheStatistics {
        let manager = match &self.manager {
            Some(manager) => manager,
            None => return CacheStatistics::default(),
        };

        match self.fetch_info(manager).await {
            Ok(info) => CacheStatistics::from_info(&info),
            Err(e) => {
                tracing::error!(error = %e, "Statistics unavailable");
                CacheStatistics::default()
            }
        }
    }

    async fn fetch_info(&self, manager: &Arc<RedisConnectionManager>) -> Result<String> {
        manager
            .execute(|mut conn| async move {
                let info: String = redis::cmd("INFO").query_async(&mut conn).await?;
                Ok(info)
            })
            .await
    }

    /// Connection health counters, when a store connection exists.
    pub fn connection_stats(&self) -> Option<crate::redis::ConnectionHealthStats> {
        self.manager.as_ref().map(|m| m.health().stats())
    }

    pub fn is_healthy(&self) -> bool {
        match &self.manager {
            Some(manager) => manager.is_healthy(),
            None => self.cache.is_available(),
        }
    }

    /// Stop the subscriber task and drop the store connections.
    /// Safe to call on a service that never connected.
    pub async fn disconnect(&self) {
        self.bus.shutdown().await;
        if let Some(manager) = &self.manager {
            manager.disconnect().await;
        }
        CONNECTION_STATUS.set(0);
        tracing::info!("Cache service disconnected");
    }
}
