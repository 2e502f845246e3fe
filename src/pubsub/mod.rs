//! Pub/Sub message bus.
//!
//! One subscriber connection per process: a background task owns the
//! dedicated pub/sub connection and fans messages out to registered
//! callbacks by channel name. Message payloads are JSON; a payload
//! that fails to parse is logged and dropped without disturbing the
//! subscription.

mod memory_bus;
mod redis_bus;

pub use memory_bus::MemoryMessageBus;
pub use redis_bus::RedisMessageBus;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{CacheBackendKind, RedisConfig};
use crate::error::{CacheError, Result};
use crate::redis::RedisConnectionManager;

/// Callback invoked once per message on a subscribed channel.
pub type MessageHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a serialized message and return how many subscribers
    /// were notified.
    async fn publish(&self, channel: &str, payload: String) -> Result<u32>;

    /// Register a callback for a channel.
    async fn subscribe(&self, channel: &str, handler: MessageHandler) -> Result<()>;

    /// Stop the subscriber task, if any.
    async fn shutdown(&self) {}
}

/// Bus used in store-less configurations: pub/sub requires a client,
/// so both operations report the missing initialization.
pub struct NoopMessageBus;

#[async_trait]
impl MessageBus for NoopMessageBus {
    async fn publish(&self, _channel: &str, _payload: String) -> Result<u32> {
        Err(CacheError::NotInitialized)
    }

    async fn subscribe(&self, _channel: &str, _handler: MessageHandler) -> Result<()> {
        Err(CacheError::NotInitialized)
    }
}

/// Create a message bus for the configured backend kind.
pub fn create_message_bus(
    config: &RedisConfig,
    manager: Option<Arc<RedisConnectionManager>>,
) -> Arc<dyn MessageBus> {
    match config.backend {
        CacheBackendKind::Redis => {
            if let Some(manager) = manager {
                tracing::info!(backend = "redis", "Creating Redis message bus");
                Arc::new(RedisMessageBus::new(manager))
            } else {
                tracing::warn!(
                    "Redis message bus requested but no connection manager provided, \
                     falling back to no-op"
                );
                Arc::new(NoopMessageBus)
            }
        }
        CacheBackendKind::Memory => {
            tracing::info!(backend = "memory", "Creating in-memory message bus");
            Arc::new(MemoryMessageBus::new())
        }
        CacheBackendKind::Noop => Arc::new(NoopMessageBus),
    }
}
