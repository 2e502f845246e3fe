//! In-process message bus.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::metrics::{PUBSUB_DELIVERED_TOTAL, PUBSUB_PUBLISHED_TOTAL};

use super::{MessageBus, MessageHandler};

/// Message bus delivering to subscribers in the same process.
///
/// Mirrors the Redis bus contract: callbacks are invoked once per
/// message on their channel, and the publish result counts the
/// subscribers notified.
pub struct MemoryMessageBus {
    handlers: DashMap<String, Vec<MessageHandler>>,
}

impl MemoryMessageBus {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

impl Default for MemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for MemoryMessageBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<u32> {
        PUBSUB_PUBLISHED_TOTAL.inc();

        let message: serde_json::Value = match serde_json::from_str(&payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Dropping unparseable message");
                return Ok(0);
            }
        };

        let mut notified = 0;
        if let Some(handlers) = self.handlers.get(channel) {
            for handler in handlers.iter() {
                handler(message.clone());
                notified += 1;
            }
        }

        PUBSUB_DELIVERED_TOTAL.inc_by(notified as u64);
        Ok(notified)
    }

    async fn subscribe(&self, channel: &str, handler: MessageHandler) -> Result<()> {
        self.handlers
            .entry(channel.to_string())
            .or_default()
            .push(handler);
        tracing::debug!(channel = %channel, "Subscribed to in-memory channel");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = MemoryMessageBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = received.clone();
        bus.subscribe(
            "match-events",
            Arc::new(move |msg| sink.lock().unwrap().push(msg)),
        )
        .await
        .unwrap();

        let notified = bus
            .publish("match-events", "{\"goal\":true}".to_string())
            .await
            .unwrap();

        assert_eq!(notified, 1);
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], serde_json::json!({"goal": true}));
    }

    #[tokio::test]
    async fn test_other_channels_are_filtered() {
        let bus = MemoryMessageBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = received.clone();
        bus.subscribe("channel-a", Arc::new(move |msg| sink.lock().unwrap().push(msg)))
            .await
            .unwrap();

        let notified = bus
            .publish("channel-b", "{\"x\":1}".to_string())
            .await
            .unwrap();

        assert_eq!(notified, 0);
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_returns_zero() {
        let bus = MemoryMessageBus::new();
        let notified = bus.publish("quiet", "{}".to_string()).await.unwrap();
        assert_eq!(notified, 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_notified() {
        let bus = MemoryMessageBus::new();
        let count = Arc::new(Mutex::new(0));

        for _ in 0..3 {
            let count = count.clone();
            bus.subscribe("ch", Arc::new(move |_| *count.lock().unwrap() += 1))
                .await
                .unwrap();
        }

        let notified = bus.publish("ch", "{}".to_string()).await.unwrap();
        assert_eq!(notified, 3);
        assert_eq!(*count.lock().unwrap(), 3);
    }
}
