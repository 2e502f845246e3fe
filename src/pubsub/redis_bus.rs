//! Redis-backed message bus.
//!
//! Publishing goes through the manager's dedicated publisher
//! connection. Subscriptions are served by a single background task
//! owning the process's one pub/sub connection; channels added after
//! the task starts are forwarded to it over a command channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use redis::Client;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::error::{CacheError, Result};
use crate::metrics::{PUBSUB_DELIVERED_TOTAL, PUBSUB_PUBLISHED_TOTAL};
use crate::redis::RedisConnectionManager;

use super::{MessageBus, MessageHandler};

pub struct RedisMessageBus {
    manager: Arc<RedisConnectionManager>,
    handlers: Arc<DashMap<String, Vec<MessageHandler>>>,
    /// Command channel to the subscriber task; `None` until the first
    /// subscription starts it
    subscriber: Mutex<Option<mpsc::UnboundedSender<String>>>,
    shutdown: broadcast::Sender<()>,
}

impl RedisMessageBus {
    pub fn new(manager: Arc<RedisConnectionManager>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            manager,
            handlers: Arc::new(DashMap::new()),
            subscriber: Mutex::new(None),
            shutdown,
        }
    }

    /// Number of channels with registered callbacks (diagnostics).
    pub fn subscribed_channels(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait]
impl MessageBus for RedisMessageBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<u32> {
        let mut conn = self.manager.publisher().await?;

        let result: redis::RedisResult<i64> = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(&payload)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(receivers) => {
                PUBSUB_PUBLISHED_TOTAL.inc();
                tracing::debug!(
                    channel = %channel,
                    receivers = receivers,
                    "Message published"
                );
                Ok(receivers.max(0) as u32)
            }
            Err(e) => {
                // Force a fresh publisher connection on the next publish
                self.manager.clear_publisher().await;
                Err(CacheError::Redis(e))
            }
        }
    }

    async fn subscribe(&self, channel: &str, handler: MessageHandler) -> Result<()> {
        self.handlers
            .entry(channel.to_string())
            .or_default()
            .push(handler);

        let mut guard = self.subscriber.lock().await;
        if guard.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            let task = SubscriberTask {
                client: self.manager.client(),
                handlers: self.handlers.clone(),
                shutdown: self.shutdown.subscribe(),
            };
            tokio::spawn(task.run(rx));
            *guard = Some(tx);
        }

        if let Some(tx) = guard.as_ref() {
            if tx.send(channel.to_string()).is_err() {
                // Task exited; a later subscribe will restart it
                *guard = None;
                return Err(CacheError::Redis(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "subscriber task is not running",
                ))));
            }
        }

        tracing::debug!(channel = %channel, "Registered subscriber callback");
        Ok(())
    }

    async fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

enum SubscriberEvent {
    Message(Option<redis::Msg>),
    Subscribe(Option<String>),
    Shutdown,
}

/// Background task owning the process's pub/sub connection.
struct SubscriberTask {
    client: Client,
    handlers: Arc<DashMap<String, Vec<MessageHandler>>>,
    shutdown: broadcast::Receiver<()>,
}

impl SubscriberTask {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<String>) {
        loop {
            match self.run_subscription(&mut cmd_rx).await {
                Ok(()) => {
                    tracing::info!("Pub/Sub subscriber stopped");
                    break;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "Pub/Sub subscription error, reconnecting in 5 seconds..."
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                        _ = self.shutdown.recv() => {
                            tracing::info!("Pub/Sub subscriber stopped during backoff");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn run_subscription(
        &mut self,
        cmd_rx: &mut mpsc::UnboundedReceiver<String>,
    ) -> anyhow::Result<()> {
        let mut pubsub = self.client.get_async_pubsub().await?;

        // Re-establish every channel that has callbacks registered
        let channels: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        for channel in &channels {
            pubsub.subscribe(channel).await?;
        }

        tracing::info!(channels = channels.len(), "Pub/Sub subscription established");

        loop {
            // The message stream mutably borrows the pub/sub
            // connection, so it is scoped per iteration and dropped
            // before any dynamic subscribe call.
            let event = {
                let mut stream = pubsub.on_message();
                tokio::select! {
                    msg = stream.next() => SubscriberEvent::Message(msg),
                    cmd = cmd_rx.recv() => SubscriberEvent::Subscribe(cmd),
                    _ = self.shutdown.recv() => SubscriberEvent::Shutdown,
                }
            };

            match event {
                SubscriberEvent::Message(Some(msg)) => self.dispatch(&msg),
                SubscriberEvent::Message(None) => {
                    anyhow::bail!("message stream ended");
                }
                SubscriberEvent::Subscribe(Some(channel)) => {
                    pubsub.subscribe(&channel).await?;
                    tracing::debug!(channel = %channel, "Subscribed to channel");
                }
                SubscriberEvent::Subscribe(None) => {
                    // Bus dropped; nothing left to serve
                    return Ok(());
                }
                SubscriberEvent::Shutdown => {
                    return Ok(());
                }
            }
        }
    }

    /// Deliver one message to the callbacks registered for its
    /// channel. A payload that fails to parse is logged and dropped;
    /// it must not unsubscribe the channel or end the listener.
    fn dispatch(&self, msg: &redis::Msg) {
        let channel = msg.get_channel_name().to_string();

        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Failed to read message payload");
                return;
            }
        };

        let Some(handlers) = self.handlers.get(&channel) else {
            return;
        };

        let message: serde_json::Value = match serde_json::from_str(&payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    channel = %channel,
                    error = %e,
                    "Dropping unparseable message"
                );
                return;
            }
        };

        for handler in handlers.iter() {
            handler(message.clone());
            PUBSUB_DELIVERED_TOTAL.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    fn bus() -> RedisMessageBus {
        let manager = Arc::new(RedisConnectionManager::new(RedisConfig::default()).unwrap());
        RedisMessageBus::new(manager)
    }

    #[tokio::test]
    async fn test_subscribe_registers_callback() {
        let bus = bus();
        bus.subscribe("match-events", Arc::new(|_| {})).await.unwrap();

        assert_eq!(bus.subscribed_channels(), 1);
        assert!(bus.handlers.contains_key("match-events"));

        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_subscribe_reuses_task() {
        let bus = bus();
        bus.subscribe("a", Arc::new(|_| {})).await.unwrap();
        bus.subscribe("b", Arc::new(|_| {})).await.unwrap();

        assert_eq!(bus.subscribed_channels(), 2);
        // Only one command sender means only one subscriber task
        assert!(bus.subscriber.lock().await.is_some());

        bus.shutdown().await;
    }
}
