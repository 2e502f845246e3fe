//! Connection manager for the shared Redis connections.
//!
//! One manager owns the general-purpose multiplexed connection and the
//! dedicated publisher connection; the subscriber connection is owned
//! by the pub/sub task. All callers share these handles.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{Client, ErrorKind, RedisError, RedisResult};
use tokio::sync::RwLock;

use crate::config::RedisConfig;
use crate::error::{CacheError, Result};

use super::ConnectionHealth;

/// Manages the process-wide Redis connections.
///
/// Connections are established lazily after the initial `initialize`
/// and re-established on the next call whenever an operation fails
/// with a connection-level error. Operations themselves are single
/// attempt; only `initialize` retries.
pub struct RedisConnectionManager {
    /// Redis client for creating connections
    client: Client,

    /// General-purpose multiplexed connection (shared across tasks)
    connection: RwLock<Option<MultiplexedConnection>>,

    /// Dedicated publisher connection
    publisher: RwLock<Option<MultiplexedConnection>>,

    /// Health tracker
    health: Arc<ConnectionHealth>,

    /// Configuration
    config: RedisConfig,
}

impl RedisConnectionManager {
    pub fn new(config: RedisConfig) -> Result<Self> {
        let client = Client::open(config.url())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            publisher: RwLock::new(None),
            health: Arc::new(ConnectionHealth::new()),
            config,
        })
    }

    /// Establish the general-purpose connection, retrying with linear
    /// backoff.
    ///
    /// Makes up to `max_retries` attempts, sleeping
    /// `retry_delay_ms * attempt` between failures. Each successful
    /// connect is probed with `PING` before the manager is marked
    /// connected. After exhausting retries the error names the attempt
    /// count and the health tracker reports a terminal failure.
    pub async fn initialize(&self) -> Result<()> {
        let max_retries = self.config.max_retries.max(1);
        let mut last_error: Option<RedisError> = None;

        for attempt in 1..=max_retries {
            self.health.set_connecting();

            match self.try_connect().await {
                Ok(conn) => {
                    *self.connection.write().await = Some(conn);
                    self.health.set_connected();
                    tracing::info!(
                        host = %self.config.host,
                        port = self.config.port,
                        db = self.config.db,
                        attempt = attempt,
                        "Redis connection established"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt,
                        max_retries = max_retries,
                        error = %e,
                        "Redis connection attempt failed"
                    );
                    last_error = Some(e);

                    if attempt < max_retries {
                        let delay = self.config.retry_delay_ms * attempt as u64;
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        self.health.set_failed();
        let source = last_error.unwrap_or_else(|| {
            RedisError::from((ErrorKind::IoError, "no connection attempt was made"))
        });
        tracing::error!(
            attempts = max_retries,
            "Giving up on Redis connection"
        );
        Err(CacheError::ConnectionFailed {
            attempts: max_retries,
            source,
        })
    }

    /// One connection attempt: TCP connect with timeout, then a
    /// liveness probe.
    async fn try_connect(&self) -> std::result::Result<MultiplexedConnection, RedisError> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let mut conn = match tokio::time::timeout(
            timeout,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(RedisError::from((
                    ErrorKind::IoError,
                    "connection attempt timed out",
                )))
            }
        };

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(conn)
    }

    /// Get the shared connection, re-establishing it if it was cleared
    /// by a previous connection-level failure.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        self.reconnect().await
    }

    /// Re-establish the shared connection (single attempt).
    async fn reconnect(&self) -> Result<MultiplexedConnection> {
        let mut conn_guard = self.connection.write().await;

        // Double-check in case another task connected while we waited
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        self.health.set_connecting();

        match self.try_connect().await {
            Ok(conn) => {
                *conn_guard = Some(conn.clone());
                self.health.set_connected();
                tracing::info!("Redis connection re-established");
                Ok(conn)
            }
            Err(e) => {
                self.health.set_disconnected();
                tracing::error!(error = %e, "Failed to reconnect to Redis");
                Err(CacheError::Redis(e))
            }
        }
    }

    /// Execute a Redis command on the shared connection.
    ///
    /// If the command fails with a connection-level error (dropped
    /// connection, IO error, or the read-only replica marker), the
    /// cached connection is cleared so the next caller reconnects.
    /// Other errors propagate without touching the connection.
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match f(conn).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if should_reconnect(&e) {
                    let mut conn_guard = self.connection.write().await;
                    *conn_guard = None;
                    self.health.set_disconnected();
                }
                Err(CacheError::Redis(e))
            }
        }
    }

    /// Get the dedicated publisher connection, establishing it on
    /// first use.
    pub async fn publisher(&self) -> Result<MultiplexedConnection> {
        {
            let conn = self.publisher.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let mut conn_guard = self.publisher.write().await;
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        let conn = self.try_connect().await.map_err(CacheError::Redis)?;
        *conn_guard = Some(conn.clone());
        tracing::debug!("Publisher connection established");
        Ok(conn)
    }

    /// Clear a broken publisher connection so the next publish
    /// reconnects.
    pub async fn clear_publisher(&self) {
        *self.publisher.write().await = None;
    }

    /// Ping Redis over the shared connection.
    pub async fn ping(&self) -> Result<()> {
        let _: String = self
            .execute(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }

    /// Drop all connections and mark the manager disconnected.
    pub async fn disconnect(&self) {
        *self.connection.write().await = None;
        *self.publisher.write().await = None;
        self.health.set_disconnected();
        tracing::info!("Redis connections closed");
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_connected()
    }

    pub fn health(&self) -> Arc<ConnectionHealth> {
        self.health.clone()
    }

    /// Client handle for the subscriber task's dedicated connection.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn key_prefix(&self) -> &str {
        &self.config.key_prefix
    }
}

/// Connection-level errors clear the cached connection; everything
/// else is left for the caller to handle.
///
/// The read-only marker covers failovers where a replica is still
/// answering writes with `READONLY`; reconnecting resolves against the
/// new primary.
fn should_reconnect(error: &RedisError) -> bool {
    if error.is_connection_dropped() || error.is_io_error() {
        return true;
    }
    error.kind() == ErrorKind::ReadOnly || error.to_string().contains("READONLY")
}
