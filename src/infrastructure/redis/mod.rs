//! Redis connection layer
//!
//! Supervises the shared multiplexed connection and the dedicated
//! publisher connection, with linear-backoff retry at initialization
//! and lazy reconnect on the error classes that warrant it.

mod manager;

pub use manager::RedisConnectionManager;

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};

/// Get current time in milliseconds since epoch
pub(crate) fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Lifecycle states of the backing-store connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection established yet, or `disconnect` was called
    Disconnected = 0,
    /// A connection attempt is in flight
    Connecting = 1,
    /// Connected and the liveness probe succeeded
    Connected = 2,
    /// `initialize` exhausted its retries
    Failed = 3,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

/// Lock-free tracker for the connection lifecycle.
///
/// Updated by the connection manager on every transition so that
/// callers observe a degraded (rather than silently broken) service
/// after the connection is lost.
pub struct ConnectionHealth {
    state: AtomicU8,
    last_connected: AtomicI64,
    connect_attempts: AtomicU32,
    total_reconnections: AtomicU32,
}

impl ConnectionHealth {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            last_connected: AtomicI64::new(0),
            connect_attempts: AtomicU32::new(0),
            total_reconnections: AtomicU32::new(0),
        }
    }

    /// Mark a connection attempt as started
    pub fn set_connecting(&self) {
        self.state
            .store(ConnectionState::Connecting as u8, Ordering::Release);
        self.connect_attempts.fetch_add(1, Ordering::AcqRel);
    }

    /// Mark the connection as established
    pub fn set_connected(&self) {
        let was_connected =
            self.state.load(Ordering::Acquire) == ConnectionState::Connected as u8;
        self.state
            .store(ConnectionState::Connected as u8, Ordering::Release);

        // A nonzero previous timestamp means this connect replaces an
        // earlier one; the first connect is not a reconnection.
        let previously_connected_ms = self
            .last_connected
            .swap(current_time_ms(), Ordering::AcqRel);

        if !was_connected && previously_connected_ms > 0 {
            self.total_reconnections.fetch_add(1, Ordering::AcqRel);
        }
        self.connect_attempts.store(0, Ordering::Release);
    }

    /// Mark the connection as lost or closed
    pub fn set_disconnected(&self) {
        self.state
            .store(ConnectionState::Disconnected as u8, Ordering::Release);
    }

    /// Mark initialization as terminally failed
    pub fn set_failed(&self) {
        self.state
            .store(ConnectionState::Failed as u8, Ordering::Release);
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Get a statistics snapshot
    pub fn stats(&self) -> ConnectionHealthStats {
        ConnectionHealthStats {
            state: self.state(),
            last_connected_ms: self.last_connected.load(Ordering::Acquire),
            connect_attempts: self.connect_attempts.load(Ordering::Acquire),
            total_reconnections: self.total_reconnections.load(Ordering::Acquire),
        }
    }
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection health statistics
#[derive(Debug, Clone)]
pub struct ConnectionHealthStats {
    pub state: ConnectionState,
    pub last_connected_ms: i64,
    pub connect_attempts: u32,
    pub total_reconnections: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_disconnected() {
        let health = ConnectionHealth::new();
        assert_eq!(health.state(), ConnectionState::Disconnected);
        assert!(!health.is_connected());
    }

    #[test]
    fn test_connect_lifecycle() {
        let health = ConnectionHealth::new();

        health.set_connecting();
        assert_eq!(health.state(), ConnectionState::Connecting);
        assert_eq!(health.stats().connect_attempts, 1);

        health.set_connected();
        assert!(health.is_connected());
        assert_eq!(health.stats().connect_attempts, 0);
        assert!(health.stats().last_connected_ms > 0);
    }

    #[test]
    fn test_failed_is_terminal_until_reinitialized() {
        let health = ConnectionHealth::new();

        health.set_connecting();
        health.set_failed();
        assert_eq!(health.state(), ConnectionState::Failed);
        assert!(!health.is_connected());
    }

    #[test]
    fn test_reconnection_counter() {
        let health = ConnectionHealth::new();

        health.set_connecting();
        health.set_connected();
        assert_eq!(health.stats().total_reconnections, 0);

        health.set_disconnected();
        health.set_connecting();
        health.set_connected();
        assert_eq!(health.stats().total_reconnections, 1);
    }

    #[test]
    fn test_first_connect_is_not_a_reconnection() {
        let health = ConnectionHealth::new();

        health.set_connecting();
        health.set_connected();
        assert_eq!(health.stats().total_reconnections, 0);

        // Re-asserting an already-connected state changes nothing
        health.set_connected();
        assert_eq!(health.stats().total_reconnections, 0);
    }
}
