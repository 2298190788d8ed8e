//! Feed Connection State Tracking
//!
//! Shared view of the upstream link's lifecycle, read by the health endpoints
//! and written by the feed client.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of the upstream feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection; a reconnect may be pending.
    Disconnected,
    /// Dialing and performing the WebSocket handshake.
    Connecting,
    /// Link established; ticks are flowing.
    Connected,
    /// Shutting down on purpose; reconnection is suppressed.
    ClosingIntentional,
}

impl ConnectionState {
    /// Whether the upstream link is currently usable.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

// =============================================================================
// Feed Status
// =============================================================================

/// Tracks the state of the upstream feed connection.
///
/// Counters use relaxed atomics; they feed health reporting, not control
/// flow.
#[derive(Debug)]
pub struct FeedStatus {
    state: parking_lot::RwLock<ConnectionState>,
    last_connected_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    last_error: parking_lot::RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
    ticks_received: AtomicU64,
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedStatus {
    /// Create a new tracker in the disconnected state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: parking_lot::RwLock::new(ConnectionState::Disconnected),
            last_connected_at: parking_lot::RwLock::new(None),
            last_error: parking_lot::RwLock::new(None),
            reconnect_attempts: AtomicU32::new(0),
            messages_received: AtomicU64::new(0),
            ticks_received: AtomicU64::new(0),
        }
    }

    /// Set the connection state.
    ///
    /// Entering `Connected` clears the error and resets the reconnect
    /// attempt counter.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Record a connection error without changing counters.
    pub fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Increment the reconnect attempt counter.
    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the inbound frame counter.
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the tick counter by a batch size.
    pub fn record_ticks(&self, count: u64) {
        self.ticks_received.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Point-in-time view for the health endpoints.
    #[must_use]
    pub fn snapshot(&self) -> FeedStatusSnapshot {
        FeedStatusSnapshot {
            state: *self.state.read(),
            connected: self.state().is_connected(),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            ticks_received: self.ticks_received.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of [`FeedStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatusSnapshot {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Convenience flag for clients that only care about up/down.
    pub connected: bool,
    /// When the link last came up.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent connection error, cleared on reconnect.
    pub last_error: Option<String>,
    /// Attempts since the link last came up.
    pub reconnect_attempts: u32,
    /// Total inbound frames this process lifetime.
    pub messages_received: u64,
    /// Total trade ticks this process lifetime.
    pub ticks_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let status = FeedStatus::new();
        assert_eq!(status.state(), ConnectionState::Disconnected);
        assert!(!status.snapshot().connected);
    }

    #[test]
    fn connected_resets_attempts_and_error() {
        let status = FeedStatus::new();
        status.set_error("dial failed".to_string());
        status.record_reconnect_attempt();
        status.record_reconnect_attempt();

        status.set_state(ConnectionState::Connected);

        let snap = status.snapshot();
        assert!(snap.connected);
        assert_eq!(snap.reconnect_attempts, 0);
        assert!(snap.last_error.is_none());
        assert!(snap.last_connected_at.is_some());
    }

    #[test]
    fn disconnect_preserves_counters() {
        let status = FeedStatus::new();
        status.set_state(ConnectionState::Connected);
        status.record_message();
        status.record_ticks(3);

        status.set_state(ConnectionState::Disconnected);

        let snap = status.snapshot();
        assert_eq!(snap.messages_received, 1);
        assert_eq!(snap.ticks_received, 3);
        assert!(!snap.connected);
    }

    #[test]
    fn intentional_close_is_not_connected() {
        let status = FeedStatus::new();
        status.set_state(ConnectionState::Connected);
        status.set_state(ConnectionState::ClosingIntentional);
        assert!(!status.state().is_connected());
    }

    #[test]
    fn snapshot_serializes_state_snake_case() {
        let status = FeedStatus::new();
        status.set_state(ConnectionState::Connecting);
        let json = serde_json::to_value(status.snapshot()).unwrap();
        assert_eq!(json["state"], "connecting");
    }
}
