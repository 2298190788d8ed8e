//! Heartbeat Monitor
//!
//! Watches the upstream feed link for silence. Periodically asks the client
//! loop to send a WebSocket ping and declares the link dead when no inbound
//! frame arrives within the timeout, which triggers reconnection.
//!
//! Any inbound frame counts as liveness, not just pongs: during active market
//! hours the tick stream itself proves the link is healthy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping probes.
    pub ping_interval: Duration,
    /// Silence duration after a probe before the link is declared dead.
    pub probe_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            probe_timeout: Duration::from_secs(20),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            ping_interval,
            probe_timeout,
        }
    }

    /// Create configuration from feed settings.
    #[must_use]
    pub const fn from_feed_settings(settings: &crate::FeedSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            probe_timeout: settings.heartbeat_timeout,
        }
    }
}

/// Events emitted by the heartbeat monitor.
#[derive(Debug, Clone)]
pub enum HeartbeatEvent {
    /// Request to send a ping frame.
    SendPing,
    /// Silence exceeded the timeout; the connection should be restarted.
    Timeout,
}

/// Liveness state shared between the monitor and the client read loop.
#[derive(Debug)]
pub struct HeartbeatState {
    last_activity: RwLock<Instant>,
    awaiting_reply: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: RwLock::new(Instant::now()),
            awaiting_reply: AtomicBool::new(false),
        }
    }

    /// Record an inbound frame of any kind.
    pub fn record_activity(&self) {
        *self.last_activity.write() = Instant::now();
        self.awaiting_reply.store(false, Ordering::SeqCst);
    }

    /// Mark that a probe was sent and a reply is expected.
    pub fn mark_probe_sent(&self) {
        self.awaiting_reply.store(true, Ordering::SeqCst);
    }

    /// Check whether a probe is outstanding.
    #[must_use]
    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply.load(Ordering::SeqCst)
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn silence(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Reset for a fresh connection.
    pub fn reset(&self) {
        *self.last_activity.write() = Instant::now();
        self.awaiting_reply.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn backdate(&self, by: Duration) {
        if let Some(past) = Instant::now().checked_sub(by) {
            *self.last_activity.write() = past;
        }
    }
}

/// Heartbeat monitor task.
///
/// Runs until cancelled or a timeout is detected. The client loop owns the
/// socket, so the monitor only emits events; the loop sends the actual ping
/// and tears the connection down on [`HeartbeatEvent::Timeout`].
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a new heartbeat monitor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run the monitoring loop.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("heartbeat monitor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.check_and_probe().await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Returns `Err(())` when the loop should exit.
    async fn check_and_probe(&self) -> Result<(), ()> {
        if self.state.is_awaiting_reply() {
            let silence = self.state.silence();
            if silence > self.config.probe_timeout {
                tracing::warn!(
                    silence_secs = silence.as_secs(),
                    timeout_secs = self.config.probe_timeout.as_secs(),
                    "upstream feed heartbeat timeout"
                );
                let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
                return Err(());
            }
        }

        if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
            tracing::debug!("heartbeat event channel closed");
            return Err(());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_starts_alive() {
        let state = HeartbeatState::new();
        assert!(!state.is_awaiting_reply());
        assert!(state.silence() < Duration::from_millis(100));
    }

    #[test]
    fn activity_clears_outstanding_probe() {
        let state = HeartbeatState::new();
        state.mark_probe_sent();
        assert!(state.is_awaiting_reply());

        state.record_activity();
        assert!(!state.is_awaiting_reply());
    }

    #[test]
    fn reset_clears_probe() {
        let state = HeartbeatState::new();
        state.mark_probe_sent();

        state.reset();
        assert!(!state.is_awaiting_reply());
    }

    #[tokio::test]
    async fn monitor_emits_ping_requests() {
        let config = HeartbeatConfig::new(Duration::from_millis(50), Duration::from_secs(1));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let monitor = HeartbeatMonitor::new(config, state, event_tx, cancel.clone());
        let handle = tokio::spawn(monitor.run());

        let event = tokio::time::timeout(Duration::from_millis(200), event_rx.recv())
            .await
            .expect("should receive event")
            .expect("channel should not close");
        assert!(matches!(event, HeartbeatEvent::SendPing));

        cancel.cancel();
        handle.await.expect("task should complete");
    }

    #[tokio::test]
    async fn monitor_detects_silence() {
        let config = HeartbeatConfig::new(Duration::from_millis(50), Duration::from_millis(100));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        state.mark_probe_sent();
        state.backdate(Duration::from_millis(200));

        let monitor = HeartbeatMonitor::new(config, state, event_tx, cancel.clone());
        let handle = tokio::spawn(monitor.run());

        let mut saw_timeout = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(500), event_rx.recv()).await
        {
            if matches!(event, HeartbeatEvent::Timeout) {
                saw_timeout = true;
                break;
            }
        }
        assert!(saw_timeout, "should emit timeout event");

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_millis(100), handle).await;
    }

    #[tokio::test]
    async fn monitor_stops_on_cancellation() {
        let config = HeartbeatConfig::new(Duration::from_secs(10), Duration::from_secs(10));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, _event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let monitor = HeartbeatMonitor::new(config, state, event_tx, cancel.clone());
        let handle = tokio::spawn(monitor.run());

        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok(), "monitor should shut down on cancellation");
    }
}
