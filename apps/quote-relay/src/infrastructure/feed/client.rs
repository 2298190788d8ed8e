//! Upstream Feed WebSocket Client
//!
//! Maintains the single WebSocket connection to the upstream price-tick
//! provider. Handles the subscription protocol, heartbeat monitoring, and
//! automatic reconnection with exponential backoff.
//!
//! # Protocol
//!
//! Inbound frames are JSON objects dispatched on their `type` field; outbound
//! subscription control is one `{"type":"subscribe","symbol":...}` frame per
//! symbol. After every reconnect the client replays a subscribe frame for
//! each symbol in its desired set, so upstream state always converges on the
//! union of downstream interest.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{CodecError, FeedCodec};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
use super::messages::{FeedMessage, PongFrame, SubscriptionFrame};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::state::{ConnectionState, FeedStatus};
use crate::domain::quote::Symbol;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Connection closed by the provider.
    #[error("connection closed")]
    ConnectionClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Events and Commands
// =============================================================================

/// Events emitted by the feed client toward the dispatcher.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Link established and desired subscriptions replayed.
    Connected,
    /// Link lost; reconnection may follow.
    Disconnected,
    /// Reconnection attempt starting after backoff.
    Reconnecting {
        /// Attempt number since the last successful connection.
        attempt: u32,
    },
    /// A trade tick arrived.
    Trade(super::messages::TradeTick),
}

/// Commands accepted by the feed client.
///
/// Sent by the subscription layer when the refcounted interest set crosses
/// a 0→1 or 1→0 boundary for some symbols.
#[derive(Debug, Clone)]
pub enum FeedCommand {
    /// Add symbols to the upstream subscription set.
    Subscribe(Vec<Symbol>),
    /// Remove symbols from the upstream subscription set.
    Unsubscribe(Vec<Symbol>),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket URL without the token query parameter.
    pub url: String,
    /// Provider API token, appended as `?token=`.
    pub token: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl FeedClientConfig {
    /// Create a new configuration with default reconnect and heartbeat
    /// behavior.
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Create configuration from feed settings.
    #[must_use]
    pub fn from_feed_settings(settings: &crate::FeedSettings) -> Self {
        Self {
            url: settings.url.clone(),
            token: settings.token.clone(),
            reconnect: ReconnectConfig::from_feed_settings(settings),
            heartbeat: HeartbeatConfig::from_feed_settings(settings),
        }
    }

    /// Full dial endpoint including the token.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}?token={}", self.url, self.token)
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// Upstream feed WebSocket client.
///
/// Owns the command receiver and the desired-symbol set. The desired set is
/// authoritative: subscription frames are best-effort while connected, and
/// the whole set is replayed after every reconnect.
pub struct FeedClient {
    config: FeedClientConfig,
    codec: FeedCodec,
    desired: HashSet<Symbol>,
    event_tx: mpsc::Sender<FeedEvent>,
    command_rx: mpsc::Receiver<FeedCommand>,
    status: Arc<FeedStatus>,
    cancel: CancellationToken,
}

impl FeedClient {
    /// Create a new feed client.
    ///
    /// `initial_symbols` seeds the desired set before the first connection;
    /// the relay passes the configured symbol universe here.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        initial_symbols: Vec<Symbol>,
        event_tx: mpsc::Sender<FeedEvent>,
        command_rx: mpsc::Receiver<FeedCommand>,
        status: Arc<FeedStatus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: FeedCodec::new(),
            desired: initial_symbols.into_iter().collect(),
            event_tx,
            command_rx,
            status,
            cancel,
        }
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error only when the reconnect budget is exhausted; with
    /// the default unlimited budget this runs for the process lifetime.
    pub async fn run(mut self) -> Result<(), FeedClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                info!("feed client cancelled");
                self.status.set_state(ConnectionState::ClosingIntentional);
                return Ok(());
            }

            self.status.set_state(ConnectionState::Connecting);

            match self.connect_and_run(&mut policy).await {
                Ok(()) => {
                    info!("feed connection closed gracefully");
                    self.status.set_state(ConnectionState::ClosingIntentional);
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "feed connection error");
                    self.status.set_state(ConnectionState::Disconnected);
                    self.status.set_error(e.to_string());
                    let _ = self.event_tx.send(FeedEvent::Disconnected).await;

                    let Some(delay) = policy.next_delay() else {
                        return Err(FeedClientError::MaxReconnectAttemptsExceeded);
                    };

                    let attempt = policy.attempt_count();
                    self.status.record_reconnect_attempt();
                    info!(attempt, delay_ms = delay.as_millis(), "reconnecting to feed");
                    let _ = self.event_tx.send(FeedEvent::Reconnecting { attempt }).await;

                    if !self.backoff(delay).await {
                        info!("feed client cancelled during reconnect delay");
                        self.status.set_state(ConnectionState::ClosingIntentional);
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sleep out the backoff delay while still absorbing subscription
    /// commands, so the desired set is current at reconnect time.
    ///
    /// Returns `false` when cancelled.
    async fn backoff(&mut self, delay: std::time::Duration) -> bool {
        let deadline = tokio::time::Instant::now() + delay;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                () = tokio::time::sleep_until(deadline) => return true,
                cmd = self.command_rx.recv() => {
                    if let Some(cmd) = cmd {
                        self.apply_command_offline(&cmd);
                    } else {
                        // Command channel closed; just finish the sleep.
                        tokio::select! {
                            () = self.cancel.cancelled() => return false,
                            () = tokio::time::sleep_until(deadline) => return true,
                        }
                    }
                }
            }
        }
    }

    /// Update the desired set without a live connection.
    fn apply_command_offline(&mut self, cmd: &FeedCommand) {
        match cmd {
            FeedCommand::Subscribe(symbols) => {
                for s in symbols {
                    self.desired.insert(s.clone());
                }
            }
            FeedCommand::Unsubscribe(symbols) => {
                for s in symbols {
                    self.desired.remove(s);
                }
            }
        }
    }

    /// Connect and run until error or cancellation.
    async fn connect_and_run(
        &mut self,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedClientError> {
        info!(url = %self.config.url, "connecting to upstream feed");

        let (ws_stream, _response) =
            tokio_tungstenite::connect_async(self.config.endpoint()).await?;

        let (mut write, mut read) = ws_stream.split();

        // Connection is up; reset backoff and replay the desired set.
        policy.reset();
        self.status.set_state(ConnectionState::Connected);

        let desired: Vec<Symbol> = self.desired.iter().cloned().collect();
        for symbol in &desired {
            self.send_frame(&mut write, &SubscriptionFrame::subscribe(symbol.clone()))
                .await?;
        }
        info!(symbols = desired.len(), "feed subscriptions replayed");
        let _ = self.event_tx.send(FeedEvent::Connected).await;

        // Heartbeat monitor for this connection only.
        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = CancellationToken::new();
        let monitor = HeartbeatMonitor::new(
            self.config.heartbeat.clone(),
            Arc::clone(&heartbeat_state),
            heartbeat_tx,
            heartbeat_cancel.clone(),
        );
        let _monitor_handle = tokio::spawn(monitor.run());

        let result = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    break Ok(());
                }
                heartbeat_event = heartbeat_rx.recv() => {
                    match heartbeat_event {
                        Some(HeartbeatEvent::SendPing) => {
                            heartbeat_state.mark_probe_sent();
                            write.send(Message::Ping(vec![].into())).await?;
                        }
                        Some(HeartbeatEvent::Timeout) => {
                            warn!("feed heartbeat timeout");
                            break Err(FeedClientError::ConnectionClosed);
                        }
                        None => {
                            debug!("heartbeat channel closed");
                        }
                    }
                }
                cmd = self.command_rx.recv() => {
                    if let Some(cmd) = cmd {
                        self.handle_command(cmd, &mut write).await?;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat_state.record_activity();
                            self.status.record_message();
                            self.handle_text_frame(&text, &mut write).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat_state.record_activity();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            heartbeat_state.record_activity();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("feed sent close frame");
                            break Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Ignore binary and other frame types
                        }
                        Some(Err(e)) => {
                            break Err(e.into());
                        }
                        None => {
                            info!("feed stream ended");
                            break Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        };

        heartbeat_cancel.cancel();
        result
    }

    /// Apply a subscription command and push the frames upstream.
    async fn handle_command<W>(
        &mut self,
        cmd: FeedCommand,
        write: &mut W,
    ) -> Result<(), FeedClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        match cmd {
            FeedCommand::Subscribe(symbols) => {
                for symbol in symbols {
                    if self.desired.insert(symbol.clone()) {
                        debug!(symbol = %symbol, "subscribing upstream");
                        self.send_frame(write, &SubscriptionFrame::subscribe(symbol))
                            .await?;
                    }
                }
            }
            FeedCommand::Unsubscribe(symbols) => {
                for symbol in symbols {
                    if self.desired.remove(&symbol) {
                        debug!(symbol = %symbol, "unsubscribing upstream");
                        self.send_frame(write, &SubscriptionFrame::unsubscribe(symbol))
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Handle one inbound text frame.
    ///
    /// Malformed frames are logged and dropped; they never tear the
    /// connection down.
    async fn handle_text_frame<W>(&self, text: &str, write: &mut W) -> Result<(), FeedClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let message = match self.codec.decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping malformed feed frame");
                return Ok(());
            }
        };

        match message {
            FeedMessage::Trade(ticks) => {
                self.status.record_ticks(ticks.len() as u64);
                for tick in ticks {
                    if tick.symbol.is_empty() {
                        debug!("dropping tick with empty symbol");
                        continue;
                    }
                    let _ = self.event_tx.send(FeedEvent::Trade(tick)).await;
                }
            }
            FeedMessage::Ping => {
                self.send_frame(write, &PongFrame::new()).await?;
            }
            FeedMessage::Error(msg) => {
                warn!(msg = %msg, "feed reported error");
            }
        }

        Ok(())
    }

    /// Serialize and send one JSON frame.
    async fn send_frame<W, T>(&self, write: &mut W, frame: &T) -> Result<(), FeedClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
        T: serde::Serialize,
    {
        let json = self.codec.encode(frame)?;
        write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| FeedClientError::ConnectionFailed(format!("failed to send frame: {e}")))
    }

    /// Symbols currently in the desired upstream set.
    #[must_use]
    pub fn desired_symbols(&self) -> Vec<Symbol> {
        self.desired.iter().cloned().collect()
    }
}
