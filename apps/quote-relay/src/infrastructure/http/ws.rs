//! WebSocket Delivery Adapter
//!
//! Bidirectional per-client quote streaming. Clients declare interest with
//! a `symbols` query parameter and adjust it live with subscribe and
//! unsubscribe control frames; the relay pushes bare quote objects for
//! exactly the symbols the client holds.
//!
//! # Client Protocol
//!
//! ```json
//! {"type":"subscribe","symbols":["AAPL","MSFT"]}
//! {"type":"unsubscribe","symbols":["AAPL"]}
//! ```
//!
//! Outbound quote frames are `{"symbol":...,"price":...,"ts":...}`.
//! Malformed control frames get `{"error":...}` back; the connection stays
//! open.

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SharedAppState;
use crate::domain::quote::Symbol;
use crate::domain::subscription::{InterestSet, SubscriptionChanges};
use crate::infrastructure::broadcast::{StreamEvent, SubscriberId};
use crate::infrastructure::feed::client::FeedCommand;
use crate::infrastructure::metrics;

// =============================================================================
// Frames
// =============================================================================

/// Control frames accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlFrame {
    /// Add symbols to this connection's interest set.
    Subscribe {
        #[serde(default)]
        symbols: Vec<String>,
    },
    /// Remove symbols from this connection's interest set.
    Unsubscribe {
        #[serde(default)]
        symbols: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct ErrorFrame {
    error: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    status: &'static str,
}

impl StatusFrame {
    const fn connected() -> Self {
        Self {
            kind: "status",
            status: "connected",
        }
    }

    const fn disconnected() -> Self {
        Self {
            kind: "status",
            status: "disconnected",
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

/// Query parameters for the WebSocket endpoint.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Comma-separated initial symbol list.
    symbols: Option<String>,
}

/// `GET /ws/quotes` - upgrade to a quote-streaming WebSocket.
pub async fn upgrade_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<SharedAppState>,
) -> impl IntoResponse {
    let initial = normalize_symbols(
        query
            .symbols
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::to_string),
    );
    ws.on_upgrade(move |socket| handle_socket(socket, state, initial))
}

async fn handle_socket(mut socket: WebSocket, state: SharedAppState, initial: Vec<Symbol>) {
    let mut interests: HashSet<Symbol> = initial.iter().cloned().collect();
    let (id, mut rx) = state
        .registry
        .register(InterestSet::Symbols(interests.clone()));
    debug!(subscriber_id = id, symbols = initial.len(), "WebSocket client connected");

    let changes = state.subscriptions.add_interest(id, &initial);
    push_changes(&state, changes).await;

    if send_json(&mut socket, &StatusFrame::connected()).await.is_err() {
        cleanup(&state, id).await;
        return;
    }

    // Initial state: replay cached quotes for the symbols the client asked
    // for up front, before any live updates.
    for quote in state.cache.get_many(&initial).into_iter().flatten() {
        if send_json(&mut socket, &quote).await.is_err() {
            cleanup(&state, id).await;
            return;
        }
    }

    let mut ping_interval = tokio::time::interval(state.ws_ping_interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; consume it so pings start one
    // interval from now.
    ping_interval.tick().await;

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(StreamEvent::Quote(quote)) => {
                        if send_json(&mut socket, &quote).await.is_err() {
                            break;
                        }
                    }
                    Some(StreamEvent::FeedStatus { connected }) => {
                        let frame = if connected {
                            StatusFrame::connected()
                        } else {
                            StatusFrame::disconnected()
                        };
                        if send_json(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_control_frame(&mut socket, &state, id, &mut interests, &text)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Pings are answered by the framework; ignore the rest
                    }
                    Some(Err(e)) => {
                        debug!(subscriber_id = id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    debug!(subscriber_id = id, "WebSocket client disconnected");
    cleanup(&state, id).await;
}

/// Apply one inbound control frame.
///
/// Returns `Err(())` only when the socket itself fails; protocol errors are
/// reported to the client and swallowed.
async fn handle_control_frame(
    socket: &mut WebSocket,
    state: &SharedAppState,
    id: SubscriberId,
    interests: &mut HashSet<Symbol>,
    text: &str,
) -> Result<(), ()> {
    let frame: ControlFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(subscriber_id = id, error = %e, "malformed control frame");
            metrics::record_malformed_frame();
            return send_json(
                socket,
                &ErrorFrame {
                    error: "invalid control frame",
                },
            )
            .await;
        }
    };

    match frame {
        ControlFrame::Subscribe { symbols } => {
            let added: Vec<Symbol> = normalize_symbols(symbols.into_iter())
                .into_iter()
                .filter(|s| interests.insert(s.clone()))
                .collect();

            if !added.is_empty() {
                state
                    .registry
                    .set_interest(id, InterestSet::Symbols(interests.clone()));
                let changes = state.subscriptions.add_interest(id, &added);
                push_changes(state, changes).await;
            }
        }
        ControlFrame::Unsubscribe { symbols } => {
            let removed: Vec<Symbol> = normalize_symbols(symbols.into_iter())
                .into_iter()
                .filter(|s| interests.remove(s))
                .collect();

            if !removed.is_empty() {
                state
                    .registry
                    .set_interest(id, InterestSet::Symbols(interests.clone()));
                let changes = state.subscriptions.remove_interest(id, &removed);
                push_changes(state, changes).await;
            }
        }
    }

    Ok(())
}

/// Release everything the connection held.
async fn cleanup(state: &SharedAppState, id: SubscriberId) {
    state.registry.unregister(id);
    let changes = state.subscriptions.connection_closed(id);
    push_changes(state, changes).await;
}

/// Forward 0→1 and 1→0 transitions to the feed client.
async fn push_changes(state: &SharedAppState, changes: SubscriptionChanges) {
    if changes.is_empty() {
        return;
    }

    #[allow(clippy::cast_precision_loss)]
    metrics::set_active_symbols(state.subscriptions.stats().symbol_count as f64);

    if !changes.subscribe.is_empty() {
        let _ = state
            .command_tx
            .send(FeedCommand::Subscribe(changes.subscribe.into_iter().collect()))
            .await;
    }
    if !changes.unsubscribe.is_empty() {
        let _ = state
            .command_tx
            .send(FeedCommand::Unsubscribe(
                changes.unsubscribe.into_iter().collect(),
            ))
            .await;
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let Ok(json) = serde_json::to_string(value) else {
        return Ok(());
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

/// Trim, uppercase, and drop empty entries.
fn normalize_symbols(raw: impl Iterator<Item = String>) -> Vec<Symbol> {
    raw.map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
