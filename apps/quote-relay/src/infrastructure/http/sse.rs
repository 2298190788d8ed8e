//! SSE Delivery Adapter
//!
//! Streams every quote update as Server-Sent Events. Each connection first
//! receives a snapshot frame with all cached quotes so clients can render
//! immediately, then individual quote updates as they arrive. Comment-only
//! keepalives go out on idle so proxies do not reap the connection.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::SharedAppState;
use crate::domain::quote::Quote;
use crate::domain::subscription::InterestSet;
use crate::infrastructure::broadcast::{SharedRegistry, StreamEvent, SubscriberId};

// =============================================================================
// Frames
// =============================================================================

/// The initial snapshot frame sent to every new SSE client.
#[derive(Debug, Serialize)]
struct SnapshotFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    data: Vec<Quote>,
}

/// A typed quote update frame.
#[derive(Debug, Serialize)]
struct QuoteFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    quote: Quote,
}

/// Upstream connectivity notice, interleaved with quote updates.
#[derive(Debug, Serialize)]
struct StatusFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    connected: bool,
}

fn format_event(event: StreamEvent) -> Option<Event> {
    match event {
        StreamEvent::Quote(quote) => serde_json::to_string(&QuoteFrame {
            kind: "quote",
            quote,
        })
        .ok()
        .map(|json| Event::default().data(json)),
        StreamEvent::FeedStatus { connected } => serde_json::to_string(&StatusFrame {
            kind: "status",
            connected,
        })
        .ok()
        .map(|json| Event::default().data(json)),
    }
}

// =============================================================================
// Subscriber Stream
// =============================================================================

/// Unregisters the subscriber when the response stream is dropped.
struct UnregisterGuard {
    registry: SharedRegistry,
    id: SubscriberId,
}

impl Drop for UnregisterGuard {
    fn drop(&mut self) {
        debug!(subscriber_id = self.id, "SSE client disconnected");
        self.registry.unregister(self.id);
    }
}

/// Adapts the subscriber's channel receiver into a `Stream`, carrying the
/// unregister guard for the connection's lifetime.
struct SubscriberStream {
    rx: mpsc::Receiver<StreamEvent>,
    _guard: UnregisterGuard,
}

impl Stream for SubscriberStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

// =============================================================================
// Handler
// =============================================================================

/// `GET /prices/stream` - SSE stream of all quote updates.
pub async fn stream_handler(
    State(state): State<SharedAppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // SSE clients get the full firehose; symbol filtering is the
    // WebSocket adapter's job.
    let (id, rx) = state.registry.register(InterestSet::All);
    debug!(subscriber_id = id, "SSE client connected");

    let snapshot = SnapshotFrame {
        kind: "snapshot",
        data: state.cache.snapshot(),
    };
    let first = stream::iter(
        serde_json::to_string(&snapshot)
            .ok()
            .map(|json| Event::default().data(json)),
    );

    let updates = SubscriberStream {
        rx,
        _guard: UnregisterGuard {
            registry: state.registry.clone(),
            id,
        },
    }
    .filter_map(|event| async move { format_event(event) });

    Sse::new(first.chain(updates).map(Ok))
        .keep_alive(KeepAlive::new().interval(state.sse_keepalive).text("keepalive"))
}
