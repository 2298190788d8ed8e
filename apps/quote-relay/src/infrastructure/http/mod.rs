//! HTTP Server
//!
//! Serves every downstream surface on one port:
//!
//! - `GET /prices/now` - JSON snapshot of all cached quotes
//! - `GET /prices/stream` - SSE stream (snapshot first, then updates)
//! - `GET /ws/quotes` - bidirectional WebSocket with per-symbol subscriptions
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe
//! - `GET /metrics` - Prometheus metrics in text format

pub mod rest;
pub mod sse;
pub mod ws;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::quote::{QuoteCache, Symbol};
use crate::domain::subscription::SubscriptionManager;
use crate::infrastructure::broadcast::SharedRegistry;
use crate::infrastructure::feed::client::FeedCommand;
use crate::infrastructure::feed::state::FeedStatus;

// =============================================================================
// Shared State
// =============================================================================

/// State shared by every HTTP handler.
pub struct AppState {
    /// Latest-quote cache.
    pub cache: Arc<QuoteCache>,
    /// Downstream subscriber registry.
    pub registry: SharedRegistry,
    /// Refcounted interest tracking.
    pub subscriptions: Arc<SubscriptionManager>,
    /// Upstream link status for health reporting.
    pub feed_status: Arc<FeedStatus>,
    /// Command channel toward the feed client.
    pub command_tx: mpsc::Sender<FeedCommand>,
    /// Configured symbol universe, reported by `/health`.
    pub universe: Vec<Symbol>,
    /// SSE keepalive interval.
    pub sse_keepalive: Duration,
    /// Ping interval for idle WebSocket connections.
    pub ws_ping_interval: Duration,
    /// Process start time for uptime reporting.
    pub started_at: Instant,
}

/// Shared application state reference.
pub type SharedAppState = Arc<AppState>;

/// Build the full router over the shared state.
#[must_use]
pub fn build_router(state: SharedAppState) -> Router {
    Router::new()
        .route("/prices/now", get(rest::snapshot_handler))
        .route("/prices/stream", get(sse::stream_handler))
        .route("/ws/quotes", get(ws::upgrade_handler))
        .route("/health", get(rest::health_handler))
        .route("/healthz", get(rest::liveness_handler))
        .route("/readyz", get(rest::readiness_handler))
        .route("/metrics", get(rest::metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to the configured address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(String, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

/// HTTP server hosting all downstream endpoints.
pub struct HttpServer {
    bind_addr: String,
    state: SharedAppState,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server.
    #[must_use]
    pub const fn new(bind_addr: String, state: SharedAppState, cancel: CancellationToken) -> Self {
        Self {
            bind_addr,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server encounters
    /// a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = build_router(self.state);

        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.bind_addr.clone(), e.to_string()))?;

        tracing::info!(addr = %self.bind_addr, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
