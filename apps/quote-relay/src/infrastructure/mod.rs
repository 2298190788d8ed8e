//! Infrastructure layer - Adapters and external integrations.

/// Fan-out to downstream subscribers.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Feed event dispatcher.
pub mod dispatch;

/// Upstream feed WebSocket client.
pub mod feed;

/// HTTP server (SSE, WebSocket, REST).
pub mod http;

/// Prometheus metrics.
pub mod metrics;
