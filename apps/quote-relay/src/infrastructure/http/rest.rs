//! REST Endpoints
//!
//! The snapshot, health, and metrics handlers. The snapshot endpoint backs
//! initial page renders; the probes are shaped for container orchestrators.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::SharedAppState;
use crate::domain::quote::Symbol;
use crate::infrastructure::feed::state::FeedStatusSnapshot;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "ok" while serving, "degraded" when the upstream
    /// link is down.
    pub status: HealthStatus,
    /// Relay version.
    pub version: &'static str,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Configured symbol universe.
    pub symbols: Vec<Symbol>,
    /// Upstream feed status.
    pub feed: FeedStatusSnapshot,
    /// Connected downstream subscribers.
    pub subscribers: usize,
    /// Symbols with at least one interested party.
    pub active_symbols: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serving with a live upstream link.
    Ok,
    /// Serving from cache; upstream link is down.
    Degraded,
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /prices/now` - snapshot of all cached quotes, sorted by symbol.
pub async fn snapshot_handler(State(state): State<SharedAppState>) -> impl IntoResponse {
    Json(state.cache.snapshot())
}

/// `GET /health` - JSON health status.
///
/// Always 200: a relay with a down upstream still serves cached snapshots,
/// so it reports degraded rather than failing the check.
pub async fn health_handler(State(state): State<SharedAppState>) -> impl IntoResponse {
    let feed = state.feed_status.snapshot();
    let status = if feed.connected {
        HealthStatus::Ok
    } else {
        HealthStatus::Degraded
    };

    let subscription_stats = state.subscriptions.stats();

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        symbols: state.universe.clone(),
        feed,
        subscribers: state.registry.subscriber_count(),
        active_symbols: subscription_stats.symbol_count,
    })
}

/// `GET /healthz` - liveness probe.
pub async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// `GET /readyz` - readiness probe.
///
/// Ready as soon as the HTTP server is serving. Upstream connectivity is
/// deliberately not gated here: restarts would not fix a provider outage,
/// and the relay still serves cached data while reconnecting.
pub async fn readiness_handler() -> impl IntoResponse {
    (StatusCode::OK, "READY")
}

/// `GET /metrics` - Prometheus metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serialization() {
        assert_eq!(serde_json::to_string(&HealthStatus::Ok).unwrap(), "\"ok\"");
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }
}
