//! Prometheus Metrics Module
//!
//! Exposes relay metrics in Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: counts of ticks received from the feed and delivered downstream
//! - **Connections**: upstream link state and downstream client counts
//! - **Drops**: events discarded because a subscriber channel was full
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "quote_relay_ticks_received_total",
        "Total trade ticks received from the upstream feed"
    );
    describe_counter!(
        "quote_relay_events_delivered_total",
        "Total events delivered to downstream subscribers"
    );
    describe_counter!(
        "quote_relay_events_dropped_total",
        "Total events dropped because a subscriber channel was full"
    );
    describe_counter!(
        "quote_relay_feed_reconnects_total",
        "Total upstream reconnection attempts"
    );
    describe_counter!(
        "quote_relay_malformed_frames_total",
        "Total malformed client control frames rejected"
    );

    describe_gauge!(
        "quote_relay_feed_connected",
        "Whether the upstream feed link is established (1 or 0)"
    );
    describe_gauge!(
        "quote_relay_subscribers",
        "Number of connected downstream subscribers"
    );
    describe_gauge!(
        "quote_relay_active_symbols",
        "Number of symbols in the upstream subscription set"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record ticks received from the upstream feed.
pub fn record_ticks_received(count: u64) {
    counter!("quote_relay_ticks_received_total").increment(count);
}

/// Record events delivered to downstream subscribers.
pub fn record_events_delivered(count: u64) {
    counter!("quote_relay_events_delivered_total").increment(count);
}

/// Record events dropped because of slow consumers.
pub fn record_events_dropped(count: u64) {
    counter!("quote_relay_events_dropped_total").increment(count);
}

/// Record an upstream reconnection attempt.
pub fn record_feed_reconnect() {
    counter!("quote_relay_feed_reconnects_total").increment(1);
}

/// Record a malformed control frame from a WebSocket client.
pub fn record_malformed_frame() {
    counter!("quote_relay_malformed_frames_total").increment(1);
}

/// Update the upstream link gauge.
pub fn set_feed_connected(connected: bool) {
    gauge!("quote_relay_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the downstream subscriber count.
pub fn set_subscribers(count: f64) {
    gauge!("quote_relay_subscribers").set(count);
}

/// Update the upstream subscription set size.
pub fn set_active_symbols(count: f64) {
    gauge!("quote_relay_active_symbols").set(count);
}
