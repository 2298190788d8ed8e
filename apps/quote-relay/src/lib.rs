#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Quote Relay - Real-Time Quote Distribution Engine
//!
//! Maintains a single WebSocket connection to an upstream price-tick feed
//! and fans quote updates out to many downstream streaming clients over
//! SSE and WebSocket, with a REST snapshot for initial renders.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core quote distribution types
//!   - `quote`: The `Quote` value type and the latest-quote cache
//!   - `subscription`: Refcounted symbol interest tracking
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Upstream WebSocket client (codec, heartbeat, reconnect)
//!   - `broadcast`: Per-subscriber bounded-channel fan-out
//!   - `dispatch`: Feed events into the cache and out to subscribers
//!   - `http`: SSE, WebSocket, and REST delivery
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus metrics
//!
//! # Data Flow
//!
//! ```text
//!                      ┌─────────────┐     ┌─────────────┐──► SSE client
//! Upstream feed WS ───►│ Quote cache │────►│ Subscriber  │──► WS client
//!                      │ (lww store) │     │  registry   │──► WS client
//!                      └─────────────┘     └─────────────┘
//! ```
//!
//! Slow consumers never block the feed: every subscriber has its own
//! bounded channel and full channels drop updates for that subscriber
//! only.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core quote distribution types with no transport
/// dependencies.
pub mod domain;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{Quote, QuoteCache, Symbol};
pub use domain::subscription::{
    ConnectionId, InterestSet, SubscriptionChanges, SubscriptionManager, SubscriptionStats,
};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, FeedSettings, RelayConfig, ServerSettings,
};

// Fan-out registry (for integration tests)
pub use infrastructure::broadcast::{
    BroadcastOutcome, RegistryConfig, RegistryStats, SharedRegistry, StreamEvent, SubscriberId,
    SubscriberRegistry,
};

// Feed event dispatcher
pub use infrastructure::dispatch::dispatch_events;

// Feed client (for integration tests)
pub use infrastructure::feed::client::{
    FeedClient, FeedClientConfig, FeedClientError, FeedCommand, FeedEvent,
};
pub use infrastructure::feed::state::{ConnectionState, FeedStatus, FeedStatusSnapshot};

// HTTP server
pub use infrastructure::http::{
    AppState, HttpServer, HttpServerError, SharedAppState, build_router,
};

// Metrics
pub use infrastructure::metrics::init_metrics;
