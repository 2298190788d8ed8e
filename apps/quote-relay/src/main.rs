//! Quote Relay Binary
//!
//! Starts the real-time quote distribution engine.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FINNHUB_TOKEN`: upstream feed API token
//!
//! ## Optional
//! - `FEED_WS_URL`: upstream WebSocket URL (default: wss://ws.finnhub.io)
//! - `SYMBOLS`: comma-separated startup universe (default: AAPL,MSFT,GOOGL,TSLA)
//! - `QUOTE_RELAY_HOST`: bind address (default: 0.0.0.0)
//! - `QUOTE_RELAY_PORT`: HTTP port (default: 8080)
//! - `QUOTE_RELAY_SSE_KEEPALIVE_SECS`: SSE keepalive interval (default: 15)
//! - `QUOTE_RELAY_WS_PING_INTERVAL_SECS`: idle WebSocket ping interval (default: 15)
//! - `QUOTE_RELAY_SUBSCRIBER_CAPACITY`: per-subscriber channel capacity (default: 256)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;
use std::time::Instant;

use quote_relay::infrastructure::metrics;
use quote_relay::{
    AppState, ConnectionId, FeedClient, FeedClientConfig, FeedEvent, FeedStatus, HttpServer,
    QuoteCache, RegistryConfig, RelayConfig, SharedRegistry, SubscriberRegistry,
    SubscriptionManager, dispatch_events, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Reserved connection id holding the configured symbol universe, so client
/// unsubscribes can never drop universe symbols upstream. Real connections
/// get registry ids starting at 1.
const UNIVERSE_CONNECTION: ConnectionId = 0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();
    init_tracing();

    tracing::info!("Starting Quote Relay");

    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Core shared state
    let cache = Arc::new(QuoteCache::new());
    let registry: SharedRegistry = Arc::new(SubscriberRegistry::new(RegistryConfig {
        channel_capacity: config.broadcast.subscriber_capacity,
    }));
    let subscription_manager = Arc::new(SubscriptionManager::new());
    let feed_status = Arc::new(FeedStatus::new());

    // The universe is held by a reserved connection so its refcounts are
    // permanent for the process lifetime.
    let _ = subscription_manager.add_interest(UNIVERSE_CONNECTION, &config.feed.universe);
    #[allow(clippy::cast_precision_loss)]
    metrics::set_active_symbols(subscription_manager.stats().symbol_count as f64);

    // Channels between the feed client and the rest of the relay
    let (event_tx, event_rx) = mpsc::channel::<FeedEvent>(config.broadcast.event_capacity);
    let (command_tx, command_rx) = mpsc::channel(config.broadcast.command_capacity);

    // Feed client
    let feed_client = FeedClient::new(
        FeedClientConfig::from_feed_settings(&config.feed),
        subscription_manager.active_symbols(),
        event_tx,
        command_rx,
        Arc::clone(&feed_status),
        shutdown_token.clone(),
    );

    tokio::spawn(async move {
        if let Err(e) = feed_client.run().await {
            tracing::error!(error = %e, "feed client error");
        }
    });

    // Dispatcher: feed events into the cache and out to subscribers
    tokio::spawn(dispatch_events(
        event_rx,
        Arc::clone(&cache),
        Arc::clone(&registry),
    ));

    // HTTP server
    let app_state = Arc::new(AppState {
        cache,
        registry,
        subscriptions: subscription_manager,
        feed_status,
        command_tx,
        universe: config.feed.universe.clone(),
        sse_keepalive: config.server.sse_keepalive,
        ws_ping_interval: config.server.ws_ping_interval,
        started_at: Instant::now(),
    });
    let http_server = HttpServer::new(
        config.server.bind_addr(),
        app_state,
        shutdown_token.clone(),
    );

    tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Quote relay ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Quote relay stopped");
    Ok(())
}

/// Initialize tracing with an env-filtered fmt subscriber.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        feed_url = %config.feed.url,
        symbols = config.feed.universe.len(),
        port = config.server.port,
        sse_keepalive_secs = config.server.sse_keepalive.as_secs(),
        subscriber_capacity = config.broadcast.subscriber_capacity,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
