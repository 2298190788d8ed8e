//! Relay Configuration Settings
//!
//! Configuration types for the quote relay, loaded from environment
//! variables. Only the upstream API token is required; everything else has
//! a sensible default.

use std::time::Duration;

use crate::domain::quote::Symbol;

/// Default upstream feed WebSocket URL.
pub const DEFAULT_FEED_URL: &str = "wss://ws.finnhub.io";

/// Default symbol universe subscribed at startup.
pub const DEFAULT_SYMBOLS: &str = "AAPL,MSFT,GOOGL,TSLA";

// =============================================================================
// Feed Settings
// =============================================================================

/// Upstream feed connection settings.
#[derive(Clone)]
pub struct FeedSettings {
    /// WebSocket URL without the token query parameter.
    pub url: String,
    /// Provider API token.
    pub token: String,
    /// Symbol universe subscribed at startup regardless of client interest.
    pub universe: Vec<Symbol>,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before the link is considered dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            token: String::new(),
            universe: split_symbols(DEFAULT_SYMBOLS),
            heartbeat_interval: Duration::from_secs(20),
            heartbeat_timeout: Duration::from_secs(40),
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

impl std::fmt::Debug for FeedSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSettings")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("universe", &self.universe)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("heartbeat_timeout", &self.heartbeat_timeout)
            .field("reconnect_delay_initial", &self.reconnect_delay_initial)
            .field("reconnect_delay_max", &self.reconnect_delay_max)
            .field(
                "reconnect_delay_multiplier",
                &self.reconnect_delay_multiplier,
            )
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .finish()
    }
}

// =============================================================================
// Server Settings
// =============================================================================

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP port serving SSE, WebSocket, and REST endpoints.
    pub port: u16,
    /// SSE keepalive interval when no quotes are flowing.
    pub sse_keepalive: Duration,
    /// Ping interval for idle downstream WebSocket connections.
    pub ws_ping_interval: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            sse_keepalive: Duration::from_secs(15),
            ws_ping_interval: Duration::from_secs(15),
        }
    }
}

impl ServerSettings {
    /// Socket address string for binding.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Broadcast Settings
// =============================================================================

/// Fan-out channel settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Per-subscriber channel capacity.
    pub subscriber_capacity: usize,
    /// Feed event channel capacity between client and dispatcher.
    pub event_capacity: usize,
    /// Command channel capacity toward the feed client.
    pub command_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            subscriber_capacity: 256,
            event_capacity: 4_096,
            command_capacity: 64,
        }
    }
}

// =============================================================================
// Relay Configuration
// =============================================================================

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream feed settings.
    pub feed: FeedSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Fan-out channel settings.
    pub broadcast: BroadcastSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `FINNHUB_TOKEN` is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("FINNHUB_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("FINNHUB_TOKEN".to_string()))?;

        if token.is_empty() {
            return Err(ConfigError::EmptyValue("FINNHUB_TOKEN".to_string()));
        }

        let defaults = FeedSettings::default();
        let feed = FeedSettings {
            url: std::env::var("FEED_WS_URL").unwrap_or(defaults.url),
            token,
            universe: std::env::var("SYMBOLS")
                .map_or(defaults.universe, |s| split_symbols(&s)),
            heartbeat_interval: parse_env_duration_secs(
                "QUOTE_RELAY_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_env_duration_secs(
                "QUOTE_RELAY_HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "QUOTE_RELAY_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "QUOTE_RELAY_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "QUOTE_RELAY_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_env_u32(
                "QUOTE_RELAY_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
        };

        let server = ServerSettings {
            host: std::env::var("QUOTE_RELAY_HOST")
                .unwrap_or_else(|_| ServerSettings::default().host),
            port: parse_env_u16("QUOTE_RELAY_PORT", ServerSettings::default().port),
            sse_keepalive: parse_env_duration_secs(
                "QUOTE_RELAY_SSE_KEEPALIVE_SECS",
                ServerSettings::default().sse_keepalive,
            ),
            ws_ping_interval: parse_env_duration_secs(
                "QUOTE_RELAY_WS_PING_INTERVAL_SECS",
                ServerSettings::default().ws_ping_interval,
            ),
        };

        let broadcast = BroadcastSettings {
            subscriber_capacity: parse_env_usize(
                "QUOTE_RELAY_SUBSCRIBER_CAPACITY",
                BroadcastSettings::default().subscriber_capacity,
            ),
            event_capacity: parse_env_usize(
                "QUOTE_RELAY_EVENT_CAPACITY",
                BroadcastSettings::default().event_capacity,
            ),
            command_capacity: parse_env_usize(
                "QUOTE_RELAY_COMMAND_CAPACITY",
                BroadcastSettings::default().command_capacity,
            ),
        };

        Ok(Self {
            feed,
            server,
            broadcast,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Split a comma-separated symbol list, trimming and uppercasing entries.
fn split_symbols(raw: &str) -> Vec<Symbol> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_settings_defaults() {
        let settings = FeedSettings::default();
        assert_eq!(settings.url, "wss://ws.finnhub.io");
        assert_eq!(settings.universe, vec!["AAPL", "MSFT", "GOOGL", "TSLA"]);
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(settings.reconnect_delay_max, Duration::from_secs(30));
        assert_eq!(settings.max_reconnect_attempts, 0);
    }

    #[test]
    fn server_settings_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.sse_keepalive, Duration::from_secs(15));
        assert_eq!(settings.ws_ping_interval, Duration::from_secs(15));
        assert_eq!(settings.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn broadcast_settings_defaults() {
        let settings = BroadcastSettings::default();
        assert_eq!(settings.subscriber_capacity, 256);
        assert_eq!(settings.event_capacity, 4_096);
    }

    #[test]
    fn token_redacted_in_debug() {
        let settings = FeedSettings {
            token: "super-secret".to_string(),
            ..FeedSettings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn split_symbols_trims_and_uppercases() {
        assert_eq!(
            split_symbols(" aapl, MSFT ,googl,,TSLA "),
            vec!["AAPL", "MSFT", "GOOGL", "TSLA"]
        );
    }

    #[test]
    fn split_symbols_empty_input() {
        assert!(split_symbols("").is_empty());
        assert!(split_symbols(" , ,").is_empty());
    }
}
