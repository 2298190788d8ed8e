//! Upstream Feed Message Types
//!
//! Wire format types for the upstream price-tick WebSocket feed. These types
//! map directly to the provider's JSON message schemas.
//!
//! # Message Types
//!
//! ## Inbound
//! - `Trade`: batch of trade ticks, each carrying symbol, price, timestamp
//! - `Ping`: provider liveness probe
//! - `Error`: provider-side error report
//!
//! ## Outbound
//! - `subscribe` / `unsubscribe`: per-symbol subscription control
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"type":"trade","data":[{"s":"AAPL","p":182.31,"t":1697040000000,"v":10}]}
//! {"type":"subscribe","symbol":"AAPL"}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Inbound Messages
// =============================================================================

/// A single trade tick within a trade batch.
///
/// Field names follow the provider's compact wire schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    /// Ticker symbol.
    #[serde(rename = "s")]
    pub symbol: String,

    /// Trade price.
    #[serde(rename = "p", with = "rust_decimal::serde::float")]
    pub price: Decimal,

    /// Trade timestamp in epoch milliseconds.
    #[serde(rename = "t")]
    pub timestamp: i64,

    /// Trade volume, when the provider includes it.
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

/// A message received from the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Batch of trade ticks.
    Trade(Vec<TradeTick>),
    /// Provider liveness probe; must be answered to keep the link open.
    Ping,
    /// Provider-side error report.
    Error(String),
}

// =============================================================================
// Outbound Messages
// =============================================================================

/// A subscription control frame sent to the upstream feed.
///
/// The provider accepts exactly one symbol per frame, so batch changes are
/// sent as a sequence of frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFrame {
    /// Control action: `subscribe` or `unsubscribe`.
    #[serde(rename = "type")]
    pub action: SubscriptionAction,

    /// The symbol the action applies to.
    pub symbol: String,
}

/// Subscription control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    /// Begin receiving ticks for the symbol.
    Subscribe,
    /// Stop receiving ticks for the symbol.
    Unsubscribe,
}

impl SubscriptionFrame {
    /// Create a subscribe frame for one symbol.
    #[must_use]
    pub fn subscribe(symbol: impl Into<String>) -> Self {
        Self {
            action: SubscriptionAction::Subscribe,
            symbol: symbol.into(),
        }
    }

    /// Create an unsubscribe frame for one symbol.
    #[must_use]
    pub fn unsubscribe(symbol: impl Into<String>) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            symbol: symbol.into(),
        }
    }
}

/// Pong reply to a provider ping.
#[derive(Debug, Clone, Serialize)]
pub struct PongFrame {
    /// Always `pong`.
    #[serde(rename = "type")]
    pub msg_type: &'static str,
}

impl PongFrame {
    /// Create a pong frame.
    #[must_use]
    pub const fn new() -> Self {
        Self { msg_type: "pong" }
    }
}

impl Default for PongFrame {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_wire_format() {
        let frame = SubscriptionFrame::subscribe("AAPL");
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"subscribe","symbol":"AAPL"}"#);
    }

    #[test]
    fn unsubscribe_frame_wire_format() {
        let frame = SubscriptionFrame::unsubscribe("TSLA");
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"unsubscribe","symbol":"TSLA"}"#);
    }

    #[test]
    fn trade_tick_deserializes_compact_fields() {
        let json = r#"{"s":"AAPL","p":182.31,"t":1697040000000,"v":10}"#;
        let tick: TradeTick = serde_json::from_str(json).unwrap();

        assert_eq!(tick.symbol, "AAPL");
        assert_eq!(tick.price, Decimal::new(18231, 2));
        assert_eq!(tick.timestamp, 1_697_040_000_000);
        assert_eq!(tick.volume, Some(10));
    }

    #[test]
    fn trade_tick_volume_is_optional() {
        let json = r#"{"s":"AAPL","p":182.31,"t":1697040000000}"#;
        let tick: TradeTick = serde_json::from_str(json).unwrap();
        assert_eq!(tick.volume, None);
    }

    #[test]
    fn pong_frame_wire_format() {
        let json = serde_json::to_string(&PongFrame::new()).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }
}
