//! Feed Wire Codec
//!
//! JSON encoding and decoding for the upstream price-tick WebSocket feed.
//! Inbound frames are dispatched on their `type` field; outbound frames are
//! plain serde serialization.

use crate::infrastructure::feed::messages::{FeedMessage, TradeTick};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the upstream feed.
///
/// Decode failures are reported to the caller; the client logs and drops the
/// frame rather than tearing down the connection, since a single malformed
/// frame must never interrupt the stream.
#[derive(Debug, Default, Clone)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a JSON text frame into a `FeedMessage`.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON parsing fails, the `type` field is missing,
    /// or the type is not one the relay understands.
    pub fn decode(&self, text: &str) -> Result<FeedMessage, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        let Some(msg_type) = value.get("type").and_then(|v| v.as_str()) else {
            return Err(CodecError::InvalidFormat(
                "missing \"type\" field".to_string(),
            ));
        };

        match msg_type {
            "trade" => {
                let Some(data) = value.get("data") else {
                    return Err(CodecError::InvalidFormat(
                        "trade message missing \"data\" array".to_string(),
                    ));
                };
                let ticks: Vec<TradeTick> = serde_json::from_value(data.clone())?;
                Ok(FeedMessage::Trade(ticks))
            }
            "ping" => Ok(FeedMessage::Ping),
            "error" => {
                let msg = value
                    .get("msg")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unspecified")
                    .to_string();
                Ok(FeedMessage::Error(msg))
            }
            other => Err(CodecError::UnknownMessageType(other.to_string())),
        }
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use test_case::test_case;

    use super::*;
    use crate::infrastructure::feed::messages::SubscriptionFrame;

    #[test]
    fn decode_trade_batch() {
        let codec = FeedCodec::new();
        let json = r#"{"type":"trade","data":[
            {"s":"AAPL","p":182.31,"t":1697040000000,"v":5},
            {"s":"MSFT","p":410.05,"t":1697040000100}
        ]}"#;

        let msg = codec.decode(json).unwrap();
        match msg {
            FeedMessage::Trade(ticks) => {
                assert_eq!(ticks.len(), 2);
                assert_eq!(ticks[0].symbol, "AAPL");
                assert_eq!(ticks[0].price, Decimal::new(18231, 2));
                assert_eq!(ticks[1].symbol, "MSFT");
                assert_eq!(ticks[1].volume, None);
            }
            other => panic!("expected trade message, got {other:?}"),
        }
    }

    #[test]
    fn decode_trade_empty_batch() {
        let codec = FeedCodec::new();
        let msg = codec.decode(r#"{"type":"trade","data":[]}"#).unwrap();
        assert_eq!(msg, FeedMessage::Trade(vec![]));
    }

    #[test]
    fn decode_ping() {
        let codec = FeedCodec::new();
        let msg = codec.decode(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, FeedMessage::Ping);
    }

    #[test]
    fn decode_error_message() {
        let codec = FeedCodec::new();
        let msg = codec
            .decode(r#"{"type":"error","msg":"Subscribing to too many symbols"}"#)
            .unwrap();
        assert_eq!(
            msg,
            FeedMessage::Error("Subscribing to too many symbols".to_string())
        );
    }

    #[test]
    fn decode_unknown_type_is_error() {
        let codec = FeedCodec::new();
        let result = codec.decode(r#"{"type":"news","data":[]}"#);
        assert!(matches!(result, Err(CodecError::UnknownMessageType(t)) if t == "news"));
    }

    #[test_case("not json at all" ; "invalid json")]
    #[test_case(r#"{"data":[]}"# ; "missing type field")]
    #[test_case(r#"{"type":"trade"}"# ; "trade without data array")]
    #[test_case(r#"{"type":"trade","data":[{"s":"AAPL","t":1}]}"# ; "tick missing price")]
    fn decode_rejects_bad_frames(input: &str) {
        assert!(FeedCodec::new().decode(input).is_err());
    }

    #[test]
    fn encode_subscribe_frame() {
        let codec = FeedCodec::new();
        let json = codec.encode(&SubscriptionFrame::subscribe("AAPL")).unwrap();
        assert_eq!(json, r#"{"type":"subscribe","symbol":"AAPL"}"#);
    }
}
