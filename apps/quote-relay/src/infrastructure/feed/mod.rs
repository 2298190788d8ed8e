//! Upstream Feed Infrastructure
//!
//! WebSocket client for the upstream price-tick feed, including the wire
//! codec, heartbeat monitoring, reconnection policy, and connection state
//! tracking.

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod state;
