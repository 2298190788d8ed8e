//! Configuration module for the quote relay.

mod settings;

pub use settings::{
    BroadcastSettings, ConfigError, FeedSettings, RelayConfig, ServerSettings,
};
