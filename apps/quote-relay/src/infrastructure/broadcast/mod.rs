//! Subscriber Registry and Fan-Out
//!
//! Implements quote distribution to downstream delivery adapters using
//! per-subscriber bounded channels.
//!
//! # Architecture
//!
//! Each registered subscriber owns a bounded mpsc channel and an interest
//! set. The broadcast path iterates a snapshot of the registry, filters by
//! interest, and uses `try_send` so one slow consumer can never block the
//! feed dispatch path or any other subscriber. When a subscriber's channel
//! is full the update is dropped for that subscriber only; the cache still
//! holds the latest value, so a recovered consumer converges on the next
//! update for the symbol.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::domain::quote::Quote;
use crate::domain::subscription::InterestSet;

// =============================================================================
// Stream Events
// =============================================================================

/// Unique identifier for a registered subscriber.
pub type SubscriberId = u64;

/// An event delivered to downstream subscribers.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A fresh quote for one symbol.
    Quote(Quote),
    /// Upstream feed connectivity changed.
    FeedStatus {
        /// Whether the upstream link is currently established.
        connected: bool,
    },
}

// =============================================================================
// Subscriber Handle
// =============================================================================

/// Registry-side handle for one subscriber.
#[derive(Debug)]
struct SubscriberHandle {
    interest: RwLock<InterestSet>,
    sender: mpsc::Sender<StreamEvent>,
    dropped: AtomicU64,
}

impl SubscriberHandle {
    fn wants(&self, symbol: &str) -> bool {
        self.interest.read().matches(symbol)
    }
}

// =============================================================================
// Subscriber Registry
// =============================================================================

/// Configuration for the subscriber registry.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Per-subscriber channel capacity.
    pub channel_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Central registry of downstream subscribers.
///
/// Registration hands back a receiver that the delivery adapter (SSE or
/// WebSocket handler) drains at its own pace. The feed dispatcher calls
/// [`SubscriberRegistry::broadcast`] for every accepted quote.
///
/// # Example
///
/// ```rust
/// use quote_relay::infrastructure::broadcast::{RegistryConfig, StreamEvent, SubscriberRegistry};
/// use quote_relay::domain::quote::Quote;
/// use quote_relay::domain::subscription::InterestSet;
/// use rust_decimal::Decimal;
///
/// # tokio_test::block_on(async {
/// let registry = SubscriberRegistry::new(RegistryConfig::default());
/// let (id, mut rx) = registry.register(InterestSet::All);
///
/// registry.broadcast(&Quote::new("AAPL".to_string(), Decimal::new(18231, 2), 1));
///
/// let event = rx.recv().await.unwrap();
/// assert!(matches!(event, StreamEvent::Quote(q) if q.symbol == "AAPL"));
/// registry.unregister(id);
/// # });
/// ```
#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Arc<SubscriberHandle>>>,
    next_id: AtomicU64,
    config: RegistryConfig,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl SubscriberRegistry {
    /// Create a new registry with the given configuration.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Register a new subscriber with the given interest set.
    ///
    /// Returns the subscriber's identifier and the receiving half of its
    /// bounded channel. The caller must call [`SubscriberRegistry::unregister`]
    /// when the connection closes.
    #[must_use]
    pub fn register(&self, interest: InterestSet) -> (SubscriberId, mpsc::Receiver<StreamEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        let handle = Arc::new(SubscriberHandle {
            interest: RwLock::new(interest),
            sender: tx,
            dropped: AtomicU64::new(0),
        });

        self.subscribers.write().insert(id, handle);
        debug!(subscriber_id = id, "subscriber registered");

        (id, rx)
    }

    /// Remove a subscriber from the registry.
    ///
    /// Idempotent; unknown identifiers are ignored.
    pub fn unregister(&self, id: SubscriberId) {
        if self.subscribers.write().remove(&id).is_some() {
            debug!(subscriber_id = id, "subscriber unregistered");
        }
    }

    /// Replace a subscriber's interest set.
    ///
    /// Used by the WebSocket adapter when the client sends subscribe or
    /// unsubscribe control frames. Returns `false` for unknown identifiers.
    pub fn set_interest(&self, id: SubscriberId, interest: InterestSet) -> bool {
        if let Some(handle) = self.subscribers.read().get(&id) {
            *handle.interest.write() = interest;
            true
        } else {
            false
        }
    }

    /// Deliver a quote to every subscriber whose interest matches.
    ///
    /// Never blocks. Returns per-call delivery counts.
    pub fn broadcast(&self, quote: &Quote) -> BroadcastOutcome {
        let snapshot: Vec<(SubscriberId, Arc<SubscriberHandle>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();

        let mut outcome = BroadcastOutcome::default();

        for (id, handle) in snapshot {
            if !handle.wants(&quote.symbol) {
                outcome.skipped += 1;
                continue;
            }

            match handle.sender.try_send(StreamEvent::Quote(quote.clone())) {
                Ok(()) => outcome.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    let total = handle.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    trace!(
                        subscriber_id = id,
                        symbol = %quote.symbol,
                        total_dropped = total,
                        "subscriber channel full, quote dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Receiver went away without unregistering; reap it here.
                    outcome.closed += 1;
                    self.unregister(id);
                }
            }
        }

        outcome
    }

    /// Notify every subscriber of an upstream connectivity change.
    pub fn broadcast_status(&self, connected: bool) {
        let snapshot: Vec<Arc<SubscriberHandle>> =
            self.subscribers.read().values().map(Arc::clone).collect();

        for handle in snapshot {
            // Status frames are best-effort like quotes.
            let _ = handle.sender.try_send(StreamEvent::FeedStatus { connected });
        }
    }

    /// Number of currently registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Statistics over the current registry state.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let subscribers = self.subscribers.read();
        RegistryStats {
            subscriber_count: subscribers.len(),
            total_dropped: subscribers
                .values()
                .map(|h| h.dropped.load(Ordering::Relaxed))
                .sum(),
        }
    }
}

/// Shared registry reference.
pub type SharedRegistry = Arc<SubscriberRegistry>;

// =============================================================================
// Statistics
// =============================================================================

/// Delivery counts for one broadcast call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Subscribers that received the event.
    pub delivered: usize,
    /// Subscribers whose channel was full.
    pub dropped: usize,
    /// Subscribers whose interest did not match.
    pub skipped: usize,
    /// Subscribers found closed and reaped.
    pub closed: usize,
}

/// Statistics about the registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Number of registered subscribers.
    pub subscriber_count: usize,
    /// Cumulative events dropped due to full channels.
    pub total_dropped: u64,
}

// =============================================================================
// Tests
// =============================================================================
