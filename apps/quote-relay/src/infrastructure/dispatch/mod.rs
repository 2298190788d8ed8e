//! Feed Event Dispatcher
//!
//! The glue between the upstream feed client and the downstream surfaces:
//! trade ticks land in the latest-quote cache and fan out to every
//! interested subscriber; connectivity changes become status events for
//! all of them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::quote::{Quote, QuoteCache};
use crate::infrastructure::broadcast::SharedRegistry;
use crate::infrastructure::feed::client::FeedEvent;
use crate::infrastructure::metrics;

/// Consume feed events until the channel closes.
///
/// Runs as its own task for the process lifetime. A full subscriber channel
/// drops the update for that subscriber only; the dispatcher itself never
/// blocks on a slow consumer.
#[allow(clippy::cast_precision_loss)]
pub async fn dispatch_events(
    mut rx: mpsc::Receiver<FeedEvent>,
    cache: Arc<QuoteCache>,
    registry: SharedRegistry,
) {
    while let Some(event) = rx.recv().await {
        match event {
            FeedEvent::Connected => {
                info!("upstream feed connected");
                metrics::set_feed_connected(true);
                registry.broadcast_status(true);
            }
            FeedEvent::Disconnected => {
                warn!("upstream feed disconnected");
                metrics::set_feed_connected(false);
                registry.broadcast_status(false);
            }
            FeedEvent::Reconnecting { attempt } => {
                info!(attempt, "upstream feed reconnecting");
                metrics::record_feed_reconnect();
            }
            FeedEvent::Trade(tick) => {
                cache.upsert(&tick.symbol, tick.price, tick.timestamp);
                metrics::record_ticks_received(1);

                let quote = Quote::new(tick.symbol, tick.price, tick.timestamp);
                let outcome = registry.broadcast(&quote);
                metrics::record_events_delivered(outcome.delivered as u64);
                if outcome.dropped > 0 {
                    metrics::record_events_dropped(outcome.dropped as u64);
                }
                metrics::set_subscribers(registry.subscriber_count() as f64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::subscription::InterestSet;
    use crate::infrastructure::broadcast::{RegistryConfig, StreamEvent, SubscriberRegistry};
    use crate::infrastructure::feed::messages::TradeTick;

    fn tick(symbol: &str, price: Decimal, ts: i64) -> FeedEvent {
        FeedEvent::Trade(TradeTick {
            symbol: symbol.to_string(),
            price,
            timestamp: ts,
            volume: None,
        })
    }

    #[tokio::test]
    async fn trade_events_update_cache_and_reach_subscribers() {
        let cache = Arc::new(QuoteCache::new());
        let registry: SharedRegistry =
            Arc::new(SubscriberRegistry::new(RegistryConfig::default()));
        let (id, mut sub_rx) = registry.register(InterestSet::All);
        let (tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(dispatch_events(rx, Arc::clone(&cache), registry.clone()));

        tx.send(tick("AAPL", Decimal::new(18231, 2), 1)).await.unwrap();

        let event = sub_rx.recv().await.unwrap();
        assert!(matches!(
            event,
            StreamEvent::Quote(q) if q.symbol == "AAPL" && q.ts == 1
        ));
        assert_eq!(cache.get("AAPL").unwrap().price, Decimal::new(18231, 2));

        registry.unregister(id);
        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn later_trade_overwrites_the_cached_quote() {
        let cache = Arc::new(QuoteCache::new());
        let registry: SharedRegistry =
            Arc::new(SubscriberRegistry::new(RegistryConfig::default()));
        let (tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(dispatch_events(rx, Arc::clone(&cache), registry));

        tx.send(tick("AAPL", Decimal::new(100, 0), 1)).await.unwrap();
        tx.send(tick("AAPL", Decimal::new(101, 0), 2)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let quote = cache.get("AAPL").unwrap();
        assert_eq!(quote.price, Decimal::new(101, 0));
        assert_eq!(quote.ts, 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn connectivity_changes_become_status_events() {
        let cache = Arc::new(QuoteCache::new());
        let registry: SharedRegistry =
            Arc::new(SubscriberRegistry::new(RegistryConfig::default()));
        let (id, mut sub_rx) = registry.register(InterestSet::All);
        let (tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(dispatch_events(rx, cache, registry.clone()));

        tx.send(FeedEvent::Connected).await.unwrap();
        tx.send(FeedEvent::Disconnected).await.unwrap();

        assert!(matches!(
            sub_rx.recv().await.unwrap(),
            StreamEvent::FeedStatus { connected: true }
        ));
        assert!(matches!(
            sub_rx.recv().await.unwrap(),
            StreamEvent::FeedStatus { connected: false }
        ));

        registry.unregister(id);
        drop(tx);
        handle.await.unwrap();
    }
}
