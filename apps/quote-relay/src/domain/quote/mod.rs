//! Quote Cache
//!
//! The shared latest-quote store: a concurrent-safe mapping from symbol to
//! the most recently received quote. Written exclusively by the upstream feed
//! dispatch path; read by delivery adapters (initial snapshots), the REST
//! snapshot endpoint, and in-process consumers pricing against last trades.
//!
//! # Semantics
//!
//! Last-write-wins: a newer upsert always replaces the stored quote,
//! regardless of timestamp ordering. The upstream feed's delivery order is
//! unspecified, so out-of-order ticks are stored as-is rather than rejected.
//! Entries are never deleted during the process lifetime.

use std::collections::HashMap;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A symbol string (canonical uppercase ticker).
pub type Symbol = String;

// =============================================================================
// Quote
// =============================================================================

/// The latest known trade price for a ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Canonical uppercase ticker symbol.
    pub symbol: Symbol,

    /// Last trade price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,

    /// Trade timestamp in epoch milliseconds.
    pub ts: i64,
}

impl Quote {
    /// Create a new quote.
    #[must_use]
    pub const fn new(symbol: Symbol, price: Decimal, ts: i64) -> Self {
        Self { symbol, price, ts }
    }
}

// =============================================================================
// Quote Cache
// =============================================================================

/// Concurrent-safe latest-quote store.
///
/// One writer (the feed dispatcher), many readers. Pure in-memory state with
/// no durability guarantee; replaceable on restart.
///
/// # Example
///
/// ```rust
/// use quote_relay::domain::quote::QuoteCache;
/// use rust_decimal::Decimal;
///
/// let cache = QuoteCache::new();
/// cache.upsert("AAPL", Decimal::new(18231, 2), 1_697_040_000_000);
///
/// let quote = cache.get("AAPL").unwrap();
/// assert_eq!(quote.ts, 1_697_040_000_000);
/// ```
#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: RwLock<HashMap<Symbol, Quote>>,
}

impl QuoteCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the quote for a symbol (last-write-wins).
    pub fn upsert(&self, symbol: &str, price: Decimal, ts: i64) {
        let quote = Quote::new(symbol.to_string(), price, ts);
        self.quotes.write().insert(symbol.to_string(), quote);
    }

    /// Get the latest quote for a symbol, if any.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Quote> {
        self.quotes.read().get(symbol).cloned()
    }

    /// Get the latest quotes for multiple symbols.
    ///
    /// The result preserves input order; symbols without a cached quote map
    /// to `None`. This is the synchronous batch read for in-process callers
    /// that price against the latest trades.
    #[must_use]
    pub fn get_many(&self, symbols: &[Symbol]) -> Vec<Option<Quote>> {
        let quotes = self.quotes.read();
        symbols.iter().map(|s| quotes.get(s).cloned()).collect()
    }

    /// Get all cached quotes, sorted by symbol.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Quote> {
        let mut all: Vec<Quote> = self.quotes.read().values().cloned().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    /// Number of distinct symbols currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    /// Check whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
