//! Subscription Management Types
//!
//! Domain types for tracking which downstream connections are interested in
//! which symbols, and for reconciling the union of that interest against the
//! single upstream feed link.
//!
//! # Design
//!
//! The subscription manager keeps a per-symbol reference count across all
//! connections. The upstream link is subscribed to exactly the set of symbols
//! whose count is above zero: the 0→1 transition emits an upstream subscribe,
//! the 1→0 transition an unsubscribe. One connection dropping a symbol never
//! cuts off another connection that still holds interest in it.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::domain::quote::Symbol;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a downstream connection.
pub type ConnectionId = u64;

/// Which symbols a subscriber wants delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterestSet {
    /// Every symbol the relay sees (streaming snapshot clients).
    All,
    /// Exactly these symbols; an empty set delivers nothing.
    Symbols(HashSet<Symbol>),
}

impl InterestSet {
    /// Check whether an update for `symbol` should be delivered.
    #[must_use]
    pub fn matches(&self, symbol: &str) -> bool {
        match self {
            Self::All => true,
            Self::Symbols(set) => set.contains(symbol),
        }
    }

    /// Create an interest set from an iterator of symbols.
    #[must_use]
    pub fn symbols(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self::Symbols(symbols.into_iter().collect())
    }
}

// =============================================================================
// Subscription Changes
// =============================================================================

/// Changes that must be applied to the upstream subscription set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Symbols to subscribe to upstream.
    pub subscribe: HashSet<Symbol>,
    /// Symbols to unsubscribe from upstream.
    pub unsubscribe: HashSet<Symbol>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    /// Create changes with only subscribes.
    #[must_use]
    pub fn subscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: symbols.into_iter().collect(),
            unsubscribe: HashSet::new(),
        }
    }

    /// Create changes with only unsubscribes.
    #[must_use]
    pub fn unsubscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: HashSet::new(),
            unsubscribe: symbols.into_iter().collect(),
        }
    }
}

// =============================================================================
// Interest State
// =============================================================================

/// Interior state: per-connection symbol sets plus per-symbol refcounts.
#[derive(Debug, Default)]
struct InterestState {
    /// Map from connection ID to its declared symbols.
    connection_symbols: HashMap<ConnectionId, HashSet<Symbol>>,
    /// Map from symbol to reference count.
    symbol_refcount: HashMap<Symbol, usize>,
}

impl InterestState {
    /// Returns symbols whose refcount went 0→1.
    fn add(&mut self, connection: ConnectionId, symbols: &[Symbol]) -> Vec<Symbol> {
        let connection_set = self.connection_symbols.entry(connection).or_default();
        let mut new_upstream = Vec::new();

        for symbol in symbols {
            // Skip if this connection already holds the symbol
            if connection_set.contains(symbol) {
                continue;
            }

            connection_set.insert(symbol.clone());

            let refcount = self.symbol_refcount.entry(symbol.clone()).or_insert(0);
            *refcount += 1;

            if *refcount == 1 {
                new_upstream.push(symbol.clone());
            }
        }

        new_upstream
    }

    /// Returns symbols whose refcount went 1→0.
    fn remove(&mut self, connection: ConnectionId, symbols: &[Symbol]) -> Vec<Symbol> {
        let Some(connection_set) = self.connection_symbols.get_mut(&connection) else {
            return vec![];
        };

        let mut remove_upstream = Vec::new();

        for symbol in symbols {
            if !connection_set.remove(symbol) {
                continue;
            }

            if let Some(refcount) = self.symbol_refcount.get_mut(symbol) {
                *refcount = refcount.saturating_sub(1);

                if *refcount == 0 {
                    self.symbol_refcount.remove(symbol);
                    remove_upstream.push(symbol.clone());
                }
            }
        }

        if connection_set.is_empty() {
            self.connection_symbols.remove(&connection);
        }

        remove_upstream
    }

    /// Drop every symbol held by a connection. Returns 1→0 transitions.
    fn remove_connection(&mut self, connection: ConnectionId) -> Vec<Symbol> {
        let Some(connection_set) = self.connection_symbols.remove(&connection) else {
            return vec![];
        };

        let mut remove_upstream = Vec::new();

        for symbol in connection_set {
            if let Some(refcount) = self.symbol_refcount.get_mut(&symbol) {
                *refcount = refcount.saturating_sub(1);

                if *refcount == 0 {
                    self.symbol_refcount.remove(&symbol);
                    remove_upstream.push(symbol);
                }
            }
        }

        remove_upstream
    }

    fn active_symbols(&self) -> Vec<Symbol> {
        self.symbol_refcount.keys().cloned().collect()
    }

    fn connection_symbols(&self, connection: ConnectionId) -> Vec<Symbol> {
        self.connection_symbols
            .get(&connection)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// Subscription Manager
// =============================================================================

/// Reference-counted global subscription set.
///
/// Thread-safe reconciliation of all downstream interest against the single
/// upstream link. Refcount mutations and the decision to emit an upstream
/// subscribe/unsubscribe happen under one write lock, so concurrent
/// connections cannot lose updates.
///
/// # Example
///
/// ```rust
/// use quote_relay::domain::subscription::SubscriptionManager;
///
/// let manager = SubscriptionManager::new();
///
/// // Connection 1 declares interest in AAPL
/// let changes = manager.add_interest(1, &["AAPL".to_string()]);
/// assert!(changes.subscribe.contains("AAPL"));
///
/// // Connection 2 follows - no upstream change needed
/// let changes = manager.add_interest(2, &["AAPL".to_string()]);
/// assert!(changes.is_empty());
///
/// // Connection 1 drops AAPL - still held by connection 2
/// let changes = manager.remove_interest(1, &["AAPL".to_string()]);
/// assert!(changes.is_empty());
///
/// // Connection 2 drops it too - now unsubscribe upstream
/// let changes = manager.remove_interest(2, &["AAPL".to_string()]);
/// assert!(changes.unsubscribe.contains("AAPL"));
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    state: RwLock<InterestState>,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare interest in symbols for a connection.
    ///
    /// Returns the changes that must be applied upstream.
    pub fn add_interest(
        &self,
        connection: ConnectionId,
        symbols: &[Symbol],
    ) -> SubscriptionChanges {
        let new_symbols = self.state.write().add(connection, symbols);
        SubscriptionChanges::subscribe_only(new_symbols)
    }

    /// Release interest in symbols for a connection.
    ///
    /// Returns the changes that must be applied upstream.
    pub fn remove_interest(
        &self,
        connection: ConnectionId,
        symbols: &[Symbol],
    ) -> SubscriptionChanges {
        let removed_symbols = self.state.write().remove(connection, symbols);
        SubscriptionChanges::unsubscribe_only(removed_symbols)
    }

    /// Release all interests held by a closing connection as one batch.
    pub fn connection_closed(&self, connection: ConnectionId) -> SubscriptionChanges {
        let removed = self.state.write().remove_connection(connection);
        SubscriptionChanges::unsubscribe_only(removed)
    }

    /// All symbols with at least one interested connection.
    ///
    /// This is the exact set the upstream link must be subscribed to, used
    /// for resubscription after a reconnect.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.state.read().active_symbols()
    }

    /// Symbols currently held by a specific connection.
    #[must_use]
    pub fn connection_symbols(&self, connection: ConnectionId) -> Vec<Symbol> {
        self.state.read().connection_symbols(connection)
    }

    /// Statistics over the current subscription state.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        let state = self.state.read();
        SubscriptionStats {
            symbol_count: state.symbol_refcount.len(),
            connection_count: state.connection_symbols.len(),
        }
    }
}

/// Subscription statistics.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionStats {
    /// Number of unique refcounted symbols.
    pub symbol_count: usize,
    /// Number of connections holding interests.
    pub connection_count: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn syms(list: &[&str]) -> Vec<Symbol> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn add_interest_new_symbol() {
        let manager = SubscriptionManager::new();

        let changes = manager.add_interest(1, &syms(&["AAPL"]));

        assert!(changes.subscribe.contains("AAPL"));
        assert!(changes.unsubscribe.is_empty());
    }

    #[test]
    fn add_interest_existing_symbol() {
        let manager = SubscriptionManager::new();

        manager.add_interest(1, &syms(&["AAPL"]));
        let changes = manager.add_interest(2, &syms(&["AAPL"]));

        assert!(changes.is_empty());
    }

    #[test]
    fn add_interest_duplicate_connection() {
        let manager = SubscriptionManager::new();

        manager.add_interest(1, &syms(&["AAPL"]));
        let changes = manager.add_interest(1, &syms(&["AAPL"]));

        assert!(changes.subscribe.is_empty());
    }

    #[test]
    fn remove_interest_with_remaining_connections() {
        let manager = SubscriptionManager::new();

        manager.add_interest(1, &syms(&["AAPL"]));
        manager.add_interest(2, &syms(&["AAPL"]));

        // Connection 1 drops AAPL - connection 2 still holds it
        let changes = manager.remove_interest(1, &syms(&["AAPL"]));

        assert!(changes.unsubscribe.is_empty());
        assert!(manager.active_symbols().contains(&"AAPL".to_string()));
    }

    #[test]
    fn remove_interest_last_connection() {
        let manager = SubscriptionManager::new();

        manager.add_interest(1, &syms(&["AAPL"]));
        let changes = manager.remove_interest(1, &syms(&["AAPL"]));

        assert!(changes.unsubscribe.contains("AAPL"));
        assert!(manager.active_symbols().is_empty());
    }

    #[test]
    fn connection_closed_releases_batch() {
        let manager = SubscriptionManager::new();

        manager.add_interest(1, &syms(&["AAPL", "MSFT", "GOOGL"]));

        let changes = manager.connection_closed(1);

        assert_eq!(changes.unsubscribe.len(), 3);
        assert!(manager.active_symbols().is_empty());
    }

    #[test]
    fn connection_closed_preserves_other_connections() {
        let manager = SubscriptionManager::new();

        manager.add_interest(1, &syms(&["AAPL"]));
        manager.add_interest(2, &syms(&["AAPL"]));

        let changes = manager.connection_closed(1);

        // AAPL must stay subscribed for connection 2
        assert!(changes.unsubscribe.is_empty());
        assert!(manager.active_symbols().contains(&"AAPL".to_string()));
    }

    #[test]
    fn remove_interest_unknown_connection_no_changes() {
        let manager = SubscriptionManager::new();

        manager.add_interest(1, &syms(&["AAPL"]));
        let changes = manager.remove_interest(2, &syms(&["AAPL"]));

        assert!(changes.is_empty());
        assert_eq!(manager.active_symbols().len(), 1);
    }

    #[test]
    fn connection_closed_unknown_connection_no_changes() {
        let manager = SubscriptionManager::new();

        manager.add_interest(1, &syms(&["AAPL"]));
        let changes = manager.connection_closed(2);

        assert!(changes.is_empty());
        assert_eq!(manager.active_symbols().len(), 1);
    }

    #[test]
    fn add_partially_existing_symbols() {
        let manager = SubscriptionManager::new();

        manager.add_interest(1, &syms(&["AAPL"]));
        let changes = manager.add_interest(2, &syms(&["AAPL", "MSFT"]));

        // Only MSFT needs an upstream subscribe
        assert_eq!(changes.subscribe.len(), 1);
        assert!(changes.subscribe.contains("MSFT"));
    }

    #[test]
    fn connection_symbols_returns_held_set() {
        let manager = SubscriptionManager::new();

        manager.add_interest(1, &syms(&["AAPL", "MSFT"]));
        manager.add_interest(2, &syms(&["GOOGL"]));

        let held = manager.connection_symbols(1);
        assert_eq!(held.len(), 2);
        assert!(held.contains(&"AAPL".to_string()));
        assert!(held.contains(&"MSFT".to_string()));

        assert!(manager.connection_symbols(99).is_empty());
    }

    #[test]
    fn stats_are_accurate() {
        let manager = SubscriptionManager::new();

        manager.add_interest(1, &syms(&["AAPL", "MSFT"]));
        manager.add_interest(2, &syms(&["AAPL"]));

        let stats = manager.stats();
        assert_eq!(stats.symbol_count, 2);
        assert_eq!(stats.connection_count, 2);
    }

    #[test]
    fn interest_set_all_matches_everything() {
        let interest = InterestSet::All;
        assert!(interest.matches("AAPL"));
        assert!(interest.matches("ANYTHING"));
    }

    #[test]
    fn interest_set_symbols_matches_members_only() {
        let interest = InterestSet::symbols(syms(&["AAPL", "MSFT"]));
        assert!(interest.matches("AAPL"));
        assert!(!interest.matches("GOOGL"));
    }

    #[test]
    fn interest_set_empty_symbols_matches_nothing() {
        let interest = InterestSet::symbols(Vec::new());
        assert!(!interest.matches("AAPL"));
    }

    #[test]
    fn thread_safety_concurrent_interest() {
        use std::sync::Arc;
        use std::thread;

        let manager = Arc::new(SubscriptionManager::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let m = Arc::clone(&manager);
            handles.push(thread::spawn(move || {
                m.add_interest(i, &[format!("SYM{i}"), "SHARED".to_string()]);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = manager.stats();
        assert_eq!(stats.connection_count, 10);
        // SYM0-SYM9 plus the shared symbol
        assert_eq!(stats.symbol_count, 11);
    }

    #[test]
    fn thread_safety_concurrent_closes() {
        use std::sync::Arc;
        use std::thread;

        let manager = Arc::new(SubscriptionManager::new());

        for i in 0..10u64 {
            manager.add_interest(i, &syms(&["SHARED"]));
        }

        let mut handles = vec![];
        for i in 0..10u64 {
            let m = Arc::clone(&manager);
            handles.push(thread::spawn(move || {
                m.connection_closed(i);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = manager.stats();
        assert_eq!(stats.connection_count, 0);
        assert_eq!(stats.symbol_count, 0);
    }
}
