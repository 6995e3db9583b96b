//! Order book replica data structure.
//!
//! This implementation uses `BTreeMap` for sorted price levels, providing:
//!
//! - O(log n) insertion, deletion, and lookup
//! - O(log n) access to best bid/ask (via `last_key_value` / `first_key_value`)
//! - Ordered iteration for depth-of-book queries
//!
//! Because the maps stay sorted on every insert and remove, applying a delta
//! never requires re-sorting: only the touched keys move.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::types::{Amount, BookUpdate, Price, TimestampMs};

/// Side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Buy side
    Bid,
    /// Sell side
    Ask,
}

/// Local replica of one venue order book.
///
/// # Design Decisions
///
/// 1. **Decimal prices**: Prices and amounts are `rust_decimal::Decimal`, so
///    levels compare by exact numeric value and the venue's string form (used
///    by checksums) survives the round trip.
///
/// 2. **BTreeMap**: Provides sorted price levels with O(log n) operations.
///
/// 3. **No zero levels**: a zero (or negative) amount removes the key; the
///    maps only ever hold positive amounts.
///
/// # Thread Safety
///
/// The replica is owned by the replica engine on the connection's event loop
/// and is never shared. Consumers receive [`OrderBookSnapshot`] copies.
#[derive(Debug, Clone)]
pub struct OrderBookReplica {
    /// Unified market symbol
    symbol: String,

    /// Bid levels: price -> amount
    /// Sorted ascending by price (best bid = highest = last)
    bids: BTreeMap<Price, Amount>,

    /// Ask levels: price -> amount
    /// Sorted ascending by price (best ask = lowest = first)
    asks: BTreeMap<Price, Amount>,

    /// Last sequence number applied (for gap detection)
    sequence: Option<u64>,

    /// Last venue checksum seen
    checksum: Option<i64>,

    /// Venue timestamp of the last applied frame
    timestamp: Option<TimestampMs>,
}

impl OrderBookReplica {
    /// Create a new empty replica for the given symbol
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            sequence: None,
            checksum: None,
            timestamp: None,
        }
    }

    /// Get the symbol
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the last applied sequence number
    #[must_use]
    pub const fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Get the last venue checksum
    #[must_use]
    pub const fn checksum(&self) -> Option<i64> {
        self.checksum
    }

    /// Get the venue timestamp of the last applied frame
    #[must_use]
    pub const fn timestamp(&self) -> Option<TimestampMs> {
        self.timestamp
    }

    /// Replace the whole book with a snapshot
    pub fn apply_snapshot(&mut self, update: &BookUpdate) {
        self.bids.clear();
        self.asks.clear();

        for &(price, amount) in &update.bids {
            if amount > Decimal::ZERO {
                self.bids.insert(price, amount);
            }
        }
        for &(price, amount) in &update.asks {
            if amount > Decimal::ZERO {
                self.asks.insert(price, amount);
            }
        }

        self.sequence = update.sequence;
        self.checksum = update.checksum;
        self.timestamp = update.timestamp;
    }

    /// Apply an incremental update.
    ///
    /// Sequence checks are the engine's job; this only mutates levels and
    /// records markers. Returns the first touched price that ended up on both
    /// sides of the book, if any.
    pub fn apply_delta(&mut self, update: &BookUpdate) -> Option<Price> {
        for &(price, amount) in &update.bids {
            self.set_level(Side::Bid, price, amount);
        }
        for &(price, amount) in &update.asks {
            self.set_level(Side::Ask, price, amount);
        }

        if update.sequence.is_some() {
            self.sequence = update.sequence;
        }
        self.checksum = update.checksum;
        if update.timestamp.is_some() {
            self.timestamp = update.timestamp;
        }

        update
            .bids
            .iter()
            .map(|&(p, _)| p)
            .find(|p| self.bids.contains_key(p) && self.asks.contains_key(p))
            .or_else(|| {
                update
                    .asks
                    .iter()
                    .map(|&(p, _)| p)
                    .find(|p| self.bids.contains_key(p) && self.asks.contains_key(p))
            })
    }

    /// Set a price level directly. A zero amount removes the level.
    pub fn set_level(&mut self, side: Side, price: Price, amount: Amount) {
        let book = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };

        // insert alone keeps the old key, and with it the old scale ("100.10" vs "100.1")
        book.remove(&price);
        if amount > Decimal::ZERO {
            book.insert(price, amount);
        }
    }

    /// Get the best bid (highest price)
    #[must_use]
    pub fn best_bid(&self) -> Option<(Price, Amount)> {
        self.bids.last_key_value().map(|(&p, &a)| (p, a))
    }

    /// Get the best ask (lowest price)
    #[must_use]
    pub fn best_ask(&self) -> Option<(Price, Amount)> {
        self.asks.first_key_value().map(|(&p, &a)| (p, a))
    }

    /// Get the mid price
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Get the spread
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    /// Check if the book is crossed (best bid >= best ask)
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => bid >= ask,
            _ => false,
        }
    }

    /// Get all bid levels, sorted by price descending (best first)
    pub fn bids(&self) -> impl Iterator<Item = (Price, Amount)> + '_ {
        self.bids.iter().rev().map(|(&p, &a)| (p, a))
    }

    /// Get all ask levels, sorted by price ascending (best first)
    pub fn asks(&self) -> impl Iterator<Item = (Price, Amount)> + '_ {
        self.asks.iter().map(|(&p, &a)| (p, a))
    }

    /// Get the top N bid levels
    #[must_use]
    pub fn top_bids(&self, n: usize) -> Vec<(Price, Amount)> {
        self.bids().take(n).collect()
    }

    /// Get the top N ask levels
    #[must_use]
    pub fn top_asks(&self, n: usize) -> Vec<(Price, Amount)> {
        self.asks().take(n).collect()
    }

    /// Clear the book and its markers
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.sequence = None;
        self.checksum = None;
        self.timestamp = None;
    }

    /// Check if the book is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get the number of price levels as (bids, asks)
    #[must_use]
    pub fn num_levels(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Build an immutable view, optionally truncated to `limit` levels per side
    #[must_use]
    pub fn snapshot(&self, limit: Option<usize>) -> OrderBookSnapshot {
        let n = limit.unwrap_or(usize::MAX);
        OrderBookSnapshot {
            symbol: self.symbol.clone(),
            bids: self.top_bids(n),
            asks: self.top_asks(n),
            sequence: self.sequence,
            checksum: self.checksum,
            timestamp: self.timestamp,
        }
    }
}

/// Immutable copy of a replica handed to consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBookSnapshot {
    /// Unified market symbol
    pub symbol: String,
    /// Bids, best (highest) first
    pub bids: Vec<(Price, Amount)>,
    /// Asks, best (lowest) first
    pub asks: Vec<(Price, Amount)>,
    /// Sequence number of the last applied frame
    pub sequence: Option<u64>,
    /// Venue checksum of the last applied frame
    pub checksum: Option<i64>,
    /// Venue timestamp of the last applied frame
    pub timestamp: Option<TimestampMs>,
}

impl OrderBookSnapshot {
    /// Best bid
    pub fn best_bid(&self) -> Option<(Price, Amount)> {
        self.bids.first().copied()
    }

    /// Best ask
    pub fn best_ask(&self) -> Option<(Price, Amount)> {
        self.asks.first().copied()
    }

    /// Copy truncated to `n` levels per side (ccxt's `limit` argument)
    pub fn limit(&self, n: usize) -> Arc<OrderBookSnapshot> {
        Arc::new(OrderBookSnapshot {
            bids: self.bids.iter().take(n).copied().collect(),
            asks: self.asks.iter().take(n).copied().collect(),
            ..self.clone()
        })
    }
}
