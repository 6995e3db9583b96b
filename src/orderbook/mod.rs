//! Local order book replicas.
//!
//! This module provides the replica data structure and the engine keeping
//! replicas consistent with the venue:
//!
//! - Sorted price levels with O(log n) updates ([`OrderBookReplica`])
//! - Sequence, checksum and crossed-level checks ([`OrderBookEngine`])
//! - Venue-pluggable checksums ([`BookChecksum`])
//!
//! # Example
//!
//! ```rust
//! use market_sync::orderbook::OrderBookReplica;
//! use market_sync::types::BookUpdate;
//!
//! let mut book = OrderBookReplica::new("BTC/USDT");
//! book.apply_snapshot(&BookUpdate {
//!     bids: vec![("100".parse().unwrap(), "1".parse().unwrap())],
//!     asks: vec![("101".parse().unwrap(), "2".parse().unwrap())],
//!     ..Default::default()
//! });
//!
//! if let Some((price, amount)) = book.best_bid() {
//!     println!("Best bid: {} @ {}", amount, price);
//! }
//! ```

pub mod book;
pub mod checksum;
pub mod manager;

pub use book::{OrderBookReplica, OrderBookSnapshot, Side};
pub use checksum::{signed_crc32, BookChecksum, InterleavedCrc32};
pub use manager::{ApplyOutcome, OrderBookEngine, ReplicaState};
