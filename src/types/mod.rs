//! Core types shared across the streaming layer.
//!
//! - [`topic`] - Topic keys (channel + scope) used for dispatch and deduplication
//! - [`messages`] - Venue-neutral inbound/outbound frame model

pub mod messages;
pub mod topic;

pub use messages::{BookAction, BookUpdate, InboundFrame, OutboundFrame};
pub use topic::{Channel, MarketType, Scope, Topic};

/// Price of a book level.
///
/// Venues send canonical decimal strings, so prices are kept as exact decimals:
/// `"100.10"` and `"100.1"` compare equal, and no floating-point rounding can
/// split one level into two.
pub type Price = rust_decimal::Decimal;

/// Amount resting at a price level. Zero in a delta means "remove the level".
pub type Amount = rust_decimal::Decimal;

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMs = u64;
