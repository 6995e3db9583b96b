//! Venue-neutral frame model.
//!
//! Venue protocols translate raw text frames into [`InboundFrame`] values and
//! encode [`OutboundFrame`] commands into wire text. The streaming core only
//! ever sees these types.

use super::{Amount, Price, TimestampMs, Topic};

/// Command sent to the venue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Subscribe to a topic
    Subscribe(Topic),
    /// Subscribe to several topics in one frame; the venue acks each separately
    SubscribeMany(Vec<Topic>),
    /// Unsubscribe from a topic
    Unsubscribe(Topic),
    /// Ask the venue to push a fresh snapshot for an order book topic
    ResendSnapshot(Topic),
    /// Liveness probe
    Ping,
}

/// Whether a book frame replaces or patches the replica
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookAction {
    /// Full book state
    Snapshot,
    /// Incremental change
    Delta,
}

/// Price levels and integrity markers carried by one book frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookUpdate {
    /// Bid levels as (price, amount); amount zero removes the level
    pub bids: Vec<(Price, Amount)>,
    /// Ask levels as (price, amount); amount zero removes the level
    pub asks: Vec<(Price, Amount)>,
    /// Sequence number of this frame, if the venue sends one
    pub sequence: Option<u64>,
    /// Sequence of the frame this one follows, for venues that chain deltas
    pub prev_sequence: Option<u64>,
    /// Venue checksum over the top of book after applying this frame
    pub checksum: Option<i64>,
    /// Venue timestamp
    pub timestamp: Option<TimestampMs>,
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Subscription confirmed
    SubscribeAck(Topic),
    /// Unsubscription confirmed
    UnsubscribeAck(Topic),
    /// Error response, with the topic it refers to when the venue echoes it
    Error {
        /// Implicated topic
        topic: Option<Topic>,
        /// Venue error code
        code: Option<i64>,
        /// Venue error message
        message: String,
    },
    /// Login result
    AuthResult {
        /// Whether the session is now authenticated
        success: bool,
        /// Venue message, if any
        message: Option<String>,
    },
    /// Keepalive response
    Pong,
    /// Order book snapshot or delta
    OrderBook {
        /// Book topic
        topic: Topic,
        /// Snapshot or delta
        action: BookAction,
        /// Levels and integrity markers
        update: BookUpdate,
    },
    /// Any other data frame, passed through for the field mapper
    Data {
        /// Topic the frame belongs to
        topic: Topic,
        /// Raw payload
        payload: serde_json::Value,
    },
    /// Frame with no meaning for the core (heartbeats, notices)
    Ignored,
}
