//! Venue protocol adapters.
//!
//! Each venue speaks its own wire dialect: how subscribe requests are framed,
//! how acknowledgments and errors look, how book frames carry sequence and
//! checksum markers. A [`FrameClassifier`] translates between that dialect and
//! the venue-neutral [`InboundFrame`]/[`OutboundFrame`] model the stream core
//! works with.

pub mod coincatch;

use std::fmt;
use std::sync::Arc;

use crate::client::auth::Signer;
use crate::config::Credentials;
use crate::error::Error;
use crate::orderbook::BookChecksum;
use crate::types::{InboundFrame, OutboundFrame};

pub use coincatch::CoincatchProtocol;

/// How a diverged order book is brought back in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncStrategy {
    /// Unsubscribe and subscribe again; the venue sends a fresh snapshot
    Resubscribe,
    /// Send a venue control frame requesting a new snapshot
    ResendSnapshot,
}

/// Wire dialect of one venue
pub trait FrameClassifier: Send + Sync + fmt::Debug {
    /// Classify one inbound text frame. A frame may carry several logical
    /// messages.
    fn classify(&self, text: &str) -> Result<Vec<InboundFrame>, Error>;

    /// Encode an outbound command
    fn encode(&self, frame: &OutboundFrame) -> Result<String, Error>;

    /// Build the login frame
    fn login_frame(
        &self,
        credentials: &Credentials,
        signer: &dyn Signer,
        timestamp_ms: u64,
    ) -> Result<String, Error>;

    /// Order book checksum, if the venue sends one
    fn checksum(&self) -> Option<Arc<dyn BookChecksum>> {
        None
    }

    /// Resync action for diverged order books
    fn resync_strategy(&self) -> ResyncStrategy {
        ResyncStrategy::Resubscribe
    }
}
