//! Error types for the market-sync crate.
//!
//! Every failure in the streaming core resolves to an [`Error`] value delivered
//! to the affected handle or returned to the caller. The type is `Clone` because
//! one outcome (a rejected subscribe, a closed transport) is fanned out to every
//! waiter attached to it.

use rust_decimal::Decimal;

use crate::types::Topic;

/// The main error type for this crate
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The venue refused a subscribe or unsubscribe request
    #[error("Subscription rejected for {topic}: {message}")]
    SubscriptionRejected {
        /// Topic the request was for
        topic: Topic,
        /// Reason given by the venue
        message: String,
    },

    /// No acknowledgment arrived within the configured window
    #[error("Subscription request for {topic} timed out")]
    SubscriptionTimeout {
        /// Topic the request was for
        topic: Topic,
    },

    /// Login handshake rejected, timed out, or could not be built
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Order book integrity check failed (recovered internally via resync)
    #[error("Integrity violation on {topic}: {reason}")]
    IntegrityViolation {
        /// Order book topic
        topic: Topic,
        /// Which check failed
        reason: IntegrityReason,
    },

    /// Resynchronization kept failing and was abandoned
    #[error("Resync of {topic} abandoned after {attempts} attempts")]
    ResyncExhausted {
        /// Order book topic
        topic: Topic,
        /// Consecutive failed attempts
        attempts: u32,
    },

    /// Connection lost; every subscription was reset
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(String),

    /// Cryptography error (key parsing, signing)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Invalid configuration (missing fields, bad format)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Frame did not match the venue protocol
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// The check that detected a diverged order book replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityReason {
    /// Delta sequence was not contiguous with the replica
    SequenceGap {
        /// Expected sequence number
        expected: u64,
        /// Actual sequence number received
        got: u64,
    },
    /// Top-of-book checksum differed from the one carried by the frame
    ChecksumMismatch {
        /// Checksum sent by the venue
        expected: i64,
        /// Checksum computed locally
        computed: i64,
    },
    /// A price ended up on both sides of the book
    CrossedLevel {
        /// Offending price
        price: Decimal,
    },
}

impl std::fmt::Display for IntegrityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityReason::SequenceGap { expected, got } => {
                write!(f, "sequence gap: expected {}, got {}", expected, got)
            }
            IntegrityReason::ChecksumMismatch { expected, computed } => {
                write!(f, "checksum mismatch: venue {}, local {}", expected, computed)
            }
            IntegrityReason::CrossedLevel { price } => {
                write!(f, "price {} present on both sides", price)
            }
        }
    }
}

impl Error {
    /// Whether a caller can reasonably retry the operation that produced this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SubscriptionTimeout { .. }
                | Error::TransportClosed(_)
                | Error::ResyncExhausted { .. }
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl From<rsa::Error> for Error {
    fn from(err: rsa::Error) -> Self {
        Error::Crypto(err.to_string())
    }
}

impl From<rsa::pkcs8::Error> for Error {
    fn from(err: rsa::pkcs8::Error) -> Self {
        Error::Crypto(format!("PKCS8 error: {}", err))
    }
}

impl From<hmac::digest::InvalidLength> for Error {
    fn from(err: hmac::digest::InvalidLength) -> Self {
        Error::Crypto(format!("HMAC key error: {}", err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("invalid endpoint URL: {}", err))
    }
}
