//! # market-sync
//!
//! Client-side synchronization core for exchange streaming APIs.
//!
//! ## Features
//!
//! - **Shared subscriptions** - Many consumers of a topic share one wire subscription
//! - **Request correlation** - Subscribe/unsubscribe acks matched to their waiters, with timeouts
//! - **Order book replicas** - Snapshot + delta with sequence and checksum verification
//! - **Automatic resync** - Diverged books recover through a fresh snapshot, with bounded retries
//! - **Lazy authentication** - Login happens on the first private subscription
//! - **Keepalive** - Application-level ping/pong with stale detection
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use market_sync::venue::{coincatch, CoincatchProtocol};
//! use market_sync::{Config, StreamClient, StreamEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), market_sync::Error> {
//!     let config = Config::new(coincatch::PUBLIC_URL)?;
//!     let client = StreamClient::connect(config, Arc::new(CoincatchProtocol::new()), None).await?;
//!
//!     // Both handles share one wire subscription
//!     let mut first = client.watch_order_book("BTC/USDT", None).await?;
//!     let _second = client.watch_order_book("BTC/USDT", None).await?;
//!
//!     if let Some(StreamEvent::OrderBook(book)) = first.recv().await {
//!         println!("{} levels on the bid side", book.bids.len());
//!     }
//!
//!     // Dropping the last handle unsubscribes
//!     drop(first);
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! This crate is organized into several modules:
//!
//! - [`client`] - [`StreamClient`], transports and credential signers
//! - [`stream`] - Connection state: pending requests, subscription registry,
//!   router, auth coordinator, keepalive monitor
//! - [`orderbook`] - Order book replicas, checksums and the resync engine
//! - [`venue`] - Venue wire dialects
//! - [`types`] - Topics and the venue-neutral frame model
//! - [`config`] - Configuration
//! - [`error`] - Error types for the crate
//!
//! ## Concurrency
//!
//! Each connection runs one tokio task that owns all of its state. Callers
//! talk to it through channels, so nothing on the hot path takes a lock.
//! Consumers get bounded queues; a consumer that falls behind loses events
//! instead of stalling the connection.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod orderbook;
pub mod stream;
pub mod types;
pub mod venue;

// Re-export main types at crate root for convenience
pub use client::StreamClient;
pub use config::{Config, Credentials, ReleasePolicy};
pub use error::Error;
pub use orderbook::OrderBookSnapshot;
pub use stream::{AuthState, ConnectionHealth, ConsumerHandle, StreamEvent, SubscriptionState};
pub use types::Topic;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;
