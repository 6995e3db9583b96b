//! Streaming synchronization core.
//!
//! Everything in this module runs on a connection's event loop:
//!
//! - [`pending`] - in-flight subscribe/unsubscribe requests and their waiters
//! - [`registry`] - per-topic lifecycle state and attached consumers
//! - [`consumer`] - consumer handles and bounded delivery queues
//! - [`router`] - classification and dispatch of inbound frames
//! - [`auth`] - lazy login for private topics
//! - [`keepalive`] - liveness probing
//! - [`context`] - the [`ConnectionContext`] tying them together
//!
//! The async surface lives in [`crate::client::StreamClient`].

pub mod auth;
pub mod consumer;
pub mod context;
pub mod keepalive;
pub mod pending;
pub mod registry;
pub mod router;

pub use auth::AuthState;
pub use consumer::{ConsumerHandle, ConsumerId, StreamEvent};
pub use context::{AcquireRequest, ConnectionContext};
pub use keepalive::ConnectionHealth;
pub use pending::RequestKind;
pub use registry::SubscriptionState;
pub use router::MessageRouter;
