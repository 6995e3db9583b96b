//! Consumer handles and their delivery sinks.
//!
//! Each logical consumer of a topic owns a [`ConsumerHandle`]. The event loop
//! keeps the matching [`ConsumerSink`] in the subscription registry and pushes
//! events into a bounded queue with `try_send`, so a slow consumer loses events
//! (counted in [`ConsumerHandle::lagged`]) instead of stalling the connection.
//! The most recent event is also kept in a cell for pull-style access.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use crate::error::Error;
use crate::orderbook::OrderBookSnapshot;
use crate::types::Topic;

static NEXT_CONSUMER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one consumer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl ConsumerId {
    fn next() -> Self {
        Self(NEXT_CONSUMER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Event delivered to a consumer
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// New order book view
    OrderBook(Arc<OrderBookSnapshot>),
    /// Raw payload of a non-book topic
    Data(Arc<Value>),
    /// Failure affecting the subscription
    Error(Error),
}

/// Result of pushing an event into a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Event queued
    Delivered,
    /// Queue full; event dropped for this consumer
    Lagged,
    /// Handle gone
    Closed,
}

/// Message sent by a dropped handle so the event loop can release it
pub(crate) type ReleaseNotice = (Topic, ConsumerId);

/// Event-loop side of a consumer
#[derive(Debug)]
pub struct ConsumerSink {
    id: ConsumerId,
    tx: mpsc::Sender<StreamEvent>,
    latest: Arc<Mutex<Option<StreamEvent>>>,
    lagged: Arc<AtomicU64>,
}

impl ConsumerSink {
    /// Consumer identifier
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Push an event without waiting
    pub fn deliver(&self, event: StreamEvent) -> Delivery {
        *self.latest.lock() = Some(event.clone());
        match self.tx.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                self.lagged.fetch_add(1, Ordering::Relaxed);
                Delivery::Lagged
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Whether the handle was dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Caller side of a subscription.
///
/// Dropping the handle releases it from its topic; the last release for a
/// topic unsubscribes on the wire (subject to the release policy).
#[derive(Debug)]
pub struct ConsumerHandle {
    id: ConsumerId,
    topic: Topic,
    rx: mpsc::Receiver<StreamEvent>,
    latest: Arc<Mutex<Option<StreamEvent>>>,
    lagged: Arc<AtomicU64>,
    release_tx: Option<mpsc::UnboundedSender<ReleaseNotice>>,
}

impl ConsumerHandle {
    /// Consumer identifier
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Topic this handle consumes
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Wait for the next event. Returns `None` once the subscription is gone.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Most recent event delivered to this handle, whether or not it was queued
    pub fn latest(&self) -> Option<StreamEvent> {
        self.latest.lock().clone()
    }

    /// Number of events dropped because the queue was full
    pub fn lagged(&self) -> u64 {
        self.lagged.load(Ordering::Relaxed)
    }

    /// Stop the drop handler from sending a release notice
    pub(crate) fn disarm(&mut self) {
        self.release_tx = None;
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.release_tx.take() {
            // The event loop may already be gone
            let _ = tx.send((self.topic.clone(), self.id));
        }
    }
}

/// Create a connected sink/handle pair
pub(crate) fn channel(
    topic: Topic,
    capacity: usize,
    release_tx: Option<mpsc::UnboundedSender<ReleaseNotice>>,
) -> (ConsumerSink, ConsumerHandle) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let id = ConsumerId::next();
    let latest = Arc::new(Mutex::new(None));
    let lagged = Arc::new(AtomicU64::new(0));

    let sink = ConsumerSink {
        id,
        tx,
        latest: Arc::clone(&latest),
        lagged: Arc::clone(&lagged),
    };
    let handle = ConsumerHandle {
        id,
        topic,
        rx,
        latest,
        lagged,
        release_tx,
    };
    (sink, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: i64) -> StreamEvent {
        StreamEvent::Data(Arc::new(Value::from(n)))
    }

    #[test]
    fn test_full_queue_counts_lag_and_keeps_latest() {
        let (sink, mut handle) = channel(Topic::ticker("BTC/USDT"), 1, None);

        assert_eq!(sink.deliver(data(1)), Delivery::Delivered);
        assert_eq!(sink.deliver(data(2)), Delivery::Lagged);
        assert_eq!(handle.lagged(), 1);

        match handle.latest() {
            Some(StreamEvent::Data(v)) => assert_eq!(*v, Value::from(2)),
            other => panic!("unexpected {:?}", other),
        }
        match handle.try_recv() {
            Some(StreamEvent::Data(v)) => assert_eq!(*v, Value::from(1)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(handle.try_recv().is_none());
    }

    #[test]
    fn test_drop_sends_release() {
        let (release_tx, mut release_rx) = mpsc::unbounded_channel();
        let topic = Topic::ticker("BTC/USDT");
        let (sink, handle) = channel(topic.clone(), 4, Some(release_tx));
        let id = handle.id();

        drop(handle);
        assert_eq!(release_rx.try_recv().unwrap(), (topic, id));
        assert!(sink.is_closed());
        assert_eq!(sink.deliver(data(1)), Delivery::Closed);
    }

    #[test]
    fn test_disarmed_handle_is_silent() {
        let (release_tx, mut release_rx) = mpsc::unbounded_channel();
        let (_sink, mut handle) = channel(Topic::balance(), 4, Some(release_tx));
        handle.disarm();
        drop(handle);
        assert!(release_rx.try_recv().is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _ha) = channel(Topic::balance(), 1, None);
        let (b, _hb) = channel(Topic::balance(), 1, None);
        assert_ne!(a.id(), b.id());
    }
}
