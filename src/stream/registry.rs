//! Subscription registry.
//!
//! Maps each [`Topic`] to its [`Subscription`]: lifecycle state, attached
//! consumers, and bookkeeping for deferred releases and acquires that arrived
//! mid-unsubscribe. The registry only stores state; the transitions are
//! driven by [`ConnectionContext`](super::ConnectionContext).

use std::time::Instant;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::Error;
use crate::types::Topic;

use super::consumer::{ConsumerId, ConsumerSink, Delivery, StreamEvent};
use super::pending::Waiter;

/// Lifecycle state of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Not active on the wire
    Unsubscribed,
    /// Subscribe frame sent, waiting for the acknowledgment
    Subscribing,
    /// Active
    Subscribed,
    /// Unsubscribe frame sent, waiting for the acknowledgment
    Unsubscribing,
}

/// Acquire that arrived while the topic was unsubscribing
#[derive(Debug)]
pub struct QueuedAcquire {
    /// Consumer waiting to be attached
    pub sink: ConsumerSink,
    /// Reply for the subscribe call
    pub reply: Waiter,
}

/// State of one topic
#[derive(Debug)]
pub struct Subscription {
    /// Topic
    pub topic: Topic,
    /// Lifecycle state
    pub state: SubscriptionState,
    /// Attached consumers
    pub consumers: Vec<ConsumerSink>,
    /// Last failure seen on this topic
    pub last_error: Option<Error>,
    /// Deadline of a deferred release
    pub release_at: Option<Instant>,
    /// Acquires to replay once the unsubscribe completes
    pub queued: Vec<QueuedAcquire>,
    /// The pending subscribe is a resync round trip, not a first subscribe
    pub resyncing: bool,
}

impl Subscription {
    fn new(topic: Topic) -> Self {
        Self {
            topic,
            state: SubscriptionState::Unsubscribed,
            consumers: Vec::new(),
            last_error: None,
            release_at: None,
            queued: Vec::new(),
            resyncing: false,
        }
    }

    /// Remove a consumer. Returns `true` if it was attached.
    pub fn detach(&mut self, id: ConsumerId) -> bool {
        let before = self.consumers.len();
        self.consumers.retain(|c| c.id() != id);
        self.consumers.len() != before
    }

    /// Push an event to every consumer, pruning closed ones.
    ///
    /// Returns the number of consumers that were pruned.
    pub fn deliver(&mut self, event: &StreamEvent) -> usize {
        let before = self.consumers.len();
        let topic = &self.topic;
        self.consumers.retain(|consumer| match consumer.deliver(event.clone()) {
            Delivery::Delivered => true,
            Delivery::Lagged => {
                debug!(topic = %topic, consumer = %consumer.id(), "consumer queue full, event dropped");
                true
            }
            Delivery::Closed => false,
        });
        before - self.consumers.len()
    }
}

/// Registry of every topic known to the connection
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: FxHashMap<Topic, Subscription>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a subscription
    pub fn get(&self, topic: &Topic) -> Option<&Subscription> {
        self.subscriptions.get(topic)
    }

    /// Get a subscription mutably
    pub fn get_mut(&mut self, topic: &Topic) -> Option<&mut Subscription> {
        self.subscriptions.get_mut(topic)
    }

    /// Get or create a subscription in `Unsubscribed` state
    pub fn entry(&mut self, topic: &Topic) -> &mut Subscription {
        self.subscriptions
            .entry(topic.clone())
            .or_insert_with(|| Subscription::new(topic.clone()))
    }

    /// Remove a subscription
    pub fn remove(&mut self, topic: &Topic) -> Option<Subscription> {
        self.subscriptions.remove(topic)
    }

    /// State of a topic; unknown topics are `Unsubscribed`
    pub fn state(&self, topic: &Topic) -> SubscriptionState {
        self.subscriptions
            .get(topic)
            .map_or(SubscriptionState::Unsubscribed, |s| s.state)
    }

    /// Topics whose deferred release deadline has passed
    pub fn due_releases(&self, now: Instant) -> Vec<Topic> {
        self.subscriptions
            .values()
            .filter(|s| s.release_at.is_some_and(|at| at <= now))
            .map(|s| s.topic.clone())
            .collect()
    }

    /// Remove every subscription
    pub fn drain(&mut self) -> Vec<Subscription> {
        self.subscriptions.drain().map(|(_, s)| s).collect()
    }

    /// Number of known topics
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether no topic is known
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
