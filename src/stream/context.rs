//! Per-connection state and its transitions.
//!
//! [`ConnectionContext`] owns every piece of mutable state of one connection:
//! the subscription registry, the pending-request table, the replica engine,
//! the auth coordinator and the keepalive monitor. All methods are synchronous
//! and run on the connection's event loop, so no state is ever shared or
//! locked. Callers only see the effects through their reply channels and
//! consumer queues.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::auth::{current_timestamp_ms, Signer};
use crate::client::websocket::Transport;
use crate::config::{Config, ReleasePolicy};
use crate::error::Error;
use crate::orderbook::{ApplyOutcome, OrderBookEngine, OrderBookSnapshot};
use crate::types::{BookAction, BookUpdate, OutboundFrame, Topic};
use crate::venue::{FrameClassifier, ResyncStrategy};

use super::auth::{AuthCoordinator, AuthGate, AuthState, QueuedPrivate};
use super::consumer::{ConsumerId, ConsumerSink, StreamEvent};
use super::keepalive::{ConnectionHealth, KeepaliveAction, KeepaliveMonitor};
use super::pending::{PendingRequestTable, RequestKind, Waiter};
use super::registry::{QueuedAcquire, SubscriptionRegistry, SubscriptionState};

/// One consumer asking to be attached to a topic
#[derive(Debug)]
pub struct AcquireRequest {
    /// Topic to attach to
    pub topic: Topic,
    /// Consumer queue
    pub sink: ConsumerSink,
    /// Resolves once the topic is active
    pub reply: Waiter,
}

/// State of one streaming connection
#[derive(Debug)]
pub struct ConnectionContext {
    config: Config,
    classifier: Arc<dyn FrameClassifier>,
    transport: Arc<dyn Transport>,
    signer: Option<Arc<dyn Signer>>,
    registry: SubscriptionRegistry,
    pending: PendingRequestTable,
    engine: OrderBookEngine,
    auth: AuthCoordinator,
    keepalive: KeepaliveMonitor,
}

impl ConnectionContext {
    /// Create the context for a freshly opened connection
    pub fn new(
        config: Config,
        classifier: Arc<dyn FrameClassifier>,
        transport: Arc<dyn Transport>,
        signer: Option<Arc<dyn Signer>>,
        now: Instant,
    ) -> Self {
        let engine = OrderBookEngine::new(
            classifier.checksum(),
            config.delta_buffer_limit(),
            config.resync().clone(),
        );
        let keepalive =
            KeepaliveMonitor::new(config.keepalive_interval(), config.keepalive_timeout(), now);
        Self {
            config,
            classifier,
            transport,
            signer,
            registry: SubscriptionRegistry::new(),
            pending: PendingRequestTable::new(),
            engine,
            auth: AuthCoordinator::new(),
            keepalive,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Lifecycle state of a topic
    pub fn subscription_state(&self, topic: &Topic) -> SubscriptionState {
        self.registry.state(topic)
    }

    /// Number of consumers attached to a topic
    pub fn consumer_count(&self, topic: &Topic) -> usize {
        self.registry.get(topic).map_or(0, |s| s.consumers.len())
    }

    /// Last failure recorded for a topic
    pub fn last_error(&self, topic: &Topic) -> Option<Error> {
        self.registry.get(topic).and_then(|s| s.last_error.clone())
    }

    /// Current view of a synchronized order book
    pub fn order_book(&self, topic: &Topic) -> Option<Arc<OrderBookSnapshot>> {
        self.engine.snapshot(topic)
    }

    /// Authentication state
    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    /// Connection health signal
    pub fn health(&self) -> watch::Receiver<ConnectionHealth> {
        self.keepalive.subscribe()
    }

    /// Number of in-flight wire requests
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    // ------------------------------------------------------------------
    // Caller requests
    // ------------------------------------------------------------------

    /// Attach a consumer to `topic`, subscribing on the wire if needed.
    ///
    /// `reply` resolves once the topic is active (or immediately if it
    /// already is), or with the error that prevented it.
    pub fn acquire(&mut self, topic: Topic, sink: ConsumerSink, reply: Waiter, now: Instant) {
        self.acquire_many(vec![AcquireRequest { topic, sink, reply }], now);
    }

    /// Attach several consumers at once.
    ///
    /// Every topic that needs a wire subscription goes out in a single
    /// subscribe frame; each reply still resolves on its own topic's ack.
    pub fn acquire_many(&mut self, requests: Vec<AcquireRequest>, now: Instant) {
        let mut admitted = Vec::with_capacity(requests.len());
        for AcquireRequest { topic, sink, reply } in requests {
            if reply.is_closed() && sink.is_closed() {
                continue;
            }
            if !topic.is_private() {
                admitted.push(AcquireRequest { topic, sink, reply });
                continue;
            }

            if self.config.credentials().is_none() || self.signer.is_none() {
                let _ = reply.send(Err(Error::AuthenticationFailed(
                    "no credentials configured for private topics".to_string(),
                )));
                continue;
            }
            match self.auth.gate(now) {
                AuthGate::Proceed => admitted.push(AcquireRequest { topic, sink, reply }),
                AuthGate::Wait => self.auth.queue(QueuedPrivate { topic, sink, reply }),
                AuthGate::SendLogin => {
                    self.auth.queue(QueuedPrivate { topic, sink, reply });
                    self.send_login(now);
                }
                AuthGate::Reject(e) => {
                    let _ = reply.send(Err(e));
                }
            }
        }

        self.attach_many(admitted, now);
    }

    /// Detach a consumer. The last release of an active topic unsubscribes
    /// according to the release policy.
    ///
    /// `reply`, if given, resolves when the release is complete: right away,
    /// or once the venue acknowledges the unsubscribe.
    pub fn release(&mut self, topic: &Topic, id: ConsumerId, reply: Option<Waiter>, now: Instant) {
        let Some(sub) = self.registry.get_mut(topic) else {
            resolve(reply, Ok(()));
            return;
        };
        sub.queued.retain(|q| q.sink.id() != id);
        if !sub.detach(id) {
            resolve(reply, Ok(()));
            return;
        }
        debug!(topic = %topic, consumer = %id, remaining = sub.consumers.len(), "consumer released");
        self.on_consumers_changed(topic, reply, now);
    }

    /// Allow private acquires again after a failed login
    pub fn retry_authentication(&mut self) -> bool {
        self.auth.retry()
    }

    // ------------------------------------------------------------------
    // Inbound frames
    // ------------------------------------------------------------------

    /// Subscribe acknowledgment
    pub fn on_subscribe_ack(&mut self, topic: &Topic, now: Instant) {
        let Some(request) = self.pending.take(topic, RequestKind::Subscribe) else {
            debug!(topic = %topic, "subscribe ack without pending request");
            return;
        };
        let Some(sub) = self.registry.get_mut(topic) else {
            request.resolve(Ok(()));
            return;
        };
        if sub.state != SubscriptionState::Subscribing {
            debug!(topic = %topic, state = ?sub.state, "late subscribe ack");
            request.resolve(Ok(()));
            return;
        }

        sub.state = SubscriptionState::Subscribed;
        if std::mem::take(&mut sub.resyncing) {
            debug!(topic = %topic, "resubscribed");
        } else {
            info!(topic = %topic, consumers = sub.consumers.len(), "subscribed");
        }
        request.resolve(Ok(()));
        self.on_consumers_changed(topic, None, now);
    }

    /// Unsubscribe acknowledgment
    pub fn on_unsubscribe_ack(&mut self, topic: &Topic, now: Instant) {
        if self.registry.state(topic) != SubscriptionState::Unsubscribing {
            // Resubscribe resyncs produce acks for the dropped half
            debug!(topic = %topic, "ignoring unsubscribe ack");
            return;
        }
        info!(topic = %topic, "unsubscribed");
        self.finish_unsubscribe(topic, Ok(()), now);
    }

    /// Venue error, with the topic it refers to if known
    pub fn on_error(&mut self, topic: Option<&Topic>, code: Option<i64>, message: String, now: Instant) {
        let Some(topic) = topic else {
            if self.auth.state() == AuthState::Authenticating {
                self.on_auth_result(Err(Error::AuthenticationFailed(message)), now);
            } else {
                warn!(?code, message = %message, "venue error");
            }
            return;
        };

        let Some(request) = self.pending.take_most_recent(topic) else {
            warn!(topic = %topic, ?code, message = %message, "venue error without pending request");
            return;
        };
        let error = Error::SubscriptionRejected {
            topic: topic.clone(),
            message,
        };
        warn!(topic = %topic, ?code, kind = ?request.kind, "request rejected");
        match request.kind {
            RequestKind::Subscribe if self.is_resyncing(topic) => {
                request.resolve(Err(error.clone()));
                self.fail_resync(topic, error, now);
            }
            RequestKind::Subscribe => {
                request.resolve(Err(error.clone()));
                self.fail_subscribe(topic, error);
            }
            RequestKind::Unsubscribe => {
                request.resolve(Err(error.clone()));
                self.finish_unsubscribe(topic, Err(error), now);
            }
        }
    }

    /// Login result
    pub fn on_auth_result(&mut self, outcome: Result<(), Error>, now: Instant) {
        let Some((outcome, queued)) = self.auth.complete(outcome) else {
            debug!("login result without login in flight");
            return;
        };
        match outcome {
            Ok(()) => {
                let requests = queued
                    .into_iter()
                    .map(|q| AcquireRequest {
                        topic: q.topic,
                        sink: q.sink,
                        reply: q.reply,
                    })
                    .collect();
                self.attach_many(requests, now);
            }
            Err(e) => {
                for acquire in queued {
                    let _ = acquire.reply.send(Err(e.clone()));
                }
            }
        }
    }

    /// Keepalive response
    pub fn on_pong(&mut self, now: Instant) {
        let was = self.keepalive.health();
        self.keepalive.on_pong(now);
        if was != ConnectionHealth::Healthy {
            self.transport.health_changed(ConnectionHealth::Healthy);
        }
    }

    /// Order book snapshot or delta
    pub fn on_book(&mut self, topic: &Topic, action: BookAction, update: BookUpdate, now: Instant) {
        if !self.accepts_data(topic) {
            debug!(topic = %topic, "book frame for inactive topic");
            return;
        }

        match self.engine.apply(topic, action, update) {
            ApplyOutcome::Updated(snapshot) => {
                self.deliver(topic, StreamEvent::OrderBook(snapshot), now);
            }
            ApplyOutcome::Buffered | ApplyOutcome::Dropped => {}
            failure => self.on_replica_failure(topic, failure, now),
        }
    }

    /// Non-book data frame
    pub fn on_data(&mut self, topic: &Topic, payload: Value, now: Instant) {
        if !self.accepts_data(topic) {
            debug!(topic = %topic, "data frame for inactive topic");
            return;
        }
        self.deliver(topic, StreamEvent::Data(Arc::new(payload)), now);
    }

    // ------------------------------------------------------------------
    // Timer and transport
    // ------------------------------------------------------------------

    /// Periodic sweep: request timeouts, deferred releases, scheduled
    /// resyncs, login timeout and keepalive
    pub fn on_tick(&mut self, now: Instant) {
        for request in self
            .pending
            .take_expired(now, self.config.subscribe_timeout())
        {
            let topic = request.topic.clone();
            let error = Error::SubscriptionTimeout {
                topic: topic.clone(),
            };
            warn!(topic = %topic, kind = ?request.kind, "request timed out");
            let kind = request.kind;
            request.resolve(Err(error.clone()));
            match kind {
                RequestKind::Subscribe if self.is_resyncing(&topic) => {
                    self.fail_resync(&topic, error, now)
                }
                RequestKind::Subscribe => self.fail_subscribe(&topic, error),
                RequestKind::Unsubscribe => self.finish_unsubscribe(&topic, Err(error), now),
            }
        }

        for topic in self.registry.due_releases(now) {
            let Some(sub) = self.registry.get_mut(&topic) else {
                continue;
            };
            sub.release_at = None;
            if sub.consumers.is_empty() && sub.state == SubscriptionState::Subscribed {
                self.start_unsubscribe(&topic, None, now);
            }
        }

        for topic in self.engine.take_due_resyncs(now) {
            self.resync(&topic, now);
        }

        if self.auth.is_timed_out(now, self.config.auth_timeout()) {
            self.on_auth_result(
                Err(Error::AuthenticationFailed("login timed out".to_string())),
                now,
            );
        }

        match self.keepalive.on_tick(now) {
            KeepaliveAction::Probe => {
                if let Err(e) = self.send(&OutboundFrame::Ping) {
                    warn!(error = %e, "failed to send keepalive probe");
                }
            }
            KeepaliveAction::Stale => self.transport.health_changed(ConnectionHealth::Stale),
            KeepaliveAction::Idle => {}
        }
    }

    /// The transport lost its connection: fail everything in flight and
    /// reset every subscription
    pub fn handle_close(&mut self, reason: &str, now: Instant) {
        let error = Error::TransportClosed(reason.to_string());
        let active = self.registry.len();

        for request in self.pending.drain() {
            request.resolve(Err(error.clone()));
        }
        for acquire in self.auth.reset() {
            let _ = acquire.reply.send(Err(error.clone()));
        }
        for mut sub in self.registry.drain() {
            sub.deliver(&StreamEvent::Error(error.clone()));
            for queued in sub.queued {
                let _ = queued.reply.send(Err(error.clone()));
            }
        }
        self.engine.clear();
        self.keepalive.reset(now);

        if active > 0 {
            warn!(reason, topics = active, "transport closed, subscriptions reset");
        }
    }

    /// A new connection replaced the old one
    pub fn handle_reconnect(&mut self, now: Instant) {
        self.handle_close("connection re-established", now);
        info!("transport reconnected");
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn attach_many(&mut self, requests: Vec<AcquireRequest>, now: Instant) {
        let fresh: Vec<Topic> = requests
            .into_iter()
            .filter_map(|AcquireRequest { topic, sink, reply }| {
                self.attach(&topic, sink, reply, now).then_some(topic)
            })
            .collect();
        self.send_subscribes(fresh);
    }

    /// Returns `true` if `topic` now waits on a subscribe frame that still has
    /// to be sent
    fn attach(&mut self, topic: &Topic, sink: ConsumerSink, reply: Waiter, now: Instant) -> bool {
        let sub = self.registry.entry(topic);
        match sub.state {
            SubscriptionState::Subscribed => {
                sub.release_at = None;
                if let Some(snapshot) = self.engine.snapshot(topic) {
                    sink.deliver(StreamEvent::OrderBook(snapshot));
                }
                sub.consumers.push(sink);
                let _ = reply.send(Ok(()));
                false
            }
            SubscriptionState::Subscribing if sub.resyncing => {
                sub.release_at = None;
                sub.consumers.push(sink);
                let _ = reply.send(Ok(()));
                false
            }
            SubscriptionState::Subscribing => {
                sub.release_at = None;
                sub.consumers.push(sink);
                if let Err(reply) = self.pending.attach(topic, RequestKind::Subscribe, reply) {
                    let _ = reply.send(Ok(()));
                }
                false
            }
            SubscriptionState::Unsubscribing => {
                debug!(topic = %topic, "acquire queued behind unsubscribe");
                sub.queued.push(QueuedAcquire { sink, reply });
                false
            }
            SubscriptionState::Unsubscribed => {
                sub.state = SubscriptionState::Subscribing;
                sub.last_error = None;
                sub.consumers.push(sink);
                if topic.is_order_book() {
                    self.engine.track(topic);
                }
                self.pending
                    .register(topic, RequestKind::Subscribe, Some(reply), now)
            }
        }
    }

    /// Send one subscribe frame covering `topics`
    fn send_subscribes(&mut self, topics: Vec<Topic>) {
        let result = match topics.as_slice() {
            [] => return,
            [topic] => {
                debug!(topic = %topic, "subscribing");
                self.send(&OutboundFrame::Subscribe(topic.clone()))
            }
            _ => {
                debug!(topics = topics.len(), "subscribing in one frame");
                self.send(&OutboundFrame::SubscribeMany(topics.clone()))
            }
        };

        if let Err(e) = result {
            for topic in &topics {
                if let Some(request) = self.pending.take(topic, RequestKind::Subscribe) {
                    request.resolve(Err(e.clone()));
                }
                self.fail_subscribe(topic, e.clone());
            }
        }
    }

    /// Apply the release policy if `topic` has no consumers left
    fn on_consumers_changed(&mut self, topic: &Topic, reply: Option<Waiter>, now: Instant) {
        let Some(sub) = self.registry.get_mut(topic) else {
            resolve(reply, Ok(()));
            return;
        };
        if !sub.consumers.is_empty() || sub.state != SubscriptionState::Subscribed {
            resolve(reply, Ok(()));
            return;
        }
        match self.config.release_policy() {
            ReleasePolicy::Immediate => self.start_unsubscribe(topic, reply, now),
            ReleasePolicy::Deferred(delay) => {
                debug!(topic = %topic, ?delay, "release deferred");
                sub.release_at = Some(now + delay);
                resolve(reply, Ok(()));
            }
        }
    }

    fn start_unsubscribe(&mut self, topic: &Topic, reply: Option<Waiter>, now: Instant) {
        let Some(sub) = self.registry.get_mut(topic) else {
            resolve(reply, Ok(()));
            return;
        };
        sub.state = SubscriptionState::Unsubscribing;
        sub.release_at = None;
        self.engine.remove(topic);

        debug!(topic = %topic, "unsubscribing");
        if self
            .pending
            .register(topic, RequestKind::Unsubscribe, reply, now)
        {
            if let Err(e) = self.send(&OutboundFrame::Unsubscribe(topic.clone())) {
                if let Some(request) = self.pending.take(topic, RequestKind::Unsubscribe) {
                    request.resolve(Err(e.clone()));
                }
                self.finish_unsubscribe(topic, Err(e), now);
            }
        }
    }

    /// Leave `Unsubscribing` and replay acquires that queued behind it
    fn finish_unsubscribe(&mut self, topic: &Topic, outcome: Result<(), Error>, now: Instant) {
        if let Some(request) = self.pending.take(topic, RequestKind::Unsubscribe) {
            request.resolve(outcome);
        }
        let Some(sub) = self.registry.remove(topic) else {
            return;
        };
        let requests = sub
            .queued
            .into_iter()
            .map(|q| AcquireRequest {
                topic: topic.clone(),
                sink: q.sink,
                reply: q.reply,
            })
            .collect();
        self.attach_many(requests, now);
    }

    /// Reject a subscription: consumers get the error, the topic returns to
    /// `Unsubscribed`
    fn fail_subscribe(&mut self, topic: &Topic, error: Error) {
        self.engine.remove(topic);
        let Some(sub) = self.registry.get_mut(topic) else {
            return;
        };
        sub.deliver(&StreamEvent::Error(error.clone()));
        sub.consumers.clear();
        sub.state = SubscriptionState::Unsubscribed;
        sub.release_at = None;
        sub.last_error = Some(error);
    }

    /// Run the venue's resync action for a diverged order book
    fn resync(&mut self, topic: &Topic, now: Instant) {
        let state = self.registry.state(topic);
        if !matches!(state, SubscriptionState::Subscribed | SubscriptionState::Subscribing) {
            return;
        }

        let result = match self.classifier.resync_strategy() {
            ResyncStrategy::ResendSnapshot => {
                info!(topic = %topic, "requesting fresh snapshot");
                self.send(&OutboundFrame::ResendSnapshot(topic.clone()))
            }
            ResyncStrategy::Resubscribe => {
                // A first subscribe still in flight keeps its waiters; the
                // frames go out regardless so the venue sends a new snapshot
                let owned = self.pending.register(topic, RequestKind::Subscribe, None, now);
                if let Some(sub) = self.registry.get_mut(topic) {
                    sub.state = SubscriptionState::Subscribing;
                    sub.resyncing = owned || sub.resyncing;
                }
                info!(topic = %topic, "resubscribing for fresh snapshot");
                self.send(&OutboundFrame::Unsubscribe(topic.clone()))
                    .and_then(|_| self.send(&OutboundFrame::Subscribe(topic.clone())))
            }
        };

        let Err(e) = result else {
            return;
        };
        // Only a first subscribe still waiting on its ack fails the topic
        let first_subscribe = !self.is_resyncing(topic)
            && self.pending.contains(topic, RequestKind::Subscribe);
        if let Some(request) = self.pending.take(topic, RequestKind::Subscribe) {
            request.resolve(Err(e.clone()));
        }
        if first_subscribe {
            self.fail_subscribe(topic, e);
        } else {
            self.fail_resync(topic, e, now);
        }
    }

    /// A resync round trip failed: keep the consumers and count the attempt
    fn fail_resync(&mut self, topic: &Topic, error: Error, now: Instant) {
        let Some(sub) = self.registry.get_mut(topic) else {
            return;
        };
        if std::mem::take(&mut sub.resyncing) {
            sub.state = SubscriptionState::Subscribed;
        }
        warn!(topic = %topic, error = %error, "resync attempt failed");

        match self.engine.record_resync_failure(topic, error) {
            Some(outcome) => self.on_replica_failure(topic, outcome, now),
            None => debug!(topic = %topic, "replica already repaired"),
        }
        self.on_consumers_changed(topic, None, now);
    }

    /// Schedule the next resync, or report that the budget is spent
    fn on_replica_failure(&mut self, topic: &Topic, outcome: ApplyOutcome, now: Instant) {
        match outcome {
            ApplyOutcome::Resync {
                violation,
                attempt,
                delay,
            } => {
                if let Some(sub) = self.registry.get_mut(topic) {
                    sub.last_error = Some(violation);
                }
                if delay.is_zero() {
                    self.resync(topic, now);
                } else {
                    debug!(topic = %topic, attempt, ?delay, "resync scheduled");
                    self.engine.schedule_resync(topic, now + delay);
                }
            }
            ApplyOutcome::Exhausted(error) => {
                if let Some(sub) = self.registry.get_mut(topic) {
                    sub.last_error = Some(error.clone());
                }
                self.deliver(topic, StreamEvent::Error(error), now);
            }
            ApplyOutcome::Updated(_) | ApplyOutcome::Buffered | ApplyOutcome::Dropped => {}
        }
    }

    fn is_resyncing(&self, topic: &Topic) -> bool {
        self.registry.get(topic).is_some_and(|s| s.resyncing)
    }

    fn send_login(&mut self, now: Instant) {
        let result = match (self.config.credentials(), self.signer.as_deref()) {
            (Some(credentials), Some(signer)) => self
                .classifier
                .login_frame(credentials, signer, current_timestamp_ms())
                .and_then(|frame| self.transport.send(frame)),
            _ => Err(Error::AuthenticationFailed(
                "no credentials configured for private topics".to_string(),
            )),
        };
        if let Err(e) = result {
            let error = match e {
                Error::AuthenticationFailed(_) => e,
                other => Error::AuthenticationFailed(other.to_string()),
            };
            self.on_auth_result(Err(error), now);
        }
    }

    fn accepts_data(&self, topic: &Topic) -> bool {
        matches!(
            self.registry.state(topic),
            SubscriptionState::Subscribing | SubscriptionState::Subscribed
        )
    }

    fn deliver(&mut self, topic: &Topic, event: StreamEvent, now: Instant) {
        let Some(sub) = self.registry.get_mut(topic) else {
            return;
        };
        if sub.deliver(&event) > 0 {
            debug!(topic = %topic, "pruned closed consumers");
            self.on_consumers_changed(topic, None, now);
        }
    }

    fn send(&self, frame: &OutboundFrame) -> Result<(), Error> {
        let text = self.classifier.encode(frame)?;
        self.transport.send(text)
    }
}

fn resolve(reply: Option<Waiter>, outcome: Result<(), Error>) {
    if let Some(reply) = reply {
        let _ = reply.send(outcome);
    }
}
