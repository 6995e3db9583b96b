//! Outstanding subscribe/unsubscribe requests.
//!
//! At most one wire request exists per `(topic, kind)`. Callers arriving while
//! a request is in flight attach a waiter to it instead of sending another
//! frame; the acknowledgment (or rejection, or timeout) resolves every waiter
//! with the same outcome exactly once.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

use crate::error::Error;
use crate::types::Topic;

/// Reply channel for one waiting caller
pub type Waiter = oneshot::Sender<Result<(), Error>>;

/// Kind of wire request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Subscribe frame
    Subscribe,
    /// Unsubscribe frame
    Unsubscribe,
}

/// An in-flight wire request and the callers waiting on it
#[derive(Debug)]
pub struct PendingRequest {
    /// Topic the request is for
    pub topic: Topic,
    /// Subscribe or unsubscribe
    pub kind: RequestKind,
    /// When the frame was sent
    pub created_at: Instant,
    waiters: Vec<Waiter>,
}

impl PendingRequest {
    fn new(topic: Topic, kind: RequestKind, created_at: Instant) -> Self {
        Self {
            topic,
            kind,
            created_at,
            waiters: Vec::new(),
        }
    }

    /// Number of attached waiters
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    /// Send `result` to every waiter, consuming the request
    pub fn resolve(self, result: Result<(), Error>) {
        for waiter in self.waiters {
            // A waiter whose future was dropped no longer cares
            let _ = waiter.send(result.clone());
        }
    }
}

/// Table of in-flight requests keyed by `(topic, kind)`
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    requests: FxHashMap<(Topic, RequestKind), PendingRequest>,
}

impl PendingRequestTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request, creating it if none is in flight.
    ///
    /// Returns `true` if the request is new and the caller must send the wire
    /// frame, `false` if it coalesced onto an existing one.
    pub fn register(
        &mut self,
        topic: &Topic,
        kind: RequestKind,
        waiter: Option<Waiter>,
        now: Instant,
    ) -> bool {
        let mut created = false;
        let request = self
            .requests
            .entry((topic.clone(), kind))
            .or_insert_with(|| {
                created = true;
                PendingRequest::new(topic.clone(), kind, now)
            });
        if let Some(waiter) = waiter {
            request.waiters.push(waiter);
        }
        created
    }

    /// Attach a waiter to an existing request. Returns the waiter back if
    /// nothing is in flight.
    pub fn attach(&mut self, topic: &Topic, kind: RequestKind, waiter: Waiter) -> Result<(), Waiter> {
        match self.requests.get_mut(&(topic.clone(), kind)) {
            Some(request) => {
                request.waiters.push(waiter);
                Ok(())
            }
            None => Err(waiter),
        }
    }

    /// Remove a request so it can be resolved
    pub fn take(&mut self, topic: &Topic, kind: RequestKind) -> Option<PendingRequest> {
        self.requests.remove(&(topic.clone(), kind))
    }

    /// Whether a request is in flight
    pub fn contains(&self, topic: &Topic, kind: RequestKind) -> bool {
        self.requests.contains_key(&(topic.clone(), kind))
    }

    /// Remove the most recently created request for `topic`, of either kind
    pub fn take_most_recent(&mut self, topic: &Topic) -> Option<PendingRequest> {
        let kind = [RequestKind::Subscribe, RequestKind::Unsubscribe]
            .into_iter()
            .filter_map(|kind| {
                self.requests
                    .get(&(topic.clone(), kind))
                    .map(|r| (kind, r.created_at))
            })
            .max_by_key(|&(_, created_at)| created_at)
            .map(|(kind, _)| kind)?;
        self.take(topic, kind)
    }

    /// Remove every request older than `timeout`
    pub fn take_expired(&mut self, now: Instant, timeout: Duration) -> Vec<PendingRequest> {
        let expired: Vec<_> = self
            .requests
            .iter()
            .filter(|(_, r)| now.saturating_duration_since(r.created_at) >= timeout)
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| self.requests.remove(&key))
            .collect()
    }

    /// Remove every request
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        self.requests.drain().map(|(_, r)| r).collect()
    }

    /// Number of in-flight requests
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether nothing is in flight
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
