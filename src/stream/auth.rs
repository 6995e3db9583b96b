//! Authentication state machine for private topics.
//!
//! Login is lazy: the first acquire of a private topic sends the login frame
//! and every private acquire arriving before the result is queued. A failed
//! login rejects the queue and keeps rejecting private acquires until the
//! caller asks for a retry. Signing happens in [`crate::client::auth`].

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::Error;
use crate::types::Topic;

use super::consumer::ConsumerSink;
use super::pending::Waiter;

/// Authentication state of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No login attempted on this connection
    Unauthenticated,
    /// Login frame sent, waiting for the result
    Authenticating,
    /// Private topics may be subscribed
    Authenticated,
    /// Login rejected; private acquires fail until retried
    Failed,
}

/// What a private acquire must do next
#[derive(Debug, Clone)]
pub enum AuthGate {
    /// Session is authenticated; subscribe now
    Proceed,
    /// Login must be sent; queue the acquire
    SendLogin,
    /// Login in flight; queue the acquire
    Wait,
    /// Login failed earlier; reject the acquire
    Reject(Error),
}

/// Private acquire waiting for the login result
#[derive(Debug)]
pub struct QueuedPrivate {
    /// Topic to subscribe
    pub topic: Topic,
    /// Consumer to attach
    pub sink: ConsumerSink,
    /// Reply for the subscribe call
    pub reply: Waiter,
}

/// Per-connection authentication coordinator
#[derive(Debug)]
pub struct AuthCoordinator {
    state: AuthState,
    started_at: Option<Instant>,
    last_error: Option<Error>,
    queued: Vec<QueuedPrivate>,
}

impl Default for AuthCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthCoordinator {
    /// Create a coordinator in `Unauthenticated` state
    pub fn new() -> Self {
        Self {
            state: AuthState::Unauthenticated,
            started_at: None,
            last_error: None,
            queued: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Decide how a private acquire proceeds
    pub fn gate(&mut self, now: Instant) -> AuthGate {
        match self.state {
            AuthState::Authenticated => AuthGate::Proceed,
            AuthState::Authenticating => AuthGate::Wait,
            AuthState::Failed => AuthGate::Reject(
                self.last_error
                    .clone()
                    .unwrap_or_else(|| Error::AuthenticationFailed("login failed".into())),
            ),
            AuthState::Unauthenticated => {
                self.state = AuthState::Authenticating;
                self.started_at = Some(now);
                info!("authenticating connection");
                AuthGate::SendLogin
            }
        }
    }

    /// Queue a private acquire until the login result arrives
    pub fn queue(&mut self, acquire: QueuedPrivate) {
        self.queued.push(acquire);
    }

    /// Record the login outcome and hand back the queued acquires.
    ///
    /// Returns `None` when no login was in flight.
    pub fn complete(&mut self, outcome: Result<(), Error>) -> Option<(Result<(), Error>, Vec<QueuedPrivate>)> {
        if self.state != AuthState::Authenticating {
            return None;
        }
        self.started_at = None;
        match &outcome {
            Ok(()) => {
                self.state = AuthState::Authenticated;
                self.last_error = None;
                info!("authenticated");
            }
            Err(e) => {
                self.state = AuthState::Failed;
                self.last_error = Some(e.clone());
                warn!(error = %e, "authentication failed");
            }
        }
        Some((outcome, std::mem::take(&mut self.queued)))
    }

    /// Whether an in-flight login has exceeded `timeout`
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        self.state == AuthState::Authenticating
            && self
                .started_at
                .is_some_and(|at| now.saturating_duration_since(at) >= timeout)
    }

    /// Allow the next private acquire to log in again after a failure.
    ///
    /// Returns `false` if the coordinator was not in `Failed` state.
    pub fn retry(&mut self) -> bool {
        if self.state != AuthState::Failed {
            return false;
        }
        self.state = AuthState::Unauthenticated;
        self.last_error = None;
        true
    }

    /// Return to `Unauthenticated`, handing back anything still queued
    pub fn reset(&mut self) -> Vec<QueuedPrivate> {
        self.state = AuthState::Unauthenticated;
        self.started_at = None;
        self.last_error = None;
        std::mem::take(&mut self.queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::consumer::channel;
    use tokio::sync::oneshot;

    fn queued() -> (QueuedPrivate, oneshot::Receiver<Result<(), Error>>) {
        let (sink, _handle) = channel(Topic::balance(), 4, None);
        let (reply, rx) = oneshot::channel();
        (
            QueuedPrivate {
                topic: Topic::balance(),
                sink,
                reply,
            },
            rx,
        )
    }

    #[test]
    fn test_first_private_acquire_sends_login() {
        let mut auth = AuthCoordinator::new();
        let now = Instant::now();

        assert!(matches!(auth.gate(now), AuthGate::SendLogin));
        assert_eq!(auth.state(), AuthState::Authenticating);
        assert!(matches!(auth.gate(now), AuthGate::Wait));
    }

    #[test]
    fn test_success_releases_queue() {
        let mut auth = AuthCoordinator::new();
        auth.gate(Instant::now());
        let (q, _rx) = queued();
        auth.queue(q);

        let (outcome, queue) = auth.complete(Ok(())).unwrap();
        assert!(outcome.is_ok());
        assert_eq!(queue.len(), 1);
        assert_eq!(auth.state(), AuthState::Authenticated);
        assert!(matches!(auth.gate(Instant::now()), AuthGate::Proceed));
    }

    #[test]
    fn test_failure_rejects_until_retry() {
        let mut auth = AuthCoordinator::new();
        auth.gate(Instant::now());

        let (outcome, _) = auth
            .complete(Err(Error::AuthenticationFailed("bad sign".into())))
            .unwrap();
        assert!(outcome.is_err());
        assert_eq!(auth.state(), AuthState::Failed);

        match auth.gate(Instant::now()) {
            AuthGate::Reject(Error::AuthenticationFailed(msg)) => assert_eq!(msg, "bad sign"),
            other => panic!("unexpected {:?}", other),
        }

        assert!(auth.retry());
        assert!(!auth.retry());
        assert!(matches!(auth.gate(Instant::now()), AuthGate::SendLogin));
    }

    #[test]
    fn test_result_without_login_is_ignored() {
        let mut auth = AuthCoordinator::new();
        assert!(auth.complete(Ok(())).is_none());
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    }

    #[test]
    fn test_timeout() {
        let mut auth = AuthCoordinator::new();
        let now = Instant::now();
        let timeout = Duration::from_secs(10);
        assert!(!auth.is_timed_out(now, timeout));

        auth.gate(now);
        assert!(!auth.is_timed_out(now + Duration::from_secs(9), timeout));
        assert!(auth.is_timed_out(now + timeout, timeout));
    }

    #[test]
    fn test_reset_returns_queue() {
        let mut auth = AuthCoordinator::new();
        auth.gate(Instant::now());
        let (q, _rx) = queued();
        auth.queue(q);

        assert_eq!(auth.reset().len(), 1);
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    }
}
