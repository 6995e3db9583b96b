//! Connection liveness probing.
//!
//! Sends a probe every `interval`; if the matching pong does not arrive within
//! `timeout`, the connection is reported [`ConnectionHealth::Stale`]. The
//! monitor only reports; reconnect decisions belong to the transport.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, warn};

/// Liveness of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// Pongs are arriving in time
    Healthy,
    /// A probe went unanswered
    Stale,
}

/// What the event loop should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    /// Nothing to do
    Idle,
    /// Send a probe now
    Probe,
    /// The connection just became stale
    Stale,
}

/// Probe/response tracker for one connection
#[derive(Debug)]
pub struct KeepaliveMonitor {
    interval: Duration,
    timeout: Duration,
    last_probe: Option<Instant>,
    awaiting_since: Option<Instant>,
    last_rtt: Option<Duration>,
    health: watch::Sender<ConnectionHealth>,
}

impl KeepaliveMonitor {
    /// Create a monitor. The first probe goes out one `interval` after `now`.
    pub fn new(interval: Duration, timeout: Duration, now: Instant) -> Self {
        let (health, _) = watch::channel(ConnectionHealth::Healthy);
        Self {
            interval,
            timeout,
            last_probe: Some(now),
            awaiting_since: None,
            last_rtt: None,
            health,
        }
    }

    /// Subscribe to health changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionHealth> {
        self.health.subscribe()
    }

    /// Current health
    pub fn health(&self) -> ConnectionHealth {
        *self.health.borrow()
    }

    /// Round-trip time of the last answered probe
    pub fn last_rtt(&self) -> Option<Duration> {
        self.last_rtt
    }

    /// Advance the monitor
    pub fn on_tick(&mut self, now: Instant) -> KeepaliveAction {
        if let Some(sent) = self.awaiting_since {
            if now.saturating_duration_since(sent) >= self.timeout {
                self.awaiting_since = None;
                if self.health() == ConnectionHealth::Healthy {
                    warn!(timeout = ?self.timeout, "keepalive probe unanswered, connection stale");
                    self.health.send_replace(ConnectionHealth::Stale);
                    return KeepaliveAction::Stale;
                }
            }
            return KeepaliveAction::Idle;
        }

        if self.health() == ConnectionHealth::Stale {
            return KeepaliveAction::Idle;
        }

        let due = self
            .last_probe
            .map_or(true, |at| now.saturating_duration_since(at) >= self.interval);
        if due {
            self.last_probe = Some(now);
            self.awaiting_since = Some(now);
            return KeepaliveAction::Probe;
        }
        KeepaliveAction::Idle
    }

    /// Record a pong
    pub fn on_pong(&mut self, now: Instant) {
        if let Some(sent) = self.awaiting_since.take() {
            let rtt = now.saturating_duration_since(sent);
            self.last_rtt = Some(rtt);
            debug!(?rtt, "pong received");
        }
        if self.health() != ConnectionHealth::Healthy {
            self.health.send_replace(ConnectionHealth::Healthy);
        }
    }

    /// Start over after a reconnect
    pub fn reset(&mut self, now: Instant) {
        self.last_probe = Some(now);
        self.awaiting_since = None;
        if self.health() != ConnectionHealth::Healthy {
            self.health.send_replace(ConnectionHealth::Healthy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(now: Instant) -> KeepaliveMonitor {
        KeepaliveMonitor::new(Duration::from_secs(30), Duration::from_secs(10), now)
    }

    #[test]
    fn test_probe_every_interval() {
        let start = Instant::now();
        let mut keepalive = monitor(start);

        assert_eq!(keepalive.on_tick(start + Duration::from_secs(29)), KeepaliveAction::Idle);
        assert_eq!(keepalive.on_tick(start + Duration::from_secs(30)), KeepaliveAction::Probe);
        // Waiting for the pong
        assert_eq!(keepalive.on_tick(start + Duration::from_secs(31)), KeepaliveAction::Idle);

        keepalive.on_pong(start + Duration::from_secs(31));
        assert_eq!(keepalive.last_rtt(), Some(Duration::from_secs(1)));
        assert_eq!(keepalive.on_tick(start + Duration::from_secs(59)), KeepaliveAction::Idle);
        assert_eq!(keepalive.on_tick(start + Duration::from_secs(60)), KeepaliveAction::Probe);
    }

    #[test]
    fn test_unanswered_probe_marks_stale_once() {
        let start = Instant::now();
        let mut keepalive = monitor(start);
        let health = keepalive.subscribe();

        keepalive.on_tick(start + Duration::from_secs(30));
        assert_eq!(keepalive.on_tick(start + Duration::from_secs(40)), KeepaliveAction::Stale);
        assert_eq!(*health.borrow(), ConnectionHealth::Stale);
        assert_eq!(keepalive.on_tick(start + Duration::from_secs(100)), KeepaliveAction::Idle);
    }

    #[test]
    fn test_reset_restores_health() {
        let start = Instant::now();
        let mut keepalive = monitor(start);
        keepalive.on_tick(start + Duration::from_secs(30));
        keepalive.on_tick(start + Duration::from_secs(40));

        keepalive.reset(start + Duration::from_secs(41));
        assert_eq!(keepalive.health(), ConnectionHealth::Healthy);
        assert_eq!(keepalive.on_tick(start + Duration::from_secs(71)), KeepaliveAction::Probe);
    }
}
