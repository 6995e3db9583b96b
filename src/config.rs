//! Configuration for a streaming connection.
//!
//! This module provides the [`Config`] struct holding the endpoint, login
//! credentials and the timing/buffering knobs of the streaming core, plus the
//! backoff settings for resynchronization ([`ResyncConfig`]) and transport
//! reconnection ([`ReconnectConfig`]).

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Login identity for private channels.
///
/// The secret itself lives in the [`Signer`](crate::client::auth::Signer);
/// only the public parts of the credential are kept here.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    passphrase: Option<String>,
}

impl Credentials {
    /// Create credentials from an API key and optional passphrase
    pub fn new(api_key: impl Into<String>, passphrase: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            passphrase,
        }
    }

    /// Get the API key
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the passphrase
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

/// What to do when the last consumer of a topic goes away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// Send the unsubscribe frame right away
    #[default]
    Immediate,
    /// Wait this long for a new consumer before unsubscribing
    Deferred(Duration),
}

/// Backoff for order book resynchronization.
///
/// The first resync after a violation is immediate; each further consecutive
/// failure waits `initial_delay * multiplier^(n-2)`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ResyncConfig {
    /// Consecutive failed resyncs before the topic reports `ResyncExhausted`
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl ResyncConfig {
    /// Delay before resync attempt number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi(attempt as i32 - 2);
        let delay_ms = self.initial_delay.as_millis() as f64 * factor;
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as f64) as u64)
    }
}

/// Configuration for transport reconnection behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (0 = infinite)
    pub max_retries: u32,
    /// Initial delay between reconnection attempts
    pub initial_delay_ms: u64,
    /// Maximum delay between reconnection attempts
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given retry attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }
}

/// Configuration for one streaming connection
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use market_sync::config::{Config, ReleasePolicy};
///
/// let config = Config::new("wss://ws.coincatch.com/public/v1/stream")
///     .unwrap()
///     .with_credentials("api-key", Some("passphrase".to_string()))
///     .with_subscribe_timeout(Duration::from_secs(5))
///     .with_release_policy(ReleasePolicy::Deferred(Duration::from_secs(2)));
///
/// assert_eq!(config.subscribe_timeout(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint
    url: Url,

    /// Login identity (required for private channels)
    credentials: Option<Credentials>,

    /// How long a subscribe/unsubscribe may wait for its ack
    subscribe_timeout: Duration,

    /// How long the login handshake may take
    auth_timeout: Duration,

    /// Interval between liveness probes
    keepalive_interval: Duration,

    /// How long a probe may wait for its pong
    keepalive_timeout: Duration,

    /// Resolution of the event-loop timer
    tick_interval: Duration,

    /// Unsubscribe behavior when a topic loses its last consumer
    release_policy: ReleasePolicy,

    /// Per-consumer delivery queue size
    consumer_capacity: usize,

    /// Deltas kept while waiting for a snapshot
    delta_buffer_limit: usize,

    /// Resynchronization backoff
    resync: ResyncConfig,

    /// Transport reconnection backoff
    reconnect: ReconnectConfig,
}

impl Config {
    /// Create a configuration for the given endpoint
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL does not parse or is not a
    /// `ws`/`wss` URL.
    pub fn new(url: &str) -> Result<Self, Error> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "expected ws:// or wss:// endpoint, got {}",
                url.scheme()
            )));
        }
        Ok(Self {
            url,
            credentials: None,
            subscribe_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(10),
            tick_interval: Duration::from_millis(100),
            release_policy: ReleasePolicy::default(),
            consumer_capacity: 1024,
            delta_buffer_limit: 1000,
            resync: ResyncConfig::default(),
            reconnect: ReconnectConfig::default(),
        })
    }

    /// Set login credentials
    #[must_use]
    pub fn with_credentials(mut self, api_key: impl Into<String>, passphrase: Option<String>) -> Self {
        self.credentials = Some(Credentials::new(api_key, passphrase));
        self
    }

    /// Set the subscribe/unsubscribe ack timeout
    #[must_use]
    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Set the login handshake timeout
    #[must_use]
    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Set keepalive probe interval and pong timeout
    #[must_use]
    pub fn with_keepalive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.keepalive_interval = interval;
        self.keepalive_timeout = timeout;
        self
    }

    /// Set the event-loop timer resolution
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the release policy
    #[must_use]
    pub fn with_release_policy(mut self, policy: ReleasePolicy) -> Self {
        self.release_policy = policy;
        self
    }

    /// Set the per-consumer queue size (minimum 1)
    #[must_use]
    pub fn with_consumer_capacity(mut self, capacity: usize) -> Self {
        self.consumer_capacity = capacity.max(1);
        self
    }

    /// Set how many deltas are buffered while waiting for a snapshot
    #[must_use]
    pub fn with_delta_buffer_limit(mut self, limit: usize) -> Self {
        self.delta_buffer_limit = limit;
        self
    }

    /// Set resync backoff
    #[must_use]
    pub fn with_resync(mut self, resync: ResyncConfig) -> Self {
        self.resync = resync;
        self
    }

    /// Set reconnect backoff
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Get the endpoint URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the credentials
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Get the subscribe ack timeout
    pub fn subscribe_timeout(&self) -> Duration {
        self.subscribe_timeout
    }

    /// Get the login timeout
    pub fn auth_timeout(&self) -> Duration {
        self.auth_timeout
    }

    /// Get the keepalive probe interval
    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    /// Get the keepalive pong timeout
    pub fn keepalive_timeout(&self) -> Duration {
        self.keepalive_timeout
    }

    /// Get the timer resolution
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Get the release policy
    pub fn release_policy(&self) -> ReleasePolicy {
        self.release_policy
    }

    /// Get the per-consumer queue size
    pub fn consumer_capacity(&self) -> usize {
        self.consumer_capacity
    }

    /// Get the delta buffer limit
    pub fn delta_buffer_limit(&self) -> usize {
        self.delta_buffer_limit
    }

    /// Get resync settings
    pub fn resync(&self) -> &ResyncConfig {
        &self.resync
    }

    /// Get reconnect settings
    pub fn reconnect(&self) -> &ReconnectConfig {
        &self.reconnect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::new("wss://example.com/ws").unwrap();
        assert_eq!(config.subscribe_timeout(), Duration::from_secs(10));
        assert_eq!(config.keepalive_interval(), Duration::from_secs(30));
        assert_eq!(config.release_policy(), ReleasePolicy::Immediate);
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        assert!(matches!(
            Config::new("https://example.com"),
            Err(Error::Config(_))
        ));
        assert!(matches!(Config::new("not a url"), Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_pattern() {
        let config = Config::new("ws://localhost:9000")
            .unwrap()
            .with_credentials("key", Some("pass".into()))
            .with_auth_timeout(Duration::from_secs(3))
            .with_consumer_capacity(0)
            .with_delta_buffer_limit(16);

        assert_eq!(config.credentials().map(|c| c.api_key()), Some("key"));
        assert_eq!(config.auth_timeout(), Duration::from_secs(3));
        assert_eq!(config.consumer_capacity(), 1);
        assert_eq!(config.delta_buffer_limit(), 16);
    }

    #[test]
    fn test_credentials_debug_hides_passphrase() {
        let creds = Credentials::new("key", Some("hunter2".into()));
        let debug = format!("{:?}", creds);
        assert!(debug.contains("key"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_resync_delays() {
        let resync = ResyncConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff_multiplier: 2.0,
        };
        assert_eq!(resync.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(resync.delay_for_attempt(2), Duration::from_millis(100));
        assert_eq!(resync.delay_for_attempt(3), Duration::from_millis(200));
        assert_eq!(resync.delay_for_attempt(4), Duration::from_millis(300));
    }

    #[test]
    fn test_reconnect_delays() {
        let reconnect = ReconnectConfig {
            max_retries: 0,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            backoff_multiplier: 2.0,
        };
        assert_eq!(reconnect.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(reconnect.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(reconnect.delay_for_attempt(10), Duration::from_millis(1000));
    }
}
