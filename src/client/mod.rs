//! Async client surface.
//!
//! This module contains:
//!
//! - [`StreamClient`] - handle to one connection's event loop
//! - [`websocket`] - the [`Transport`] abstraction and its WebSocket implementation
//! - [`auth`] - credential signers for login frames
//!
//! [`StreamClient`] spawns a single task per connection that owns the
//! [`ConnectionContext`]. Every caller request is a message to that task and
//! every answer comes back on a oneshot channel, so callers never touch the
//! connection state directly.

pub mod auth;
pub mod websocket;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Error;
use crate::orderbook::OrderBookSnapshot;
use crate::stream::consumer::{self, ConsumerSink, ReleaseNotice};
use crate::stream::pending::Waiter;
use crate::stream::{
    AcquireRequest, AuthState, ConnectionContext, ConnectionHealth, ConsumerHandle, ConsumerId,
    MessageRouter, SubscriptionState,
};
use crate::types::{MarketType, Topic};
use crate::venue::FrameClassifier;

pub use auth::{HmacSha256Signer, RsaPssSigner, Signer};
pub use websocket::{Transport, TransportEvent, WebSocketTransport};

/// Capacity of the caller command queue
const COMMAND_BUFFER: usize = 256;

#[derive(Debug)]
enum Command {
    Subscribe {
        topic: Topic,
        sink: ConsumerSink,
        reply: Waiter,
    },
    SubscribeMany {
        requests: Vec<AcquireRequest>,
    },
    Unsubscribe {
        topic: Topic,
        id: ConsumerId,
        reply: Waiter,
    },
    OrderBook {
        topic: Topic,
        reply: oneshot::Sender<Option<Arc<OrderBookSnapshot>>>,
    },
    SubscriptionState {
        topic: Topic,
        reply: oneshot::Sender<SubscriptionState>,
    },
    ConsumerCount {
        topic: Topic,
        reply: oneshot::Sender<usize>,
    },
    LastError {
        topic: Topic,
        reply: oneshot::Sender<Option<Error>>,
    },
    AuthState {
        reply: oneshot::Sender<AuthState>,
    },
    RetryAuthentication {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Handle to a streaming connection
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use market_sync::client::StreamClient;
/// use market_sync::venue::{coincatch, CoincatchProtocol};
/// use market_sync::{Config, StreamEvent};
///
/// # async fn example() -> market_sync::Result<()> {
/// let config = Config::new(coincatch::PUBLIC_URL)?;
/// let client = StreamClient::connect(config, Arc::new(CoincatchProtocol::new()), None).await?;
///
/// let mut book = client.watch_order_book("BTC/USDT", None).await?;
/// while let Some(event) = book.recv().await {
///     if let StreamEvent::OrderBook(view) = event {
///         println!("best bid {:?} best ask {:?}", view.bids.first(), view.asks.first());
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StreamClient {
    commands: mpsc::Sender<Command>,
    releases: mpsc::UnboundedSender<ReleaseNotice>,
    health: watch::Receiver<ConnectionHealth>,
    consumer_capacity: usize,
    task: JoinHandle<()>,
}

impl StreamClient {
    /// Open a WebSocket connection to the configured URL and start the event loop
    ///
    /// # Errors
    ///
    /// Returns an error if the initial connection fails.
    pub async fn connect(
        config: Config,
        venue: Arc<dyn FrameClassifier>,
        signer: Option<Arc<dyn Signer>>,
    ) -> Result<Self, Error> {
        let (transport, events) = WebSocketTransport::connect(&config).await?;
        Ok(Self::new(config, venue, signer, transport, events))
    }

    /// Start the event loop over an existing transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: Config,
        venue: Arc<dyn FrameClassifier>,
        signer: Option<Arc<dyn Signer>>,
        transport: Arc<dyn Transport>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (releases, release_rx) = mpsc::unbounded_channel();
        let consumer_capacity = config.consumer_capacity();
        let tick_interval = config.tick_interval();

        let router = MessageRouter::new(Arc::clone(&venue));
        let ctx = ConnectionContext::new(config, venue, transport, signer, now());
        let health = ctx.health();

        let event_loop = EventLoop {
            ctx,
            router,
            commands: command_rx,
            releases: release_rx,
            events,
        };
        let task = tokio::spawn(event_loop.run(tick_interval));

        Self {
            commands,
            releases,
            health,
            consumer_capacity,
            task,
        }
    }

    /// Subscribe to `topic`.
    ///
    /// Resolves once the venue confirmed the subscription, or immediately if
    /// the topic is already active. Concurrent subscribes to the same topic
    /// share one wire request.
    ///
    /// # Errors
    ///
    /// Returns the rejection, timeout, authentication or transport error that
    /// prevented the subscription.
    pub async fn subscribe(&self, topic: Topic) -> Result<ConsumerHandle, Error> {
        let (sink, mut handle) = consumer::channel(
            topic.clone(),
            self.consumer_capacity,
            Some(self.releases.clone()),
        );
        let (reply, rx) = oneshot::channel();
        let result = self
            .request(Command::Subscribe { topic, sink, reply }, rx)
            .await
            .and_then(|outcome| outcome);
        match result {
            Ok(()) => Ok(handle),
            Err(e) => {
                // The event loop already forgot this consumer
                handle.disarm();
                Err(e)
            }
        }
    }

    /// Subscribe to several topics at once.
    ///
    /// Topics that are not active yet go to the venue in a single subscribe
    /// frame. Returns one handle per topic, in order, once every topic is
    /// active.
    ///
    /// # Errors
    ///
    /// Fails with the first error among the topics. Handles of the topics
    /// that did succeed are released again.
    pub async fn subscribe_many(&self, topics: Vec<Topic>) -> Result<Vec<ConsumerHandle>, Error> {
        let mut handles = Vec::with_capacity(topics.len());
        let mut replies = Vec::with_capacity(topics.len());
        let mut requests = Vec::with_capacity(topics.len());
        for topic in topics {
            let (sink, handle) = consumer::channel(
                topic.clone(),
                self.consumer_capacity,
                Some(self.releases.clone()),
            );
            let (reply, rx) = oneshot::channel();
            requests.push(AcquireRequest { topic, sink, reply });
            handles.push(handle);
            replies.push(rx);
        }

        if self
            .commands
            .send(Command::SubscribeMany { requests })
            .await
            .is_err()
        {
            handles.iter_mut().for_each(ConsumerHandle::disarm);
            return Err(stopped());
        }

        let mut first_error = None;
        for (handle, rx) in handles.iter_mut().zip(replies) {
            let outcome = rx.await.map_err(|_| stopped()).and_then(|outcome| outcome);
            if let Err(e) = outcome {
                handle.disarm();
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            // Dropping the remaining handles releases the topics that succeeded
            Some(e) => Err(e),
            None => Ok(handles),
        }
    }

    /// Release a handle and wait for the release to complete.
    ///
    /// Dropping a handle releases it too, without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the venue rejected or never acknowledged the
    /// unsubscribe that the last release triggered.
    pub async fn unsubscribe(&self, mut handle: ConsumerHandle) -> Result<(), Error> {
        handle.disarm();
        let topic = handle.topic().clone();
        let id = handle.id();
        drop(handle);

        let (reply, rx) = oneshot::channel();
        self.request(Command::Unsubscribe { topic, id, reply }, rx)
            .await
            .and_then(|outcome| outcome)
    }

    /// Stream order book views for `symbol`
    pub async fn watch_order_book(
        &self,
        symbol: &str,
        depth: Option<u16>,
    ) -> Result<ConsumerHandle, Error> {
        self.subscribe(Topic::order_book(symbol, depth)).await
    }

    /// Stream order books for several symbols, subscribed in one frame
    pub async fn watch_order_book_for_symbols(
        &self,
        symbols: &[&str],
        depth: Option<u16>,
    ) -> Result<Vec<ConsumerHandle>, Error> {
        let topics = symbols.iter().map(|s| Topic::order_book(*s, depth)).collect();
        self.subscribe_many(topics).await
    }

    /// Stream ticker updates for `symbol`
    pub async fn watch_ticker(&self, symbol: &str) -> Result<ConsumerHandle, Error> {
        self.subscribe(Topic::ticker(symbol)).await
    }

    /// Stream tickers for several symbols, subscribed in one frame
    pub async fn watch_tickers(&self, symbols: &[&str]) -> Result<Vec<ConsumerHandle>, Error> {
        self.subscribe_many(symbols.iter().map(|s| Topic::ticker(*s)).collect())
            .await
    }

    /// Stream public trades for `symbol`
    pub async fn watch_trades(&self, symbol: &str) -> Result<ConsumerHandle, Error> {
        self.subscribe(Topic::trades(symbol)).await
    }

    /// Stream public trades for several symbols, subscribed in one frame
    pub async fn watch_trades_for_symbols(
        &self,
        symbols: &[&str],
    ) -> Result<Vec<ConsumerHandle>, Error> {
        self.subscribe_many(symbols.iter().map(|s| Topic::trades(*s)).collect())
            .await
    }

    /// Stream candles for `symbol` at `timeframe` (`1m`, `1h`, `1d`, ...)
    pub async fn watch_ohlcv(&self, symbol: &str, timeframe: &str) -> Result<ConsumerHandle, Error> {
        self.subscribe(Topic::ohlcv(symbol, timeframe)).await
    }

    /// Stream spot account balance updates (private)
    pub async fn watch_balance(&self) -> Result<ConsumerHandle, Error> {
        self.subscribe(Topic::balance()).await
    }

    /// Stream balance updates of the `market` account (private)
    pub async fn watch_balance_for(&self, market: MarketType) -> Result<ConsumerHandle, Error> {
        self.subscribe(Topic::balance_for(market)).await
    }

    /// Stream spot order updates (private)
    pub async fn watch_orders(&self) -> Result<ConsumerHandle, Error> {
        self.subscribe(Topic::orders()).await
    }

    /// Stream order updates of the account that trades `symbol` (private).
    ///
    /// The stream covers every market of that type; `BTC/USDT:USDT` selects
    /// linear contracts, `BTC/USD:BTC` inverse ones.
    pub async fn watch_orders_for(&self, symbol: &str) -> Result<ConsumerHandle, Error> {
        self.subscribe(Topic::orders_for(MarketType::from_symbol(symbol)))
            .await
    }

    /// Stream linear contract position updates (private)
    pub async fn watch_positions(&self) -> Result<ConsumerHandle, Error> {
        self.subscribe(Topic::positions()).await
    }

    /// Stream position updates of the contract account that trades `symbol` (private)
    pub async fn watch_positions_for(&self, symbol: &str) -> Result<ConsumerHandle, Error> {
        self.subscribe(Topic::positions_for(MarketType::from_symbol(symbol)))
            .await
    }

    /// Current view of a synchronized order book
    pub async fn order_book(&self, topic: &Topic) -> Result<Option<Arc<OrderBookSnapshot>>, Error> {
        let (reply, rx) = oneshot::channel();
        let topic = topic.clone();
        self.request(Command::OrderBook { topic, reply }, rx).await
    }

    /// Lifecycle state of `topic`
    pub async fn subscription_state(&self, topic: &Topic) -> Result<SubscriptionState, Error> {
        let (reply, rx) = oneshot::channel();
        let topic = topic.clone();
        self.request(Command::SubscriptionState { topic, reply }, rx)
            .await
    }

    /// Number of live handles on `topic`
    pub async fn consumer_count(&self, topic: &Topic) -> Result<usize, Error> {
        let (reply, rx) = oneshot::channel();
        let topic = topic.clone();
        self.request(Command::ConsumerCount { topic, reply }, rx).await
    }

    /// Last failure recorded for `topic`
    pub async fn last_error(&self, topic: &Topic) -> Result<Option<Error>, Error> {
        let (reply, rx) = oneshot::channel();
        let topic = topic.clone();
        self.request(Command::LastError { topic, reply }, rx).await
    }

    /// Authentication state of the connection
    pub async fn auth_state(&self) -> Result<AuthState, Error> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::AuthState { reply }, rx).await
    }

    /// Clear a failed login so the next private subscribe logs in again.
    ///
    /// Returns `false` if authentication had not failed.
    pub async fn retry_authentication(&self) -> Result<bool, Error> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::RetryAuthentication { reply }, rx)
            .await
    }

    /// Watch connection health as reported by the keepalive monitor
    pub fn health(&self) -> watch::Receiver<ConnectionHealth> {
        self.health.clone()
    }

    /// Whether the event loop is still running
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the event loop. Outstanding requests fail with
    /// [`Error::TransportClosed`] and every handle's stream ends.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let _ = self.task.await;
    }

    async fn request<T>(&self, command: Command, rx: oneshot::Receiver<T>) -> Result<T, Error> {
        self.commands
            .send(command)
            .await
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }
}

fn stopped() -> Error {
    Error::TransportClosed("stream client stopped".to_string())
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

struct EventLoop {
    ctx: ConnectionContext,
    router: MessageRouter,
    commands: mpsc::Receiver<Command>,
    releases: mpsc::UnboundedReceiver<ReleaseNotice>,
    events: mpsc::Receiver<TransportEvent>,
}

impl EventLoop {
    async fn run(mut self, tick_interval: Duration) {
        let mut tick = tokio::time::interval(tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        self.ctx.handle_close("client shut down", now());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                },
                Some((topic, id)) = self.releases.recv() => {
                    self.ctx.release(&topic, id, None, now());
                }
                event = self.events.recv() => match event {
                    Some(TransportEvent::Message(text)) => {
                        self.router.route(&mut self.ctx, &text, now());
                    }
                    Some(TransportEvent::Closed(reason)) => self.ctx.handle_close(&reason, now()),
                    Some(TransportEvent::Reconnected) => self.ctx.handle_reconnect(now()),
                    None => {
                        self.ctx.handle_close("transport stopped", now());
                        break;
                    }
                },
                _ = tick.tick() => self.ctx.on_tick(now()),
            }
        }
        info!("stream event loop stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe { topic, sink, reply } => {
                debug!(topic = %topic, consumer = %sink.id(), "subscribe requested");
                self.ctx.acquire(topic, sink, reply, now());
            }
            Command::SubscribeMany { requests } => {
                debug!(topics = requests.len(), "batch subscribe requested");
                self.ctx.acquire_many(requests, now());
            }
            Command::Unsubscribe { topic, id, reply } => {
                self.ctx.release(&topic, id, Some(reply), now());
            }
            Command::OrderBook { topic, reply } => {
                let _ = reply.send(self.ctx.order_book(&topic));
            }
            Command::SubscriptionState { topic, reply } => {
                let _ = reply.send(self.ctx.subscription_state(&topic));
            }
            Command::ConsumerCount { topic, reply } => {
                let _ = reply.send(self.ctx.consumer_count(&topic));
            }
            Command::LastError { topic, reply } => {
                let _ = reply.send(self.ctx.last_error(&topic));
            }
            Command::AuthState { reply } => {
                let _ = reply.send(self.ctx.auth_state());
            }
            Command::RetryAuthentication { reply } => {
                let _ = reply.send(self.ctx.retry_authentication());
            }
            Command::Shutdown => {}
        }
    }
}
