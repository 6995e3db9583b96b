//! WebSocket transport.
//!
//! The stream core talks to the network through the [`Transport`] trait: an
//! ordered, non-blocking `send`, plus a stream of [`TransportEvent`]s. This
//! module provides [`WebSocketTransport`], a tokio-tungstenite implementation
//! that runs a driver task per connection:
//!
//! - Text frames are forwarded as [`TransportEvent::Message`]
//! - Protocol-level pings are answered automatically
//! - A lost connection is reported as [`TransportEvent::Closed`], then
//!   re-established with exponential backoff and reported as
//!   [`TransportEvent::Reconnected`]
//! - A [`ConnectionHealth::Stale`] signal from the keepalive monitor forces a
//!   reconnect
//!
//! # Example
//!
//! ```rust,no_run
//! use market_sync::client::websocket::{Transport, TransportEvent, WebSocketTransport};
//! use market_sync::Config;
//!
//! # async fn example() -> market_sync::Result<()> {
//! let config = Config::new("wss://ws.coincatch.com/public/v1/stream")?;
//! let (transport, mut events) = WebSocketTransport::connect(&config).await?;
//!
//! transport.send("ping".to_string())?;
//! while let Some(event) = events.recv().await {
//!     if let TransportEvent::Message(text) = event {
//!         println!("{}", text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{Config, ReconnectConfig};
use crate::error::Error;
use crate::stream::ConnectionHealth;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the inbound event queue
const EVENT_BUFFER: usize = 1024;

/// Outbound side of a connection
pub trait Transport: Send + Sync + fmt::Debug {
    /// Queue a text frame. Frames go out in call order.
    fn send(&self, frame: String) -> Result<(), Error>;

    /// Liveness signal from the keepalive monitor
    fn health_changed(&self, _health: ConnectionHealth) {}
}

/// Inbound side of a connection, in peer order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Text frame from the venue
    Message(String),
    /// Connection lost
    Closed(String),
    /// A new connection replaced the lost one
    Reconnected,
}

#[derive(Debug)]
enum DriverCommand {
    Send(String),
    Reconnect,
    Close,
}

/// tokio-tungstenite transport with automatic reconnection
pub struct WebSocketTransport {
    commands: mpsc::UnboundedSender<DriverCommand>,
    url: Url,
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url.as_str())
            .field("running", &!self.commands.is_closed())
            .finish()
    }
}

impl WebSocketTransport {
    /// Connect to the configured endpoint and start the driver task
    ///
    /// # Errors
    ///
    /// Returns an error if the initial connection fails.
    pub async fn connect(
        config: &Config,
    ) -> Result<(Arc<Self>, mpsc::Receiver<TransportEvent>), Error> {
        let url = config.url().clone();
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        info!(url = %url, "websocket connected");

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let driver = Driver {
            url: url.clone(),
            reconnect: config.reconnect().clone(),
            commands: command_rx,
            events: event_tx,
        };
        tokio::spawn(driver.run(stream));

        Ok((Arc::new(Self { commands, url }), event_rx))
    }

    /// Close the connection and stop the driver
    pub fn close(&self) {
        let _ = self.commands.send(DriverCommand::Close);
    }

    /// Whether the driver task is still running
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

impl Transport for WebSocketTransport {
    fn send(&self, frame: String) -> Result<(), Error> {
        self.commands
            .send(DriverCommand::Send(frame))
            .map_err(|_| Error::TransportClosed("websocket driver stopped".to_string()))
    }

    fn health_changed(&self, health: ConnectionHealth) {
        if health == ConnectionHealth::Stale {
            let _ = self.commands.send(DriverCommand::Reconnect);
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

struct Driver {
    url: Url,
    reconnect: ReconnectConfig,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    events: mpsc::Sender<TransportEvent>,
}

impl Driver {
    async fn run(mut self, stream: WsStream) {
        let mut stream = stream;
        loop {
            let (mut write, mut read) = stream.split();

            let reason = loop {
                tokio::select! {
                    command = self.commands.recv() => match command {
                        Some(DriverCommand::Send(text)) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                break e.to_string();
                            }
                        }
                        Some(DriverCommand::Reconnect) => {
                            let _ = write.close().await;
                            break "keepalive timeout".to_string();
                        }
                        Some(DriverCommand::Close) | None => {
                            let _ = write.close().await;
                            debug!("websocket driver stopped");
                            return;
                        }
                    },
                    message = read.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            if self.events.send(TransportEvent::Message(text)).await.is_err() {
                                let _ = write.close().await;
                                return;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            // Respond to pings automatically
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                break e.to_string();
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break frame.map_or_else(
                                || "closed by peer".to_string(),
                                |f| format!("closed by peer: {}", f.reason),
                            );
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break e.to_string(),
                        None => break "stream ended".to_string(),
                    },
                }
            };

            warn!(url = %self.url, reason = %reason, "websocket connection lost");
            if self.events.send(TransportEvent::Closed(reason)).await.is_err() {
                return;
            }

            match self.reconnect().await {
                Some(next) => {
                    stream = next;
                    if self.events.send(TransportEvent::Reconnected).await.is_err() {
                        return;
                    }
                }
                None => return,
            }
        }
    }

    async fn reconnect(&mut self) -> Option<WsStream> {
        let mut attempt = 0u32;
        loop {
            // Check max retries
            if self.reconnect.max_retries > 0 && attempt >= self.reconnect.max_retries {
                warn!(url = %self.url, attempts = attempt, "giving up on reconnect");
                return None;
            }

            // Calculate and wait for backoff delay
            tokio::time::sleep(self.reconnect.delay_for_attempt(attempt)).await;
            attempt += 1;

            // Frames queued while disconnected belong to the old session
            while let Ok(command) = self.commands.try_recv() {
                if matches!(command, DriverCommand::Close) {
                    return None;
                }
            }

            match tokio_tungstenite::connect_async(self.url.as_str()).await {
                Ok((stream, _response)) => {
                    info!(url = %self.url, attempt, "websocket reconnected");
                    return Some(stream);
                }
                Err(e) => {
                    warn!(url = %self.url, attempt, error = %e, "reconnect failed");
                }
            }
        }
    }
}
