//! WebSocket subscription to the bus server.

use crate::bus::error::BusError;
use crate::bus::models::{Envelope, Supply, SubscribeData, WireMessage, MESSAGE_SUBSCRIBE, MESSAGE_SUPPLY};
use crate::bus::{BusSubscriber, SupplyHandler};
use async_trait::async_trait;
use futures::StreamExt;
use futures_util::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;

const LOG_TARGET: &str = "pulse_rx::bus::websocket";

/// A connected bus socket.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings for [`BusClient`].
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub server_url: String,
    pub node_id: String,
    pub channel_type: u32,
    /// Free-form arguments announced with the subscription.
    pub arguments: String,
    pub keepalive_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl BusConfig {
    pub fn new(server_url: &str, node_id: &str, channel_type: u32) -> Self {
        BusConfig {
            server_url: server_url.to_string(),
            node_id: node_id.to_string(),
            channel_type,
            arguments: String::new(),
            keepalive_interval: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Why a listen pass ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum ListenExit {
    Shutdown,
    Closed,
}

/// Subscribes to one channel on the bus server and hands every delivered
/// supply to a [`SupplyHandler`], reconnecting with backoff when the link drops.
pub struct BusClient {
    config: BusConfig,
}

impl BusClient {
    pub fn new(config: BusConfig) -> Self {
        BusClient { config }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Connects and sends the subscription message.
    #[instrument(skip(self), fields(server = %self.config.server_url))]
    pub async fn connect(&self) -> Result<WsStream, BusError> {
        let url = websocket_url(&self.config.server_url)?;
        debug!(target: LOG_TARGET, "Connecting to bus at {}", url);

        let (mut ws_stream, _) = connect_async(url).await?;
        info!(target: LOG_TARGET, "Bus WebSocket connected");

        let subscribe = WireMessage {
            message_type: MESSAGE_SUBSCRIBE.to_string(),
            data: Some(serde_json::to_value(SubscribeData {
                node_id: self.config.node_id.clone(),
                channel_type: self.config.channel_type,
                arguments: self.config.arguments.clone(),
            })?),
        };
        ws_stream.send(Message::Text(serde_json::to_string(&subscribe)?)).await?;
        debug!(target: LOG_TARGET, channel = self.config.channel_type, "Subscribe message sent");
        Ok(ws_stream)
    }

    async fn listen(
        &self,
        ws: &mut WsStream,
        handler: &dyn SupplyHandler,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<ListenExit, BusError> {
        let mut ping_interval = tokio::time::interval(self.config.keepalive_interval);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    debug!(target: LOG_TARGET, "Shutdown received, leaving listen loop.");
                    return Ok(ListenExit::Shutdown);
                }

                maybe_message = ws.next() => {
                    match maybe_message {
                        Some(Ok(Message::Text(text))) => dispatch_text(&text, handler),
                        Some(Ok(Message::Ping(data))) => {
                            trace!(target: LOG_TARGET, "Received Ping, sending Pong");
                            ws.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(target: LOG_TARGET, "Bus closed the connection: {:?}", frame);
                            return Ok(ListenExit::Closed);
                        }
                        Some(Ok(other)) => {
                            trace!(target: LOG_TARGET, "Ignoring non-text frame: {:?}", other);
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(ListenExit::Closed),
                    }
                }

                _ = ping_interval.tick() => {
                    trace!(target: LOG_TARGET, "Sending keep-alive ping");
                    ws.send(Message::Ping(Vec::new())).await?;
                }
            }
        }
    }

    /// Sleeps with exponential backoff until a reconnect succeeds or shutdown
    /// is requested. Returns `None` on shutdown.
    async fn reconnect(&self, shutdown_rx: &mut broadcast::Receiver<()>) -> Option<WsStream> {
        let mut backoff = self.config.initial_backoff;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => return None,
                _ = tokio::time::sleep(backoff) => {}
            }
            match self.connect().await {
                Ok(ws) => return Some(ws),
                Err(e) => {
                    warn!(target: LOG_TARGET, "Reconnect failed: {}. Retrying in {:?}", e, backoff);
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
            }
        }
    }
}

#[async_trait]
impl BusSubscriber for BusClient {
    async fn run(
        &mut self,
        handler: Arc<dyn SupplyHandler>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), BusError> {
        let mut ws = self.connect().await?;

        loop {
            match self.listen(&mut ws, handler.as_ref(), &mut shutdown_rx).await {
                Ok(ListenExit::Shutdown) => {
                    if let Err(e) = ws.close(None).await {
                        debug!(target: LOG_TARGET, "Error closing bus connection (ignored): {}", e);
                    }
                    info!(target: LOG_TARGET, "Bus subscription stopped.");
                    return Ok(());
                }
                Ok(ListenExit::Closed) => {
                    warn!(target: LOG_TARGET, "Bus connection ended, reconnecting.");
                }
                Err(e) => {
                    error!(target: LOG_TARGET, "Bus read error: {}. Reconnecting.", e);
                }
            }

            match self.reconnect(&mut shutdown_rx).await {
                Some(new_ws) => ws = new_ws,
                None => return Ok(()),
            }
        }
    }
}

/// Parses one text frame and delivers it when it is a supply.
/// Anything unparseable is dropped; nothing is reported back to the bus.
pub fn dispatch_text(text: &str, handler: &dyn SupplyHandler) {
    let message = match serde_json::from_str::<WireMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(target: LOG_TARGET, "Failed to parse bus message: {}", e);
            return;
        }
    };

    if message.message_type != MESSAGE_SUPPLY {
        debug!(target: LOG_TARGET, "Ignoring bus message type {}", message.message_type);
        return;
    }

    let envelope = match message.data.map(serde_json::from_value::<Supply>) {
        Some(Ok(supply)) => Envelope::from(supply),
        Some(Err(e)) => {
            trace!(target: LOG_TARGET, "Supply with unreadable content treated as empty: {}", e);
            Envelope { supply_name: String::new(), payload: None }
        }
        None => Envelope { supply_name: String::new(), payload: None },
    };
    handler.on_message(&envelope);
}

/// Turns a bus server address (`host:port`, `http(s)://` or `ws(s)://`) into a
/// WebSocket URL.
pub fn websocket_url(server: &str) -> Result<Url, BusError> {
    let with_scheme = if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if server.contains("://") {
        server.to_string()
    } else {
        format!("ws://{}", server)
    };

    let url = Url::parse(&with_scheme)?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(BusError::InvalidUrl(format!("unsupported scheme '{}'", other))),
    }
}
