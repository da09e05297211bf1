use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use ironmaker_core::{MarketEvent, MarketId};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

const PING_INTERVAL: Duration = Duration::from_secs(50);
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Derives the WebSocket endpoint from the REST endpoint.
#[must_use]
pub fn endpoint_to_ws(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    let base = base
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    format!("{base}/ws/")
}

/// Market data stream for the Blocky exchange. Subscribes to per-market
/// transaction and orderbook channels and surfaces each push as a
/// `MarketEvent`. Reconnects with exponential backoff and re-subscribes
/// after every reconnect.
pub struct BlockyWebSocket {
    ws_url: String,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    subscriptions: Vec<String>,
    msg_id: u64,
    last_ping: Instant,
    reconnect_attempts: u32,
}

impl BlockyWebSocket {
    #[must_use]
    pub fn new(ws_url: String) -> Self {
        Self {
            ws_url,
            stream: None,
            subscriptions: Vec::new(),
            msg_id: 0,
            last_ping: Instant::now(),
            reconnect_attempts: 0,
        }
    }

    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn connect(&mut self) -> Result<()> {
        tracing::debug!("connecting WebSocket to {}", self.ws_url);
        let (stream, response) = connect_async(&self.ws_url).await.map_err(|e| {
            anyhow::anyhow!("failed to connect to WebSocket at {}: {e}", self.ws_url)
        })?;
        self.stream = Some(stream);
        self.reconnect_attempts = 0;
        tracing::info!(
            "WebSocket connected to {} (HTTP status: {})",
            self.ws_url,
            response.status()
        );
        Ok(())
    }

    /// Subscribes to both event channels of a market.
    ///
    /// # Errors
    /// Returns an error if the socket is not connected or the send fails.
    pub async fn subscribe_market(&mut self, market: &MarketId) -> Result<()> {
        for suffix in ["transactions", "orderbook"] {
            let channel = format!("{market}:{suffix}");
            self.send_subscribe(&channel).await?;
            if !self.subscriptions.contains(&channel) {
                self.subscriptions.push(channel);
            }
        }
        Ok(())
    }

    async fn send_subscribe(&mut self, channel: &str) -> Result<()> {
        self.msg_id += 1;
        let msg = serde_json::json!({
            "action": "subscribe",
            "message_id": self.msg_id,
            "channel": channel,
        });
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("WebSocket not connected"))?;
        stream.send(Message::Text(msg.to_string())).await?;
        Ok(())
    }

    /// Receives the next market event, transparently handling pings,
    /// unknown channels, and reconnection. Returns `None` when the server
    /// closed the stream and reconnection was abandoned.
    ///
    /// # Errors
    /// Returns an error if the socket is not connected or receive fails
    /// after reconnect attempts.
    pub async fn next_event(&mut self) -> Result<Option<MarketEvent>> {
        loop {
            if self.last_ping.elapsed() > PING_INTERVAL {
                self.send_ping().await?;
                self.last_ping = Instant::now();
            }

            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("WebSocket not connected"))?;

            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = Self::parse_event(&text) {
                        return Ok(Some(event));
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    tracing::warn!("WebSocket closed, reconnecting");
                    self.reconnect().await?;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("WebSocket error: {e}, reconnecting");
                    self.reconnect().await?;
                }
            }
        }
    }

    fn parse_event(text: &str) -> Option<MarketEvent> {
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        let channel = value.get("channel")?.as_str()?;
        let (market, kind) = channel.split_once(':')?;
        let market = MarketId::new(market);
        match kind {
            "transactions" => Some(MarketEvent::Trade { market }),
            "orderbook" => Some(MarketEvent::OrderbookChange { market }),
            _ => None,
        }
    }

    async fn send_ping(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("WebSocket not connected"))?;
        stream
            .send(Message::Text(serde_json::json!({"method": "ping"}).to_string()))
            .await?;
        tracing::trace!("sent ping");
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.stream = None;
        loop {
            self.reconnect_attempts += 1;
            let exp = 1u32 << (self.reconnect_attempts - 1).min(6);
            let delay = (INITIAL_RECONNECT_DELAY * exp).min(MAX_RECONNECT_DELAY);
            tracing::warn!(
                attempt = self.reconnect_attempts,
                delay_secs = delay.as_secs(),
                "WebSocket reconnecting"
            );
            tokio::time::sleep(delay).await;

            match connect_async(&self.ws_url).await {
                Ok((stream, _)) => {
                    self.stream = Some(stream);
                    let channels = self.subscriptions.clone();
                    for channel in &channels {
                        self.send_subscribe(channel).await?;
                    }
                    tracing::info!(
                        attempts = self.reconnect_attempts,
                        "WebSocket reconnected and re-subscribed"
                    );
                    self.reconnect_attempts = 0;
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!("reconnection failed: {e}");
                }
            }
        }
    }
}
