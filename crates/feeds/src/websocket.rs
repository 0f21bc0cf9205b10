//! Push client for the gasz subscription stream.

use crate::{ConnectionEvent, FeedConfig, FeedError, FeedMessage};
use crate::{SubscriptionRequest, SubscriptionResponse};
use futures_util::{SinkExt, StreamExt};
use gasbot_core::{GasPrice, LatestGasPrice};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client feeding the shared snapshot.
///
/// Every pushed snapshot is stored into [`LatestGasPrice`] and then forwarded
/// as [`FeedMessage::Snapshot`] so the receiver can run a notification pass.
pub struct WsClient {
    config: FeedConfig,
    latest: Arc<LatestGasPrice>,
    tx: mpsc::Sender<FeedMessage>,
    cancel: CancellationToken,
}

impl WsClient {
    /// Create a new WebSocket client.
    pub fn new(
        config: FeedConfig,
        latest: Arc<LatestGasPrice>,
        tx: mpsc::Sender<FeedMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            latest,
            tx,
            cancel,
        }
    }

    /// Connect and stream until cancelled.
    ///
    /// Transient failures are retried with exponential backoff, up to
    /// `max_reconnect_attempts` consecutive failures. The counter resets each
    /// time the server accepts a subscription. Returns `Ok(())` on
    /// cancellation; any other return means the feed is gone for good and
    /// the caller should shut down.
    pub async fn run(self) -> Result<(), FeedError> {
        let mut reconnect_attempts = 0u32;
        let mut has_connected_once = false;

        loop {
            let result = match self.connect().await {
                Ok(ws) => {
                    reconnect_attempts = 0;
                    let event = if has_connected_once {
                        ConnectionEvent::Reconnected
                    } else {
                        ConnectionEvent::Connected
                    };
                    has_connected_once = true;
                    self.emit(event);
                    self.stream(ws).await
                }
                Err(e) => Err(e),
            };

            let e = match result {
                Ok(()) | Err(FeedError::Cancelled) => {
                    info!("Gas price feed stopped");
                    return Ok(());
                }
                Err(e) => e,
            };

            self.emit(ConnectionEvent::Disconnected(e.to_string()));

            if !e.is_transient() || reconnect_attempts >= self.config.max_reconnect_attempts {
                error!(error = %e, attempts = reconnect_attempts, "Gas price feed failed");
                return Err(e);
            }

            reconnect_attempts += 1;
            let delay = self.config.reconnect_delay(reconnect_attempts);
            warn!(
                "Gas price feed error: {}. Reconnecting in {:.1}s (attempt #{})",
                e,
                delay.as_secs_f64(),
                reconnect_attempts
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.tx.try_send(event.into()) {
            debug!("Dropped connection event: {}", e);
        }
    }

    /// Dial and complete the subscription handshake, both within the
    /// configured connect timeout.
    async fn connect(&self) -> Result<WsStream, FeedError> {
        let timeout = self.config.connect_timeout();
        debug!("Connecting to {}", self.config.subscribe_url);

        let handshake = async {
            let (mut ws, response) = connect_async(self.config.subscribe_url.as_str()).await?;
            debug!("Connected (status: {:?})", response.status());
            self.subscribe(&mut ws).await?;
            Ok::<_, FeedError>(ws)
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(FeedError::Cancelled),
            result = tokio::time::timeout(timeout, handshake) => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(FeedError::Timeout(format!(
                    "connect and subscribe exceeded {:?}",
                    timeout
                ))),
            },
        }
    }

    async fn subscribe(&self, ws: &mut WsStream) -> Result<(), FeedError> {
        let request = serde_json::to_string(&SubscriptionRequest::all())?;
        ws.send(Message::Text(request)).await?;

        let text = read_text(ws).await?;
        let confirmation: SubscriptionResponse = serde_json::from_str(&text)?;
        if !confirmation.is_accepted() {
            return Err(FeedError::SubscriptionDenied {
                code: confirmation.code,
                message: confirmation.message,
            });
        }

        info!(message = %confirmation.message, "Subscribed to gas price feed");
        Ok(())
    }

    /// Consume pushed snapshots until cancellation or failure.
    async fn stream(&self, ws: WsStream) -> Result<(), FeedError> {
        let (mut write, mut read) = ws.split();

        let ping_interval = self.config.ping_interval();
        let mut ping_timer = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);

        // Any received frame, heartbeats included, pushes the deadline out.
        let stale_timeout = self.config.stale_timeout();
        let mut deadline = Instant::now() + stale_timeout;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("Failed to send close frame: {}", e);
                    }
                    return Ok(());
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!("No messages received for {:?}", stale_timeout);
                    return Err(FeedError::Timeout(format!(
                        "no messages received for {:?}",
                        stale_timeout
                    )));
                }
                _ = ping_timer.tick() => {
                    write.send(Message::Ping(Vec::new())).await?;
                }
                msg = read.next() => {
                    deadline = Instant::now() + stale_timeout;

                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let price = parse_snapshot(&text)?;
                            debug!(%price, "Received gas price");
                            self.latest.store(price);
                            if self.tx.send(FeedMessage::Snapshot(price)).await.is_err() {
                                debug!("Feed receiver dropped");
                                return Err(FeedError::Cancelled);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("Received PONG");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!("Received close frame: {:?}", frame);
                            return Err(FeedError::Disconnected("closed by server".to_string()));
                        }
                        Some(Ok(other)) => {
                            warn!("Unexpected message type: {:?}", other);
                        }
                        Some(Err(e)) => {
                            return Err(FeedError::ConnectionFailed(e.to_string()));
                        }
                        None => {
                            return Err(FeedError::Disconnected("stream ended".to_string()));
                        }
                    }
                }
            }
        }
    }
}

/// Next text frame, answering pings while waiting.
async fn read_text(ws: &mut WsStream) -> Result<String, FeedError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Ping(data))) => ws.send(Message::Pong(data)).await?,
            Some(Ok(Message::Close(_))) | None => {
                return Err(FeedError::Disconnected(
                    "closed during subscription".to_string(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

fn parse_snapshot(text: &str) -> Result<GasPrice, FeedError> {
    let price: GasPrice = serde_json::from_str(text)?;
    if !price.is_valid() {
        return Err(FeedError::ParseError(format!(
            "gas price out of range: {}",
            price
        )));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    const ACCEPTED: &str = r#"{"code":1,"message":"Subscribed"}"#;
    const DENIED: &str = r#"{"code":0,"message":"Bad subscription"}"#;
    const SNAPSHOT_A: &str = r#"{"fastest":120.0,"fast":100.0,"average":80.0,"safeLow":50.0}"#;
    const SNAPSHOT_B: &str = r#"{"fastest":200.0,"fast":150.0,"average":90.0,"safeLow":60.0}"#;

    /// Fake gasz server accepting `connections` sessions in sequence. Each
    /// session answers the subscription with `response`, pushes `pushes`,
    /// then either closes or holds the connection open.
    async fn fake_gasz(
        connections: usize,
        response: &'static str,
        pushes: Vec<&'static str>,
        hold_open: bool,
    ) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for _ in 0..connections {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();

                let request = loop {
                    match ws.next().await {
                        Some(Ok(Message::Text(text))) => break text,
                        Some(Ok(_)) => continue,
                        _ => return,
                    }
                };
                let request: SubscriptionRequest = serde_json::from_str(&request).unwrap();
                if request != SubscriptionRequest::all() {
                    return;
                }

                ws.send(Message::Text(response.to_string())).await.unwrap();
                for push in &pushes {
                    ws.send(Message::Text(push.to_string())).await.unwrap();
                }

                if hold_open {
                    while let Some(Ok(_)) = ws.next().await {}
                } else {
                    let _ = ws.close(None).await;
                }
            }
        });

        format!("ws://{}", addr)
    }

    fn test_config(url: String, max_reconnect_attempts: u32) -> FeedConfig {
        FeedConfig {
            subscribe_url: url,
            reconnect_delay_ms: 10,
            max_reconnect_attempts,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_streams_snapshots_into_latest() {
        let url = fake_gasz(1, ACCEPTED, vec![SNAPSHOT_A, SNAPSHOT_B], false).await;
        let latest = Arc::new(LatestGasPrice::new());
        let (tx, mut rx) = mpsc::channel(16);
        let client = WsClient::new(test_config(url, 0), latest.clone(), tx, CancellationToken::new());

        assert!(client.run().await.is_err());

        assert!(matches!(
            rx.recv().await,
            Some(FeedMessage::Event(ConnectionEvent::Connected))
        ));
        match rx.recv().await {
            Some(FeedMessage::Snapshot(price)) => {
                assert_eq!(price, GasPrice::new(120.0, 100.0, 80.0, 50.0))
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
        assert!(matches!(rx.recv().await, Some(FeedMessage::Snapshot(_))));
        assert!(matches!(
            rx.recv().await,
            Some(FeedMessage::Event(ConnectionEvent::Disconnected(_)))
        ));

        assert_eq!(*latest.load().unwrap(), GasPrice::new(200.0, 150.0, 90.0, 60.0));
    }

    #[tokio::test]
    async fn test_denied_subscription_is_fatal() {
        let url = fake_gasz(1, DENIED, vec![], false).await;
        let latest = Arc::new(LatestGasPrice::new());
        let (tx, _rx) = mpsc::channel(16);
        let client = WsClient::new(test_config(url, 5), latest.clone(), tx, CancellationToken::new());

        match client.run().await {
            Err(FeedError::SubscriptionDenied { code, message }) => {
                assert_eq!(code, 0);
                assert_eq!(message, "Bad subscription");
            }
            other => panic!("expected denial, got {:?}", other),
        }
        assert!(latest.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_snapshot_ends_connection() {
        let url = fake_gasz(1, ACCEPTED, vec![r#"{"fastest":"soon"}"#], true).await;
        let (tx, _rx) = mpsc::channel(16);
        let client = WsClient::new(
            test_config(url, 5),
            Arc::new(LatestGasPrice::new()),
            tx,
            CancellationToken::new(),
        );

        assert!(matches!(client.run().await, Err(FeedError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_reconnects_after_server_close() {
        let url = fake_gasz(2, ACCEPTED, vec![SNAPSHOT_A], false).await;
        let (tx, mut rx) = mpsc::channel(16);
        let client = WsClient::new(
            test_config(url, 1),
            Arc::new(LatestGasPrice::new()),
            tx,
            CancellationToken::new(),
        );

        let _ = client.run().await;

        let mut events = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let FeedMessage::Event(event) = msg {
                events.push(event);
            }
        }
        assert_eq!(events.first(), Some(&ConnectionEvent::Connected));
        assert!(events.contains(&ConnectionEvent::Reconnected));
    }

    #[tokio::test]
    async fn test_cancellation_stops_cleanly() {
        let url = fake_gasz(1, ACCEPTED, vec![SNAPSHOT_A], true).await;
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let client = WsClient::new(
            test_config(url, 5),
            Arc::new(LatestGasPrice::new()),
            tx,
            cancel.clone(),
        );
        let handle = tokio::spawn(client.run());

        // Wait until the first snapshot went through, then cancel.
        loop {
            match rx.recv().await {
                Some(FeedMessage::Snapshot(_)) => break,
                Some(_) => continue,
                None => panic!("feed ended early"),
            }
        }
        cancel.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_snapshot() {
        assert!(parse_snapshot(SNAPSHOT_A).is_ok());
        assert!(parse_snapshot("not json").is_err());
        assert!(parse_snapshot(r#"{"fastest":-1.0,"fast":1.0,"average":1.0,"safeLow":1.0}"#).is_err());
    }
}
