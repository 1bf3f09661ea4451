//! Streaming transport connection
//!
//! Owns the single WebSocket to the market data stream: connect, disconnect,
//! automatic reconnection with jittered exponential backoff, and raw message
//! framing. Inbound frames and lifecycle changes are published as a typed
//! event stream; outbound control frames go through the handle.

use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use papertrade_core::ClientMessage;

/// Default WebSocket URL for the market data stream
const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws/market";

/// Reconnect delay base
const RECONNECT_DELAY_BASE: Duration = Duration::from_secs(1);

/// Reconnect delay ceiling
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Client heartbeat interval
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Configuration for the stream connection
#[derive(Clone)]
pub struct StreamConfig {
    /// WebSocket endpoint, without the token query parameter
    pub ws_url: String,
    /// Bearer token passed as the connection credential
    pub token: String,
    pub auto_reconnect: bool,
}

impl StreamConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            ws_url: std::env::var("PAPERTRADE_WS_URL")
                .unwrap_or_else(|_| DEFAULT_WS_URL.to_string()),
            token: token.into(),
            auto_reconnect: true,
        }
    }

    pub fn with_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }
}

impl std::fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConfig")
            .field("ws_url", &self.ws_url)
            .field("token", &"[REDACTED]")
            .field("auto_reconnect", &self.auto_reconnect)
            .finish()
    }
}

/// Events produced by the transport connection
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A connection (or reconnection) opened; the server-side subscription
    /// set is empty again
    Opened,
    /// The connection closed
    Closed { reason: String },
    /// A connect attempt or the live connection failed
    Failed { error: String },
    /// A raw inbound text frame
    Message(String),
}

/// Handle to a live stream connection
///
/// Constructed by the composition root and passed by reference to consumers;
/// dropping every receiver does not stop the connection, `disconnect` does.
pub struct StreamHandle {
    command_tx: mpsc::Sender<ClientMessage>,
    shutdown_tx: watch::Sender<bool>,
    event_tx: broadcast::Sender<StreamEvent>,
}

impl StreamHandle {
    /// Queue a control frame for sending
    ///
    /// Transport-level failures are never surfaced here; they degrade to a
    /// stale connection indicator via the event stream.
    pub async fn send(&self, message: ClientMessage) {
        if let Err(e) = self.command_tx.send(message).await {
            warn!("[Stream] Dropping outbound message, connection task ended: {}", e);
        }
    }

    /// Stop the connection and suppress further reconnect attempts
    ///
    /// Idempotent; safe to call multiple times.
    pub fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Get another receiver for the event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    /// Watch for an explicit disconnect
    ///
    /// The received value flips to `true` once `disconnect` has been called.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish()
    }
}

/// The streaming transport connection
pub struct StreamConnection;

impl StreamConnection {
    /// Spawn the connection loop and return its handle and event stream
    pub fn connect(config: StreamConfig) -> (StreamHandle, broadcast::Receiver<StreamEvent>) {
        let (event_tx, event_rx) = broadcast::channel(1024);
        let (command_tx, command_rx) = mpsc::channel::<ClientMessage>(100);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let loop_event_tx = event_tx.clone();
        tokio::spawn(async move {
            Self::connection_loop(config, loop_event_tx, command_rx, shutdown_rx).await;
        });

        (
            StreamHandle {
                command_tx,
                shutdown_tx,
                event_tx,
            },
            event_rx,
        )
    }

    /// Main connection loop with reconnection logic
    async fn connection_loop(
        config: StreamConfig,
        event_tx: broadcast::Sender<StreamEvent>,
        mut command_rx: mpsc::Receiver<ClientMessage>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut reconnect_attempts = 0u32;

        'outer: loop {
            if *shutdown_rx.borrow() {
                break;
            }

            info!("[Stream] Connecting to {}", config.ws_url);
            let url = format!("{}?token={}", config.ws_url, config.token);

            match connect_async(url.as_str()).await {
                Ok((ws_stream, _)) => {
                    info!("[Stream] Connected");
                    reconnect_attempts = 0;

                    let _ = event_tx.send(StreamEvent::Opened);

                    let (mut write, mut read) = ws_stream.split();
                    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
                    // The first tick fires immediately; skip it so the first
                    // ping goes out one interval after connect
                    heartbeat.tick().await;

                    loop {
                        tokio::select! {
                            // Handle incoming frames
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        let _ = event_tx.send(StreamEvent::Message(text.to_string()));
                                    }
                                    Some(Ok(Message::Ping(data))) => {
                                        if let Err(e) = write.send(Message::Pong(data)).await {
                                            warn!("[Stream] Failed to send pong: {}", e);
                                            let _ = event_tx.send(StreamEvent::Closed {
                                                reason: "pong write failed".to_string(),
                                            });
                                            break;
                                        }
                                    }
                                    Some(Ok(Message::Close(frame))) => {
                                        info!("[Stream] Connection closed by server");
                                        let reason = frame
                                            .map(|f| f.reason.to_string())
                                            .unwrap_or_else(|| "closed by server".to_string());
                                        let _ = event_tx.send(StreamEvent::Closed { reason });
                                        break;
                                    }
                                    Some(Err(e)) => {
                                        error!("[Stream] Error: {}", e);
                                        let _ = event_tx.send(StreamEvent::Failed {
                                            error: e.to_string(),
                                        });
                                        break;
                                    }
                                    None => {
                                        info!("[Stream] Stream ended");
                                        let _ = event_tx.send(StreamEvent::Closed {
                                            reason: "stream ended".to_string(),
                                        });
                                        break;
                                    }
                                    _ => {}
                                }
                            }

                            // Handle outgoing control frames
                            cmd = command_rx.recv() => {
                                match cmd {
                                    Some(cmd) => {
                                        if let Ok(json) = serde_json::to_string(&cmd) {
                                            if let Err(e) = write.send(Message::Text(json.into())).await {
                                                warn!("[Stream] Failed to send command: {}", e);
                                                let _ = event_tx.send(StreamEvent::Failed {
                                                    error: e.to_string(),
                                                });
                                                break;
                                            }
                                        }
                                    }
                                    None => {
                                        // The handle is gone; nobody can send or
                                        // disconnect anymore, so stop for good
                                        info!("[Stream] Handle dropped, closing connection");
                                        let _ = write.send(Message::Close(None)).await;
                                        let _ = event_tx.send(StreamEvent::Closed {
                                            reason: "handle dropped".to_string(),
                                        });
                                        break 'outer;
                                    }
                                }
                            }

                            // Client-side heartbeat
                            _ = heartbeat.tick() => {
                                let ping = ClientMessage::Ping {
                                    timestamp: Utc::now().timestamp_millis(),
                                };
                                if let Ok(json) = serde_json::to_string(&ping) {
                                    if let Err(e) = write.send(Message::Text(json.into())).await {
                                        warn!("[Stream] Failed to send heartbeat: {}", e);
                                        let _ = event_tx.send(StreamEvent::Failed {
                                            error: e.to_string(),
                                        });
                                        break;
                                    }
                                }
                            }

                            // Explicit disconnect
                            _ = shutdown_rx.changed() => {
                                if *shutdown_rx.borrow() {
                                    info!("[Stream] Disconnect requested");
                                    let _ = write.send(Message::Close(None)).await;
                                    let _ = event_tx.send(StreamEvent::Closed {
                                        reason: "disconnected".to_string(),
                                    });
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("[Stream] Connection failed: {}", e);
                    let _ = event_tx.send(StreamEvent::Failed {
                        error: e.to_string(),
                    });
                }
            }

            // Reconnection logic: retry until explicitly disconnected
            if !config.auto_reconnect || *shutdown_rx.borrow() {
                break;
            }

            reconnect_attempts += 1;
            let delay = reconnect_delay(reconnect_attempts);
            info!(
                "[Stream] Reconnecting in {:?} (attempt {})",
                delay, reconnect_attempts
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("[Stream] Reconnect cancelled");
                        break;
                    }
                }
            }
        }

        info!("[Stream] Connection loop ended");
    }
}

/// Jittered exponential backoff, capped
///
/// Jitter keeps a fleet of clients from reconnecting in lockstep after a
/// server restart.
fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(5);
    let base = RECONNECT_DELAY_BASE * 2u32.pow(exponent);
    let capped = base.min(MAX_RECONNECT_DELAY);
    capped.mul_f64(rand::rng().random_range(0.8..1.2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay_grows_and_caps() {
        let mut previous_floor = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = reconnect_delay(attempt);
            // Never below 80% of the base, never above 120% of the ceiling
            assert!(delay >= RECONNECT_DELAY_BASE.mul_f64(0.8));
            assert!(delay <= MAX_RECONNECT_DELAY.mul_f64(1.2));
            if attempt <= 3 {
                // Early attempts grow roughly exponentially despite jitter
                assert!(delay > previous_floor);
                previous_floor = RECONNECT_DELAY_BASE * 2u32.pow(attempt - 1) / 2;
            }
        }
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = StreamConfig::new("secret-token").with_url("ws://example/ws/market");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let config = StreamConfig::new("t").with_url("ws://127.0.0.1:1/ws/market");
        let (handle, _events) = StreamConnection::connect(config);

        handle.disconnect();
        handle.disconnect();
        // A send after disconnect is swallowed, never an error
        handle
            .send(ClientMessage::Ping { timestamp: 0 })
            .await;
    }
}
