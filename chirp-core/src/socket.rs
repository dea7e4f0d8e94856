//! Reconnecting WebSocket transport to the endpoint
//!
//! One socket per bot. Outbound frames are queued on an unbounded
//! channel and written by the I/O loop; inbound text frames are forwarded
//! in receive order to the frame router. Lifecycle transitions are
//! broadcast as [`SocketEvent`]s so the correlator can fail in-flight
//! calls on close.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport errors
#[derive(Error, Debug)]
pub enum SocketError {
    /// Every connection attempt failed
    #[error("unable to reach {url} after {attempts} attempt(s): {last_error}")]
    Unreachable {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// The socket is not currently open
    #[error("socket is not connected")]
    NotConnected,

    /// connect() was called twice
    #[error("socket already started")]
    AlreadyStarted,

    /// The outbound queue rejected a frame
    #[error("failed to queue outbound frame: {0}")]
    Send(String),
}

/// Reconnection policy
#[derive(Debug, Clone)]
pub struct Reconnection {
    pub enable: bool,
    /// Attempts per (re)connection round
    pub attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl Default for Reconnection {
    fn default() -> Self {
        Self {
            enable: true,
            attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub access_token: Option<String>,
    pub reconnection: Reconnection,
}

impl SocketConfig {
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url = format!("{}://{}:{}", scheme, self.host, self.port);
        if let Some(token) = &self.access_token {
            url.push_str("?access_token=");
            url.push_str(token);
        }
        url
    }
}

/// Socket lifecycle notifications
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// About to dial (1-based attempt within the current round)
    Connecting { attempt: u32 },
    /// Connection established
    Open,
    /// Connection closed (server close frame, error or EOF)
    Close { code: Option<u16>, reason: String },
    /// Terminal failure, the I/O loop has given up
    Error { message: String },
}

/// Seam between the correlator and the transport
pub trait FrameSink: Send + Sync {
    /// Queue one text frame for writing
    fn send_frame(&self, text: String) -> Result<(), SocketError>;
}

/// Cloneable outbound handle, usable independently of the socket's lifetime
#[derive(Clone)]
pub struct SocketSender {
    tx: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
}

impl FrameSink for SocketSender {
    fn send_frame(&self, text: String) -> Result<(), SocketError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SocketError::NotConnected);
        }
        self.tx
            .send(text)
            .map_err(|e| SocketError::Send(e.to_string()))
    }
}

/// The transport socket
pub struct Socket {
    config: SocketConfig,
    out_tx: mpsc::UnboundedSender<String>,
    out_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<SocketEvent>,
    cancel: CancellationToken,
}

impl Socket {
    pub fn new(config: SocketConfig) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            out_tx,
            out_rx: std::sync::Mutex::new(Some(out_rx)),
            connected: Arc::new(AtomicBool::new(false)),
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Outbound handle for the correlator
    pub fn sender(&self) -> SocketSender {
        SocketSender {
            tx: self.out_tx.clone(),
            connected: self.connected.clone(),
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Dial the endpoint and start the I/O loop
    ///
    /// Inbound text frames are forwarded to `inbound`. Returns once the
    /// first connection is established; reconnection afterwards is
    /// handled inside the loop per the configured policy.
    pub async fn connect(
        &self,
        inbound: mpsc::UnboundedSender<String>,
    ) -> Result<(), SocketError> {
        let out_rx = self
            .out_rx
            .lock()
            .unwrap()
            .take()
            .ok_or(SocketError::AlreadyStarted)?;

        let ws = dial(&self.config, &self.events, &self.cancel).await?;
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(SocketEvent::Open);
        tracing::info!(url = %self.config.url(), "socket connected");

        tokio::spawn(io_loop(
            ws,
            self.config.clone(),
            out_rx,
            inbound,
            self.connected.clone(),
            self.events.clone(),
            self.cancel.clone(),
        ));
        Ok(())
    }

    /// Stop the I/O loop; idempotent
    pub fn disconnect(&self) {
        self.cancel.cancel();
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// One round of connection attempts per the reconnection policy
async fn dial(
    config: &SocketConfig,
    events: &broadcast::Sender<SocketEvent>,
    cancel: &CancellationToken,
) -> Result<WsStream, SocketError> {
    let url = config.url();
    let attempts = config.reconnection.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            break;
        }
        let _ = events.send(SocketEvent::Connecting { attempt });
        tracing::debug!(%url, attempt, "dialing endpoint");

        match connect_async(url.as_str()).await {
            Ok((ws, _response)) => return Ok(ws),
            Err(e) => {
                tracing::warn!(%url, attempt, error = %e, "connection attempt failed");
                last_error = e.to_string();
            }
        }

        if attempt < attempts {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(config.reconnection.delay) => {}
            }
        }
    }

    Err(SocketError::Unreachable {
        url,
        attempts,
        last_error,
    })
}

async fn io_loop(
    mut ws: WsStream,
    config: SocketConfig,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<SocketEvent>,
    cancel: CancellationToken,
) {
    loop {
        let (mut sink, mut stream) = ws.split();

        let close: (Option<u16>, String) = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    connected.store(false, Ordering::SeqCst);
                    tracing::info!("socket closed by local shutdown");
                    return;
                }
                outbound = out_rx.recv() => match outbound {
                    Some(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            break (None, e.to_string());
                        }
                    }
                    // All senders dropped, nothing left to write for
                    None => {
                        connected.store(false, Ordering::SeqCst);
                        return;
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = inbound.send(text.to_string());
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_default();
                        break (code, reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break (None, e.to_string()),
                    None => break (None, "stream ended".to_string()),
                },
            }
        };

        connected.store(false, Ordering::SeqCst);
        tracing::warn!(code = ?close.0, reason = %close.1, "socket closed");
        let _ = events.send(SocketEvent::Close {
            code: close.0,
            reason: close.1,
        });

        if !config.reconnection.enable {
            let _ = events.send(SocketEvent::Error {
                message: "connection closed and reconnection is disabled".to_string(),
            });
            return;
        }

        // Reconnects are scheduled, never immediate
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(config.reconnection.delay) => {}
        }

        match dial(&config, &events, &cancel).await {
            Ok(new_ws) => {
                ws = new_ws;
                connected.store(true, Ordering::SeqCst);
                let _ = events.send(SocketEvent::Open);
                tracing::info!("socket reconnected");
            }
            Err(e) => {
                if !cancel.is_cancelled() {
                    tracing::error!(error = %e, "reconnection gave up");
                    let _ = events.send(SocketEvent::Error {
                        message: e.to_string(),
                    });
                }
                return;
            }
        }
    }
}
