//! WebSocket session channel to the pairing server.
//!
//! [`ChatChannel`] owns one connection per session. The socket is split and
//! handed to a background I/O task; the handle talks to it through two mpsc
//! channels (outbound text in, normalized [`SessionEvent`]s out), so sends
//! and event delivery are full-duplex while handler-side processing stays
//! strictly sequential.
//!
//! The credential travels as a `?token=` query parameter on the upgrade URL
//! (no headers are available on a browser-style WebSocket handshake).
//!
//! Teardown policy: a transport drop is terminal. There is no reconnect and
//! no buffering of unsent text; the session learns about the drop through a
//! final [`SessionEvent::Disconnected`] and winds down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::protocol::{OutboundFrame, ServerFrame};

/// A normalized event delivered by the channel, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A classified inbound frame.
    Frame(ServerFrame),
    /// The transport dropped (server close, read error, or write failure).
    Disconnected,
}

/// Errors reported by channel operations.
#[derive(Debug)]
pub enum ChannelError {
    /// `connect` was called without a credential.
    MissingToken,
    /// The server URL has no http(s) scheme.
    InvalidUrl(String),
    /// The WebSocket handshake failed.
    Connect(String),
    /// `send` was called while the transport is not open.
    NotConnected,
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::MissingToken => write!(f, "no credential supplied for the pairing channel"),
            ChannelError::InvalidUrl(url) => write!(f, "invalid server URL scheme: {url}"),
            ChannelError::Connect(msg) => write!(f, "WebSocket connect failed: {msg}"),
            ChannelError::NotConnected => write!(f, "channel not ready"),
        }
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Handle to one live pairing-server connection.
pub struct ChatChannel {
    out_tx: mpsc::Sender<String>,
    events: mpsc::Receiver<SessionEvent>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    closed: bool,
}

impl ChatChannel {
    /// Connect to the pairing endpoint, authenticating with `token`.
    ///
    /// Refuses an empty token before any network activity. A failed
    /// handshake is returned to the caller, never retried.
    pub async fn connect(base_url: &str, token: &str) -> Result<Self, ChannelError> {
        if token.is_empty() {
            return Err(ChannelError::MissingToken);
        }
        let ws_url = build_ws_url(base_url, token)?;

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        debug!("pairing channel connected");

        let connected = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());
        let (out_tx, out_rx) = mpsc::channel::<String>(256);
        let (event_tx, events) = mpsc::channel::<SessionEvent>(256);

        tokio::spawn(ws_io_loop(
            ws_stream,
            out_rx,
            event_tx,
            Arc::clone(&connected),
            Arc::clone(&shutdown),
        ));

        Ok(Self {
            out_tx,
            events,
            connected,
            shutdown,
            closed: false,
        })
    }

    /// Transmit one chat message. Exactly one outbound frame per call, no
    /// batching. Returns [`ChannelError::NotConnected`] when the transport
    /// is not open; the text is not buffered for later.
    pub async fn send(&self, text: &str) -> Result<(), ChannelError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChannelError::NotConnected);
        }
        self.out_tx
            .send(text.to_string())
            .await
            .map_err(|_| ChannelError::NotConnected)
    }

    /// Next normalized event, in arrival order. Returns `None` once the
    /// channel has been closed locally or the I/O task has finished.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if self.closed {
            return None;
        }
        self.events.recv().await
    }

    /// Whether the transport is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Tear the connection down. Idempotent; safe on an already-closed
    /// channel. After this returns, [`Self::next_event`] yields `None`,
    /// even for events that were already queued.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
        self.events.close();
    }

    /// Build a detached handle for state-machine tests: the returned ends
    /// stand in for the I/O task.
    #[cfg(test)]
    pub(crate) fn test_pair() -> (Self, mpsc::Receiver<String>, mpsc::Sender<SessionEvent>) {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (event_tx, events) = mpsc::channel(16);
        let channel = Self {
            out_tx,
            events,
            connected: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(Notify::new()),
            closed: false,
        };
        (channel, out_rx, event_tx)
    }
}

/// Map the HTTP(S) base URL to the ws(s) pairing endpoint with the
/// credential attached.
fn build_ws_url(base_url: &str, token: &str) -> Result<String, ChannelError> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if base.starts_with("https://") {
        base.replacen("https://", "wss://", 1)
    } else if base.starts_with("http://") {
        base.replacen("http://", "ws://", 1)
    } else {
        return Err(ChannelError::InvalidUrl(base.to_string()));
    };
    Ok(format!("{ws_base}/ws/socket-server/?token={token}"))
}

/// Background I/O loop: normalizes inbound frames, writes outbound frames,
/// and reports the first transport drop. Exits on local close, on the
/// handle being dropped, or on disconnect.
async fn ws_io_loop(
    ws_stream: WsStream,
    mut out_rx: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<SessionEvent>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    let (mut ws_sink, mut ws_reader) = ws_stream.split();

    loop {
        tokio::select! {
            () = shutdown.notified() => {
                // Local close. Best-effort Close frame; no Disconnected
                // event, the handle already refuses delivery.
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
            msg = ws_reader.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match ServerFrame::classify(&text) {
                            Some(frame) => {
                                if event_tx.send(SessionEvent::Frame(frame)).await.is_err() {
                                    break; // handle dropped
                                }
                            }
                            None => warn!("dropping unrecognized frame: {text}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        connected.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(SessionEvent::Disconnected).await;
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        connected.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(SessionEvent::Disconnected).await;
                        break;
                    }
                    Some(Ok(_)) => {} // Binary/Ping/Pong, ignore
                }
            }
            out = out_rx.recv() => {
                match out {
                    Some(text) => {
                        let payload =
                            serde_json::to_string(&OutboundFrame { message: &text })
                                .unwrap_or_default();
                        if ws_sink.send(Message::Text(payload)).await.is_err() {
                            connected.store(false, Ordering::SeqCst);
                            let _ = event_tx.send(SessionEvent::Disconnected).await;
                            break;
                        }
                    }
                    None => break, // handle dropped
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_maps_http_to_ws() {
        assert_eq!(
            build_ws_url("http://host:8000", "abc").unwrap(),
            "ws://host:8000/ws/socket-server/?token=abc"
        );
    }

    #[test]
    fn ws_url_maps_https_to_wss() {
        assert_eq!(
            build_ws_url("https://chat.example.com", "abc").unwrap(),
            "wss://chat.example.com/ws/socket-server/?token=abc"
        );
    }

    #[test]
    fn ws_url_strips_trailing_slash() {
        assert_eq!(
            build_ws_url("http://host:8000/", "abc").unwrap(),
            "ws://host:8000/ws/socket-server/?token=abc"
        );
    }

    #[test]
    fn ws_url_rejects_unknown_scheme() {
        assert!(matches!(
            build_ws_url("ftp://host", "abc"),
            Err(ChannelError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn connect_refuses_empty_token() {
        match ChatChannel::connect("http://localhost:8000", "").await {
            Err(ChannelError::MissingToken) => {}
            Err(other) => panic!("expected MissingToken, got {other:?}"),
            Ok(_) => panic!("expected MissingToken, got a channel"),
        }
    }

    #[tokio::test]
    async fn send_transmits_one_payload_per_call() {
        let (channel, mut out_rx, _event_tx) = ChatChannel::test_pair();
        channel.send("hi").await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap(), "hi");
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_stops_delivery() {
        let (mut channel, _out_rx, event_tx) = ChatChannel::test_pair();
        // Queued before close, must never surface after it.
        event_tx.send(SessionEvent::Disconnected).await.unwrap();
        channel.close();
        channel.close();
        assert!(channel.next_event().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_reports_not_connected() {
        let (mut channel, _out_rx, _event_tx) = ChatChannel::test_pair();
        channel.close();
        match channel.send("hello").await {
            Err(ChannelError::NotConnected) => {}
            other => panic!("expected NotConnected, got {other:?}"),
        }
    }
}
