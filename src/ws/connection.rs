//! WebSocket link to the feed server
//!
//! A [`Link`] is one physical connection attempt. Opening it never blocks:
//! the connector spawns a task that dials, then reports progress as
//! [`LinkEvent`]s (opened, frames, errors, closed) over a channel, while
//! outbound frames flow the other way. Dropping the `Link` closes the socket.
//!
//! [`WsConnector`] is the tokio-tungstenite implementation:
//! - connect timeout
//! - TCP_NODELAY on plain TCP streams
//! - no logging per frame

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link; a reconnect may be pending
    Disconnected,
    /// Link created, handshake in progress
    Connecting,
    /// Connected and ready
    Open,
}

/// Errors that can occur with WebSocket connections
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Timeout")]
    Timeout,
    #[error("Not connected")]
    NotConnected,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Transport client stopped")]
    ClientStopped,
}

/// Outbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

/// Something that happened on a link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Opened,
    Text(String),
    Binary(Bytes),
    /// Non-fatal from the client's point of view; a `Closed` follows if the
    /// link is gone
    Error(String),
    Closed(Option<String>),
}

/// One connection attempt
pub struct Link {
    id: u64,
    outbound: mpsc::UnboundedSender<Frame>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Link {
    pub fn new(
        id: u64,
        outbound: mpsc::UnboundedSender<Frame>,
        events: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Self {
        Self { id, outbound, events }
    }

    #[inline(always)]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a frame for the socket writer
    pub fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        self.outbound
            .send(frame)
            .map_err(|_| ConnectionError::ConnectionClosed)
    }

    /// Next event; a finished link reads as `Closed`
    pub async fn next_event(&mut self) -> LinkEvent {
        self.events.recv().await.unwrap_or(LinkEvent::Closed(None))
    }
}

/// Creates links; the seam between the transport state machine and I/O
pub trait Connector: Send {
    /// Start connecting to `url`. Must not block.
    fn open(&mut self, url: &str) -> Link;
}

/// tokio-tungstenite connector
pub struct WsConnector {
    connect_timeout: Duration,
    next_id: u64,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            next_id: 0,
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Connector for WsConnector {
    fn open(&mut self, url: &str) -> Link {
        let id = self.next_id;
        self.next_id += 1;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive_socket(id, url.to_string(), self.connect_timeout, out_rx, ev_tx));

        Link::new(id, out_tx, ev_rx)
    }
}

/// Socket task: dial, then pump frames both ways until either side ends
async fn drive_socket(
    id: u64,
    url: String,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let mut ws = match timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            let err = ConnectionError::ConnectionFailed(e.to_string());
            let _ = events.send(LinkEvent::Error(err.to_string()));
            let _ = events.send(LinkEvent::Closed(Some(err.to_string())));
            return;
        }
        Err(_) => {
            let _ = events.send(LinkEvent::Error(ConnectionError::Timeout.to_string()));
            let _ = events.send(LinkEvent::Closed(Some(ConnectionError::Timeout.to_string())));
            return;
        }
    };

    if let MaybeTlsStream::Plain(tcp) = ws.get_ref() {
        if let Err(e) = optimize_tcp_stream(tcp) {
            tracing::debug!(target: "ws", link = id, "TCP tuning skipped: {}", e);
        }
    }

    if events.send(LinkEvent::Opened).is_err() {
        return;
    }

    let reason = loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    // Link dropped by the client
                    let _ = ws.close(None).await;
                    return;
                };
                let msg = match frame {
                    Frame::Text(text) => Message::text(text),
                    Frame::Binary(data) => Message::binary(data),
                };
                if let Err(e) = ws.send(msg).await {
                    let err = ConnectionError::SendFailed(e.to_string());
                    let _ = events.send(LinkEvent::Error(err.to_string()));
                    break Some(err.to_string());
                }
            }
            msg = ws.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => LinkEvent::Text(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(data))) => LinkEvent::Binary(data),
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.as_str().to_owned());
                    }
                    // Ping/Pong are answered by tungstenite
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let err = ConnectionError::ReceiveFailed(e.to_string());
                        let _ = events.send(LinkEvent::Error(err.to_string()));
                        break Some(err.to_string());
                    }
                    None => break None,
                };
                if events.send(event).is_err() {
                    let _ = ws.close(None).await;
                    return;
                }
            }
        }
    };

    let _ = events.send(LinkEvent::Closed(reason));
}

/// Disable Nagle's algorithm - send frames immediately
fn optimize_tcp_stream(stream: &TcpStream) -> Result<(), ConnectionError> {
    stream
        .set_nodelay(true)
        .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))
}
