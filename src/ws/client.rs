//! Reconnecting transport client
//!
//! Owns one logical connection to the feed server and walks the state
//! machine `Disconnected -> Connecting -> Open -> Disconnected`. A close
//! arms a single reconnect deadline after a fixed delay; re-arming replaces
//! the deadline, so closes can never stack timers.
//!
//! Outbound envelopes emitted while not open wait in an unbounded FIFO and
//! are flushed in order as soon as the link opens, before anything emitted
//! afterwards. Inbound frames are parsed (text) or decoded (binary) and
//! published on the event bus; malformed frames are logged and counted,
//! never surfaced to subscribers and never fatal to the link.
//!
//! All state lives in one driver task ([`TransportClient::run`]); other
//! tasks talk to it through a [`TransportHandle`].

use crate::infrastructure::config::{ConfigError, FeedConfig};
use crate::infrastructure::metrics::{names, MetricsSink};
use crate::protocol::{WireCodec, WireMessage};
use crate::ws::bus::{EventBus, Handler, Subscription};
use crate::ws::connection::{ConnectionError, ConnectionState, Connector, Frame, Link, LinkEvent};
use crate::ws::envelope::{Envelope, FeedEvent};
use bytes::Bytes;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::Level;

/// Default fixed reconnect delay
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Transport settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Full endpoint, auth token included
    pub url: String,
    pub reconnect_delay: Duration,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn from_feed(feed: &FeedConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(feed.connection_url()?).with_reconnect_delay(feed.reconnect_delay()))
    }
}

/// Request from a [`TransportHandle`]
#[derive(Debug)]
enum Command {
    Emit(Envelope),
    SendBinary(Bytes),
    Connect,
    Close,
    Shutdown,
}

/// What woke the driver
enum Wake {
    Link(LinkEvent),
    Command(Option<Command>),
    Reconnect,
}

/// Transport state machine over a [`Connector`]
pub struct TransportClient<C: Connector> {
    config: TransportConfig,
    connector: C,
    state: ConnectionState,
    link: Option<Link>,
    outbound: VecDeque<Envelope>,
    bus: EventBus<FeedEvent>,
    codec: WireCodec,
    metrics: Arc<dyn MetricsSink>,
    /// Single pending reconnect; replaced, never stacked
    reconnect_at: Option<Instant>,
    commands: mpsc::UnboundedReceiver<Command>,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl<C: Connector> TransportClient<C> {
    pub fn new(
        config: TransportConfig,
        connector: C,
        codec: WireCodec,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let (command_tx, commands) = mpsc::unbounded_channel();
        Self {
            config,
            connector,
            state: ConnectionState::Disconnected,
            link: None,
            outbound: VecDeque::new(),
            bus: EventBus::new(),
            codec,
            metrics,
            reconnect_at: None,
            commands,
            command_tx,
        }
    }

    #[inline(always)]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[inline(always)]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Envelopes waiting for the link to open
    pub fn queued(&self) -> usize {
        self.outbound.len()
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn codec(&self) -> &WireCodec {
        &self.codec
    }

    pub fn bus(&self) -> &EventBus<FeedEvent> {
        &self.bus
    }

    pub fn handle(&self) -> TransportHandle {
        TransportHandle {
            commands: self.command_tx.clone(),
            bus: self.bus.clone(),
        }
    }

    pub fn on(&self, event: &str, handler: Handler<FeedEvent>) -> Subscription {
        self.bus.on(event, handler)
    }

    pub fn subscribe<F>(&self, event: &str, f: F) -> Subscription
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(event, f)
    }

    pub fn off(&self, event: &str, handler: &Handler<FeedEvent>) -> bool {
        self.bus.off(event, handler)
    }

    /// Open a link unless one is already connecting or open
    ///
    /// Cancels any pending reconnect.
    pub fn connect(&mut self) {
        if self.link.is_some() {
            return;
        }
        self.reconnect_at = None;
        crate::log_ws!(Level::INFO, url = %self.config.url, "Connecting");
        self.link = Some(self.connector.open(&self.config.url));
        self.state = ConnectionState::Connecting;
    }

    /// Send `{type, payload}` now if open, otherwise queue it
    pub fn emit(&mut self, kind: &str, payload: Value) {
        let mut envelope = Envelope::new(kind, payload);
        envelope.normalize_outbound();
        self.emit_envelope(envelope);
    }

    fn emit_envelope(&mut self, envelope: Envelope) {
        if self.is_open() {
            if let Err(envelope) = self.send_envelope(envelope) {
                self.enqueue(envelope);
            }
            return;
        }
        self.enqueue(envelope);
        // A pending reconnect owns the next dial
        if self.link.is_none() && self.reconnect_at.is_none() {
            self.connect();
        }
    }

    fn enqueue(&mut self, envelope: Envelope) {
        self.outbound.push_back(envelope);
        self.metrics.increment(names::WS_OUTBOUND_QUEUED);
    }

    /// Write one envelope to the open link; hands it back if the link is gone
    fn send_envelope(&mut self, envelope: Envelope) -> Result<(), Envelope> {
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                // unserializable payloads are dropped, not retried
                tracing::warn!(target: "ws", kind = %envelope.kind, "Dropping envelope: {}", e);
                return Ok(());
            }
        };
        match self.link.as_ref().map(|link| link.send(Frame::Text(text))) {
            Some(Ok(())) => Ok(()),
            _ => Err(envelope),
        }
    }

    /// Send a raw binary frame; fails unless open
    pub fn send_binary(&mut self, frame: Bytes) -> Result<(), ConnectionError> {
        match (&self.link, self.state) {
            (Some(link), ConnectionState::Open) => link.send(Frame::Binary(frame)),
            _ => Err(ConnectionError::NotConnected),
        }
    }

    /// Tear the link down without scheduling a reconnect
    pub fn close(&mut self) {
        self.reconnect_at = None;
        if self.link.take().is_some() {
            tracing::info!(target: "ws", "Connection closed by client");
            self.state = ConnectionState::Disconnected;
            self.dispatch(FeedEvent::Disconnected {
                reason: Some("closed by client".to_string()),
            });
        }
    }

    /// Apply one link event
    pub fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened => self.on_open(),
            LinkEvent::Text(text) => {
                self.metrics.increment(names::WS_MESSAGES);
                self.on_text(&text);
            }
            LinkEvent::Binary(data) => {
                self.metrics.increment(names::WS_MESSAGES);
                self.on_binary(&data);
            }
            LinkEvent::Error(e) => {
                tracing::warn!(target: "ws", "Connection error: {}", e);
                self.metrics.increment(names::WS_ERRORS);
            }
            LinkEvent::Closed(reason) => self.on_closed(reason),
        }
    }

    fn on_open(&mut self) {
        self.state = ConnectionState::Open;
        crate::log_ws!(Level::INFO, url = %self.config.url, queued = self.outbound.len(), "Connected");

        while let Some(envelope) = self.outbound.pop_front() {
            if let Err(envelope) = self.send_envelope(envelope) {
                self.outbound.push_front(envelope);
                break;
            }
        }
        self.dispatch(FeedEvent::Connected);
    }

    fn on_text(&mut self, text: &str) {
        let mut envelope = match Envelope::from_text(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(target: "ws", len = text.len(), "Unparsable text frame: {}", e);
                self.metrics.increment(names::WS_PARSE_ERRORS);
                return;
            }
        };
        envelope.normalize_inbound();
        self.dispatch(FeedEvent::from_envelope(envelope));
    }

    fn on_binary(&mut self, data: &[u8]) {
        let message = match self.codec.try_decode(data) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(target: "ws", len = data.len(), "Undecodable binary frame: {}", e);
                self.metrics.increment(names::WS_DECODE_ERRORS);
                return;
            }
        };
        match message {
            WireMessage::Tick(tick) => self.dispatch(FeedEvent::Tick(tick)),
            WireMessage::Batch { ticks, .. } => {
                for tick in ticks {
                    self.dispatch(FeedEvent::Tick(tick));
                }
            }
            WireMessage::Mapping { id, symbol, .. } => {
                self.dispatch(FeedEvent::Mapping { id, symbol });
            }
            WireMessage::Heartbeat { ts } => {
                self.metrics.increment(names::WS_HEARTBEATS);
                self.dispatch(FeedEvent::Heartbeat { ts });
            }
        }
    }

    fn on_closed(&mut self, reason: Option<String>) {
        self.link = None;
        self.state = ConnectionState::Disconnected;
        tracing::warn!(
            target: "ws",
            reason = reason.as_deref().unwrap_or("none"),
            delay_ms = self.config.reconnect_delay.as_millis() as u64,
            "Connection closed, reconnect scheduled"
        );
        self.dispatch(FeedEvent::Disconnected { reason });
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
    }

    #[inline]
    fn dispatch(&self, event: FeedEvent) {
        self.bus.publish(event.tag(), &event);
    }

    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Emit(envelope) => self.emit_envelope(envelope),
            Command::SendBinary(frame) => {
                if let Err(e) = self.send_binary(frame) {
                    tracing::debug!(target: "ws", "Binary frame dropped: {}", e);
                }
            }
            Command::Connect => self.connect(),
            Command::Close => self.close(),
            Command::Shutdown => return false,
        }
        true
    }

    /// Wait for and apply the next link event, command or reconnect
    ///
    /// Returns false once the client has been shut down.
    pub async fn step(&mut self) -> bool {
        let link = &mut self.link;
        let commands = &mut self.commands;
        let deadline = self.reconnect_at;

        let wake = tokio::select! {
            biased;
            event = async {
                match link.as_mut() {
                    Some(link) => link.next_event().await,
                    None => pending().await,
                }
            } => Wake::Link(event),
            command = commands.recv() => Wake::Command(command),
            _ = async {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => pending().await,
                }
            } => Wake::Reconnect,
        };

        match wake {
            Wake::Link(event) => self.handle_event(event),
            Wake::Command(Some(command)) => return self.apply(command),
            Wake::Command(None) => return false,
            Wake::Reconnect => {
                self.metrics.increment(names::WS_RECONNECTS);
                tracing::info!(target: "ws", "Reconnecting");
                self.reconnect_at = None;
                self.connect();
            }
        }
        true
    }

    /// Drive the client until [`TransportHandle::shutdown`]
    pub async fn run(mut self) {
        tracing::info!(target: "ws", url = %self.config.url, "Transport started");
        while self.step().await {}
        self.close();
        tracing::info!(target: "ws", "Transport stopped");
    }
}

/// Cloneable, `Send` access to a running [`TransportClient`]
#[derive(Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<Command>,
    bus: EventBus<FeedEvent>,
}

impl TransportHandle {
    fn send(&self, command: Command) -> Result<(), ConnectionError> {
        self.commands
            .send(command)
            .map_err(|_| ConnectionError::ClientStopped)
    }

    pub fn emit(&self, kind: &str, payload: Value) -> Result<(), ConnectionError> {
        let mut envelope = Envelope::new(kind, payload);
        envelope.normalize_outbound();
        self.send(Command::Emit(envelope))
    }

    pub fn send_binary(&self, frame: Bytes) -> Result<(), ConnectionError> {
        self.send(Command::SendBinary(frame))
    }

    pub fn connect(&self) -> Result<(), ConnectionError> {
        self.send(Command::Connect)
    }

    pub fn close(&self) -> Result<(), ConnectionError> {
        self.send(Command::Close)
    }

    pub fn shutdown(&self) -> Result<(), ConnectionError> {
        self.send(Command::Shutdown)
    }

    pub fn on(&self, event: &str, handler: Handler<FeedEvent>) -> Subscription {
        self.bus.on(event, handler)
    }

    pub fn subscribe<F>(&self, event: &str, f: F) -> Subscription
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(event, f)
    }

    pub fn off(&self, event: &str, handler: &Handler<FeedEvent>) -> bool {
        self.bus.off(event, handler)
    }
}
