//! WebSocket transport to the feed server
//!
//! - connection: link abstraction and the tokio-tungstenite connector
//! - envelope: `{type, payload}` text frames and dispatched events
//! - bus: typed publish/subscribe
//! - client: reconnecting state machine and its handle

pub mod bus;
pub mod client;
pub mod connection;
pub mod envelope;

pub use bus::{EventBus, Handler, Subscription};
pub use client::{TransportClient, TransportConfig, TransportHandle, DEFAULT_RECONNECT_DELAY};
pub use connection::{ConnectionError, ConnectionState, Connector, Frame, Link, LinkEvent, WsConnector};
pub use envelope::{events, Envelope, FeedEvent};
