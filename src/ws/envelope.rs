//! Control-channel envelopes and dispatched feed events
//!
//! Text frames carry `{"type": string, "payload": any}`. Room identifiers are
//! case-folded to lowercase on the way out (subscribe/unsubscribe) and on the
//! way in (ticket messages) so client and server agree on one key.

use crate::core::{SymbolId, TickEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope and event tags
pub mod events {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const TICK: &str = "tick";
    pub const TICKET_MESSAGE: &str = "ticket_message";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const MAPPING: &str = "mapping";
}

/// Payload keys that hold a room identifier
const ROOM_KEYS: [&str; 2] = ["room", "roomId"];

/// `{type, payload}` text frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Fold room ids on subscribe/unsubscribe
    pub fn normalize_outbound(&mut self) {
        if self.kind == events::SUBSCRIBE || self.kind == events::UNSUBSCRIBE {
            fold_room(&mut self.payload);
        }
    }

    /// Fold room ids on inbound ticket messages
    pub fn normalize_inbound(&mut self) {
        if self.kind == events::TICKET_MESSAGE {
            fold_room(&mut self.payload);
        }
    }
}

/// Lowercase a bare-string payload or the room keys of an object payload
fn fold_room(payload: &mut Value) {
    match payload {
        Value::String(room) => *room = room.to_lowercase(),
        Value::Object(map) => {
            for key in ROOM_KEYS {
                if let Some(Value::String(room)) = map.get_mut(key) {
                    *room = room.to_lowercase();
                }
            }
        }
        _ => {}
    }
}

/// Event delivered to transport subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Link opened
    Connected,
    /// Link closed or torn down
    Disconnected { reason: Option<String> },
    Tick(TickEvent),
    Heartbeat { ts: u32 },
    /// Server assigned `id` to `symbol`
    Mapping { id: SymbolId, symbol: String },
    /// Any other control-channel envelope
    Message { kind: String, payload: Value },
}

impl FeedEvent {
    /// Tag subscribers register under
    pub fn tag(&self) -> &str {
        match self {
            FeedEvent::Connected => events::CONNECT,
            FeedEvent::Disconnected { .. } => events::DISCONNECT,
            FeedEvent::Tick(_) => events::TICK,
            FeedEvent::Heartbeat { .. } => events::HEARTBEAT,
            FeedEvent::Mapping { .. } => events::MAPPING,
            FeedEvent::Message { kind, .. } => kind,
        }
    }

    /// Typed tick when the envelope carries one, generic message otherwise
    pub fn from_envelope(envelope: Envelope) -> Self {
        if envelope.kind == events::TICK {
            if let Ok(tick) = serde_json::from_value::<TickEvent>(envelope.payload.clone()) {
                return FeedEvent::Tick(tick);
            }
        }
        FeedEvent::Message {
            kind: envelope.kind,
            payload: envelope.payload,
        }
    }

    pub fn as_tick(&self) -> Option<&TickEvent> {
        match self {
            FeedEvent::Tick(tick) => Some(tick),
            _ => None,
        }
    }
}
