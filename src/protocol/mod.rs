//! Binary wire protocol for price ticks
//!
//! - layout: declarative field layouts shared by encoder and decoder
//! - messages: header and body records, message kinds, frame sizes
//! - codec: registry-aware encode/decode of whole frames

pub mod codec;
pub mod layout;
pub mod messages;

pub use codec::{unix_now, DecodeError, ProtocolError, WireCodec, WireMessage};
pub use layout::{Encoding, Field, Layout, LayoutError};
pub use messages::{MessageType, PROTOCOL_VERSION, TICK_FRAME_SIZE};
