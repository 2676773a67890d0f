//! Binary wire codec
//!
//! Encodes and decodes TICK, HEARTBEAT, BATCH and MAPPING frames, resolving
//! symbol names through the shared registry.
//!
//! Failure policy:
//! - encoding a tick for an unregistered symbol is caller misuse and fails
//! - an unregistered symbol inside a batch is written as id 0
//! - an unknown id on decode resolves to "UNKNOWN"
//! - malformed or truncated frames decode to `None`, never panic

use crate::core::{RegistryError, SharedRegistry, SymbolId, TickEvent};
use crate::protocol::layout::LayoutError;
use crate::protocol::messages::{
    BatchCount, BatchItem, FrameHeader, MappingPrefix, MessageType, Quote, Record, TickBody,
    BATCH_COUNT_SIZE, BATCH_ITEM_SIZE, HEADER_SIZE, MAPPING_PREFIX_SIZE, MAX_NAME_LEN,
    PROTOCOL_VERSION, TICK_FRAME_SIZE,
};
use bytes::{BufMut, Bytes, BytesMut};

/// Errors raised synchronously to encode callers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Symbol not registered: {0}")]
    UnregisteredSymbol(String),
    #[error("Symbol name is {len} bytes, limit is {}", MAX_NAME_LEN)]
    NameTooLong { len: usize },
    #[error("Batch of {count} ticks exceeds {} items", u16::MAX)]
    BatchTooLarge { count: usize },
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),
}

/// Reasons a frame was discarded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Frame of {0} bytes is shorter than the header")]
    ShortFrame(usize),
    #[error("Unknown message type {0}")]
    UnknownType(u8),
    #[error("Malformed body: {0}")]
    Body(#[from] LayoutError),
}

/// Decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Tick(TickEvent),
    Heartbeat { ts: u32 },
    /// Every item carries the batch header's timestamp
    Batch { ts: u32, ticks: Vec<TickEvent> },
    /// The registry has already been updated when this is returned
    Mapping { id: SymbolId, symbol: String, ts: u32 },
}

impl WireMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            WireMessage::Tick(_) => MessageType::Tick,
            WireMessage::Heartbeat { .. } => MessageType::Heartbeat,
            WireMessage::Batch { .. } => MessageType::Batch,
            WireMessage::Mapping { .. } => MessageType::Mapping,
        }
    }
}

/// Current unix time in seconds, saturated into the u32 wire field
pub fn unix_now() -> u32 {
    let secs = time::OffsetDateTime::now_utc().unix_timestamp();
    secs.clamp(0, u32::MAX as i64) as u32
}

/// Stateless codec over a shared registry
#[derive(Clone)]
pub struct WireCodec {
    registry: SharedRegistry,
    version: u8,
}

impl WireCodec {
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            version: PROTOCOL_VERSION,
        }
    }

    /// Write `version` into outgoing headers; decoding accepts any version
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    #[inline(always)]
    pub fn version(&self) -> u8 {
        self.version
    }

    #[inline]
    fn header(&self, kind: MessageType, symbol_id: SymbolId, timestamp: u32) -> FrameHeader {
        FrameHeader {
            version: self.version,
            ..FrameHeader::new(kind, symbol_id, timestamp)
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Encode a 24-byte TICK frame. Never registers `symbol`.
    pub fn encode_tick(
        &self,
        symbol: &str,
        price: f32,
        volume: f32,
        bid: f32,
        ask: f32,
        timestamp: Option<u32>,
    ) -> Result<Bytes, ProtocolError> {
        let id = self
            .registry
            .read()
            .get_id(symbol)
            .ok_or_else(|| ProtocolError::UnregisteredSymbol(symbol.to_string()))?;

        let mut buf = BytesMut::with_capacity(TICK_FRAME_SIZE);
        self.header(MessageType::Tick, id, timestamp.unwrap_or_else(unix_now)).encode(&mut buf)?;
        TickBody {
            quote: Quote { price, volume, bid, ask },
        }
        .encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Encode a header-only HEARTBEAT frame
    pub fn encode_heartbeat(&self, timestamp: Option<u32>) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        self.header(MessageType::Heartbeat, SymbolId::NONE, timestamp.unwrap_or_else(unix_now))
            .encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Encode a BATCH frame of exactly `8 + 2 + 18 * ticks.len()` bytes
    ///
    /// The header timestamp is the newest tick timestamp (now, if empty).
    /// Unregistered symbols are written as id 0 instead of failing the batch.
    pub fn encode_batch(&self, ticks: &[TickEvent]) -> Result<Bytes, ProtocolError> {
        let count = u16::try_from(ticks.len())
            .map_err(|_| ProtocolError::BatchTooLarge { count: ticks.len() })?;
        let ts = ticks.iter().map(|t| t.ts).max().unwrap_or_else(unix_now);

        let size = HEADER_SIZE + BATCH_COUNT_SIZE + ticks.len() * BATCH_ITEM_SIZE;
        let mut buf = BytesMut::with_capacity(size);

        self.header(MessageType::Batch, SymbolId::NONE, ts).encode(&mut buf)?;
        BatchCount { count }.encode(&mut buf)?;

        let registry = self.registry.read();
        for tick in ticks {
            let symbol_id = registry.id_or_none(&tick.symbol);
            if symbol_id.is_none() {
                tracing::debug!(target: "codec", symbol = %tick.symbol, "Unregistered symbol in batch, writing id 0");
            }
            BatchItem {
                symbol_id,
                quote: Quote {
                    price: tick.price,
                    volume: tick.volume,
                    bid: tick.bid,
                    ask: tick.ask,
                },
            }
            .encode(&mut buf)?;
        }
        debug_assert_eq!(buf.len(), size);
        Ok(buf.freeze())
    }

    /// Encode a MAPPING frame, registering `symbol` first if needed
    pub fn encode_mapping(&self, symbol: &str) -> Result<Bytes, ProtocolError> {
        let name = symbol.as_bytes();
        let name_len = u8::try_from(name.len()).map_err(|_| ProtocolError::NameTooLong { len: name.len() })?;

        let id = self.registry.write().register(symbol)?;

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + MAPPING_PREFIX_SIZE + name.len());
        self.header(MessageType::Mapping, id, unix_now()).encode(&mut buf)?;
        MappingPrefix { symbol_id: id, name_len }.encode(&mut buf)?;
        buf.put_slice(name);
        Ok(buf.freeze())
    }

    /// Decode one frame; `None` for anything truncated or malformed
    pub fn decode(&self, frame: &[u8]) -> Option<WireMessage> {
        match self.try_decode(frame) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!(target: "codec", len = frame.len(), "Discarding frame: {}", e);
                None
            }
        }
    }

    /// Decode one frame, reporting why it was rejected
    pub fn try_decode(&self, frame: &[u8]) -> Result<WireMessage, DecodeError> {
        if frame.len() < HEADER_SIZE {
            return Err(DecodeError::ShortFrame(frame.len()));
        }

        let mut body = frame;
        let header = FrameHeader::decode(&mut body)?;
        let kind = header.message_type().ok_or(DecodeError::UnknownType(header.kind))?;

        match kind {
            MessageType::Tick => {
                let TickBody { quote } = TickBody::decode(&mut body)?;
                let symbol = self.registry.read().resolve(header.symbol_id).to_string();
                Ok(WireMessage::Tick(to_event(symbol, header.timestamp, quote)))
            }
            MessageType::Heartbeat => Ok(WireMessage::Heartbeat { ts: header.timestamp }),
            MessageType::Batch => {
                let BatchCount { count } = BatchCount::decode(&mut body)?;
                let needed = count as usize * BATCH_ITEM_SIZE;
                if body.len() < needed {
                    return Err(DecodeError::Body(LayoutError::Truncated {
                        layout: "batch",
                        needed,
                        available: body.len(),
                    }));
                }

                let registry = self.registry.read();
                let mut ticks = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let item = BatchItem::decode(&mut body)?;
                    let symbol = registry.resolve(item.symbol_id).to_string();
                    ticks.push(to_event(symbol, header.timestamp, item.quote));
                }
                Ok(WireMessage::Batch { ts: header.timestamp, ticks })
            }
            MessageType::Mapping => {
                let prefix = MappingPrefix::decode(&mut body)?;
                let len = prefix.name_len as usize;
                if body.len() < len {
                    return Err(DecodeError::Body(LayoutError::Truncated {
                        layout: "mapping_name",
                        needed: len,
                        available: body.len(),
                    }));
                }
                let symbol = String::from_utf8_lossy(&body[..len]).into_owned();

                self.registry.write().apply_mapping(prefix.symbol_id, &symbol);
                tracing::debug!(target: "codec", id = %prefix.symbol_id, symbol = %symbol, "Applied symbol mapping");

                Ok(WireMessage::Mapping {
                    id: prefix.symbol_id,
                    symbol,
                    ts: header.timestamp,
                })
            }
        }
    }
}

#[inline]
fn to_event(symbol: String, ts: u32, quote: Quote) -> TickEvent {
    TickEvent {
        symbol,
        ts,
        price: quote.price,
        volume: quote.volume,
        bid: quote.bid,
        ask: quote.ask,
    }
}
