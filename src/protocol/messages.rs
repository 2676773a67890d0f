//! Wire records and message kinds
//!
//! Frame = 8-byte header + kind-specific body:
//! - TICK:      header, tick body (16 bytes) = 24 bytes
//! - HEARTBEAT: header only
//! - BATCH:     header, count:u16, count x batch item (18 bytes each)
//! - MAPPING:   header, symbolId:u16, nameLength:u8, utf8 name

use crate::core::SymbolId;
use crate::protocol::layout::{
    fields_size, Encoding, Field, FieldReader, FieldWriter, Layout, LayoutError,
};
use bytes::BufMut;

/// Protocol version written into every header
pub const PROTOCOL_VERSION: u8 = 1;

const HEADER_FIELDS: &[Field] = &[
    Field::new("version", Encoding::U8),
    Field::new("type", Encoding::U8),
    Field::new("symbolId", Encoding::U16),
    Field::new("timestamp", Encoding::U32),
];

const TICK_FIELDS: &[Field] = &[
    Field::new("price", Encoding::F32),
    Field::new("volume", Encoding::F32),
    Field::new("bid", Encoding::F32),
    Field::new("ask", Encoding::F32),
];

const BATCH_COUNT_FIELDS: &[Field] = &[Field::new("count", Encoding::U16)];

const BATCH_ITEM_FIELDS: &[Field] = &[
    Field::new("symbolId", Encoding::U16),
    Field::new("price", Encoding::F32),
    Field::new("volume", Encoding::F32),
    Field::new("bid", Encoding::F32),
    Field::new("ask", Encoding::F32),
];

const MAPPING_FIELDS: &[Field] = &[
    Field::new("symbolId", Encoding::U16),
    Field::new("nameLength", Encoding::U8),
];

pub const HEADER: Layout = Layout { name: "header", fields: HEADER_FIELDS };
pub const TICK_BODY: Layout = Layout { name: "tick", fields: TICK_FIELDS };
pub const BATCH_COUNT: Layout = Layout { name: "batch_count", fields: BATCH_COUNT_FIELDS };
pub const BATCH_ITEM: Layout = Layout { name: "batch_item", fields: BATCH_ITEM_FIELDS };
pub const MAPPING_PREFIX: Layout = Layout { name: "mapping", fields: MAPPING_FIELDS };

pub const HEADER_SIZE: usize = fields_size(HEADER_FIELDS);
pub const TICK_FRAME_SIZE: usize = HEADER_SIZE + fields_size(TICK_FIELDS);
pub const BATCH_COUNT_SIZE: usize = fields_size(BATCH_COUNT_FIELDS);
pub const BATCH_ITEM_SIZE: usize = fields_size(BATCH_ITEM_FIELDS);
pub const MAPPING_PREFIX_SIZE: usize = fields_size(MAPPING_FIELDS);

/// Longest symbol name a MAPPING frame can carry
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

const _: () = assert!(HEADER_SIZE == 8);
const _: () = assert!(TICK_FRAME_SIZE == 24);
const _: () = assert!(BATCH_ITEM_SIZE == 18);

/// Message kind carried in the header's type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Tick = 0,
    Heartbeat = 1,
    Batch = 2,
    Mapping = 3,
}

impl MessageType {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Tick),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Batch),
            3 => Some(Self::Mapping),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A fixed-size record described by a [`Layout`]
pub trait Record: Sized {
    const LAYOUT: &'static Layout;

    fn write_fields<B: BufMut>(&self, w: &mut FieldWriter<'_, B>) -> Result<(), LayoutError>;

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self, LayoutError>;

    /// Append this record to `buf`
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), LayoutError> {
        let mut w = Self::LAYOUT.writer(buf);
        self.write_fields(&mut w)?;
        w.finish()
    }

    /// Read one record off the front of `buf`, advancing it
    fn decode(buf: &mut &[u8]) -> Result<Self, LayoutError> {
        let mut r = Self::LAYOUT.reader(*buf)?;
        let record = Self::read_fields(&mut r)?;
        *buf = r.finish()?;
        Ok(record)
    }
}

/// Common 8-byte frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    /// Raw type byte; unknown values are rejected by the codec, not here
    pub kind: u8,
    pub symbol_id: SymbolId,
    /// Unix seconds
    pub timestamp: u32,
}

impl FrameHeader {
    pub fn new(kind: MessageType, symbol_id: SymbolId, timestamp: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind: kind.as_u8(),
            symbol_id,
            timestamp,
        }
    }

    #[inline]
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.kind)
    }
}

impl Record for FrameHeader {
    const LAYOUT: &'static Layout = &HEADER;

    fn write_fields<B: BufMut>(&self, w: &mut FieldWriter<'_, B>) -> Result<(), LayoutError> {
        w.put_u8(self.version)?;
        w.put_u8(self.kind)?;
        w.put_u16(self.symbol_id.as_raw())?;
        w.put_u32(self.timestamp)
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self, LayoutError> {
        Ok(Self {
            version: r.get_u8()?,
            kind: r.get_u8()?,
            symbol_id: SymbolId::from_raw(r.get_u16()?),
            timestamp: r.get_u32()?,
        })
    }
}

/// Price/volume/bid/ask quadruple shared by tick bodies and batch items
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quote {
    pub price: f32,
    pub volume: f32,
    pub bid: f32,
    pub ask: f32,
}

impl Quote {
    fn put<B: BufMut>(&self, w: &mut FieldWriter<'_, B>) -> Result<(), LayoutError> {
        w.put_f32(self.price)?;
        w.put_f32(self.volume)?;
        w.put_f32(self.bid)?;
        w.put_f32(self.ask)
    }

    fn get(r: &mut FieldReader<'_>) -> Result<Self, LayoutError> {
        Ok(Self {
            price: r.get_f32()?,
            volume: r.get_f32()?,
            bid: r.get_f32()?,
            ask: r.get_f32()?,
        })
    }
}

/// TICK body
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickBody {
    pub quote: Quote,
}

impl Record for TickBody {
    const LAYOUT: &'static Layout = &TICK_BODY;

    fn write_fields<B: BufMut>(&self, w: &mut FieldWriter<'_, B>) -> Result<(), LayoutError> {
        self.quote.put(w)
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self, LayoutError> {
        Ok(Self { quote: Quote::get(r)? })
    }
}

/// Item count prefixing a BATCH body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCount {
    pub count: u16,
}

impl Record for BatchCount {
    const LAYOUT: &'static Layout = &BATCH_COUNT;

    fn write_fields<B: BufMut>(&self, w: &mut FieldWriter<'_, B>) -> Result<(), LayoutError> {
        w.put_u16(self.count)
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self, LayoutError> {
        Ok(Self { count: r.get_u16()? })
    }
}

/// One 18-byte BATCH item
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchItem {
    pub symbol_id: SymbolId,
    pub quote: Quote,
}

impl Record for BatchItem {
    const LAYOUT: &'static Layout = &BATCH_ITEM;

    fn write_fields<B: BufMut>(&self, w: &mut FieldWriter<'_, B>) -> Result<(), LayoutError> {
        w.put_u16(self.symbol_id.as_raw())?;
        self.quote.put(w)
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self, LayoutError> {
        Ok(Self {
            symbol_id: SymbolId::from_raw(r.get_u16()?),
            quote: Quote::get(r)?,
        })
    }
}

/// Fixed part of a MAPPING body; the name bytes follow it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingPrefix {
    pub symbol_id: SymbolId,
    pub name_len: u8,
}

impl Record for MappingPrefix {
    const LAYOUT: &'static Layout = &MAPPING_PREFIX;

    fn write_fields<B: BufMut>(&self, w: &mut FieldWriter<'_, B>) -> Result<(), LayoutError> {
        w.put_u16(self.symbol_id.as_raw())?;
        w.put_u8(self.name_len)
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self, LayoutError> {
        Ok(Self {
            symbol_id: SymbolId::from_raw(r.get_u16()?),
            name_len: r.get_u8()?,
        })
    }
}
