//! Declarative field layouts for the binary wire format
//!
//! Every fixed-size record on the wire is described once as a [`Layout`]:
//! an ordered list of named fields with their encoding. Encoders write
//! through a [`FieldWriter`] and decoders read through a [`FieldReader`],
//! both of which walk the same layout, so the two directions cannot drift
//! apart. Offsets and sizes are derived from the layout, never hand-written.
//!
//! All multi-byte integers are big-endian, floats are IEEE-754 binary32.

use bytes::{Buf, BufMut};

/// Encoding of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    U8,
    U16,
    U32,
    F32,
}

impl Encoding {
    /// Width on the wire in bytes
    #[inline(always)]
    pub const fn width(self) -> usize {
        match self {
            Encoding::U8 => 1,
            Encoding::U16 => 2,
            Encoding::U32 | Encoding::F32 => 4,
        }
    }
}

/// Named field within a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub encoding: Encoding,
}

impl Field {
    pub const fn new(name: &'static str, encoding: Encoding) -> Self {
        Self { name, encoding }
    }

    #[inline(always)]
    pub const fn width(&self) -> usize {
        self.encoding.width()
    }
}

/// Ordered field list describing one fixed-size record
#[derive(Debug, PartialEq, Eq)]
pub struct Layout {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl Layout {
    /// Total record size in bytes
    pub const fn size(&self) -> usize {
        fields_size(self.fields)
    }

    /// Byte offset of `name` within the record
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        let mut offset = 0;
        for field in self.fields {
            if field.name == name {
                return Some(offset);
            }
            offset += field.width();
        }
        None
    }

    /// Start writing one record into `buf`
    pub fn writer<'a, B: BufMut>(&'static self, buf: &'a mut B) -> FieldWriter<'a, B> {
        FieldWriter {
            layout: self,
            buf,
            next: 0,
        }
    }

    /// Start reading one record from the front of `buf`
    ///
    /// Fails up front if `buf` cannot hold the whole record, so individual
    /// field reads never run off the end.
    pub fn reader<'a>(&'static self, buf: &'a [u8]) -> Result<FieldReader<'a>, LayoutError> {
        let needed = self.size();
        if buf.len() < needed {
            return Err(LayoutError::Truncated {
                layout: self.name,
                needed,
                available: buf.len(),
            });
        }
        Ok(FieldReader {
            layout: self,
            buf,
            next: 0,
        })
    }
}

/// Summed width of `fields`, usable in const context
pub const fn fields_size(fields: &[Field]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < fields.len() {
        total += fields[i].width();
        i += 1;
    }
    total
}

/// A field value tagged with its encoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    F32(f32),
}

impl Value {
    #[inline(always)]
    pub const fn encoding(&self) -> Encoding {
        match self {
            Value::U8(_) => Encoding::U8,
            Value::U16(_) => Encoding::U16,
            Value::U32(_) => Encoding::U32,
            Value::F32(_) => Encoding::F32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("{layout}.{field}: expected {expected:?}, got {found:?}")]
    FieldMismatch {
        layout: &'static str,
        field: &'static str,
        expected: Encoding,
        found: Encoding,
    },
    #[error("{layout}: more fields than the layout declares")]
    Overrun { layout: &'static str },
    #[error("{layout}: {written} of {expected} fields written")]
    Incomplete {
        layout: &'static str,
        written: usize,
        expected: usize,
    },
    #[error("{layout}: need {needed} bytes, {available} available")]
    Truncated {
        layout: &'static str,
        needed: usize,
        available: usize,
    },
}

/// Writes the fields of one record in layout order
pub struct FieldWriter<'a, B: BufMut> {
    layout: &'static Layout,
    buf: &'a mut B,
    next: usize,
}

impl<'a, B: BufMut> FieldWriter<'a, B> {
    fn expect(&mut self, found: Encoding) -> Result<(), LayoutError> {
        let field = self
            .layout
            .fields
            .get(self.next)
            .ok_or(LayoutError::Overrun { layout: self.layout.name })?;
        if field.encoding != found {
            return Err(LayoutError::FieldMismatch {
                layout: self.layout.name,
                field: field.name,
                expected: field.encoding,
                found,
            });
        }
        self.next += 1;
        Ok(())
    }

    pub fn put(&mut self, value: Value) -> Result<(), LayoutError> {
        self.expect(value.encoding())?;
        match value {
            Value::U8(v) => self.buf.put_u8(v),
            Value::U16(v) => self.buf.put_u16(v),
            Value::U32(v) => self.buf.put_u32(v),
            Value::F32(v) => self.buf.put_f32(v),
        }
        Ok(())
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) -> Result<(), LayoutError> {
        self.put(Value::U8(v))
    }

    #[inline]
    pub fn put_u16(&mut self, v: u16) -> Result<(), LayoutError> {
        self.put(Value::U16(v))
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) -> Result<(), LayoutError> {
        self.put(Value::U32(v))
    }

    #[inline]
    pub fn put_f32(&mut self, v: f32) -> Result<(), LayoutError> {
        self.put(Value::F32(v))
    }

    /// Check every declared field was written
    pub fn finish(self) -> Result<(), LayoutError> {
        if self.next != self.layout.fields.len() {
            return Err(LayoutError::Incomplete {
                layout: self.layout.name,
                written: self.next,
                expected: self.layout.fields.len(),
            });
        }
        Ok(())
    }
}

/// Reads the fields of one record in layout order
pub struct FieldReader<'a> {
    layout: &'static Layout,
    buf: &'a [u8],
    next: usize,
}

impl<'a> FieldReader<'a> {
    /// Read the next field, whatever its encoding
    pub fn get(&mut self) -> Result<Value, LayoutError> {
        let field = self
            .layout
            .fields
            .get(self.next)
            .ok_or(LayoutError::Overrun { layout: self.layout.name })?;
        self.next += 1;
        // Length was checked against the full layout in `Layout::reader`
        let value = match field.encoding {
            Encoding::U8 => Value::U8(self.buf.get_u8()),
            Encoding::U16 => Value::U16(self.buf.get_u16()),
            Encoding::U32 => Value::U32(self.buf.get_u32()),
            Encoding::F32 => Value::F32(self.buf.get_f32()),
        };
        Ok(value)
    }

    fn mismatch(&self, found: Encoding, expected: Encoding) -> LayoutError {
        let field = self.layout.fields[self.next - 1].name;
        LayoutError::FieldMismatch {
            layout: self.layout.name,
            field,
            expected,
            found,
        }
    }

    pub fn get_u8(&mut self) -> Result<u8, LayoutError> {
        match self.get()? {
            Value::U8(v) => Ok(v),
            other => Err(self.mismatch(Encoding::U8, other.encoding())),
        }
    }

    pub fn get_u16(&mut self) -> Result<u16, LayoutError> {
        match self.get()? {
            Value::U16(v) => Ok(v),
            other => Err(self.mismatch(Encoding::U16, other.encoding())),
        }
    }

    pub fn get_u32(&mut self) -> Result<u32, LayoutError> {
        match self.get()? {
            Value::U32(v) => Ok(v),
            other => Err(self.mismatch(Encoding::U32, other.encoding())),
        }
    }

    pub fn get_f32(&mut self) -> Result<f32, LayoutError> {
        match self.get()? {
            Value::F32(v) => Ok(v),
            other => Err(self.mismatch(Encoding::F32, other.encoding())),
        }
    }

    /// Bytes following the record; errors if fields were left unread
    pub fn finish(self) -> Result<&'a [u8], LayoutError> {
        if self.next != self.layout.fields.len() {
            return Err(LayoutError::Incomplete {
                layout: self.layout.name,
                written: self.next,
                expected: self.layout.fields.len(),
            });
        }
        Ok(self.buf)
    }
}
