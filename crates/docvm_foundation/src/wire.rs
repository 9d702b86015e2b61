//! Compact wire encoding of documents.
//!
//! A document is `i32 total_len`, a run of elements and a `0x00` terminator.
//! An element is `u8 type`, a NUL-terminated field name and a payload. Arrays
//! are documents whose field names are `"0"`, `"1"`, ... All integers are
//! little endian.
//!
//! [`WireDoc`] is a validated view into a shared buffer; nested documents are
//! returned as views over the same buffer without copying.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::value::Value;

const TYPE_DOUBLE: u8 = 0x01;
const TYPE_STRING: u8 = 0x02;
const TYPE_OBJECT: u8 = 0x03;
const TYPE_ARRAY: u8 = 0x04;
const TYPE_BOOL: u8 = 0x08;
const TYPE_DATE: u8 = 0x09;
const TYPE_NULL: u8 = 0x0A;
const TYPE_INT32: u8 = 0x10;
const TYPE_TIMESTAMP: u8 = 0x11;
const TYPE_INT64: u8 = 0x12;
const TYPE_DECIMAL: u8 = 0x13;
const TYPE_MAXKEY: u8 = 0x7F;
const TYPE_MINKEY: u8 = 0xFF;

const MAX_NESTING: usize = 200;

/// A validated document or array in the compact wire encoding.
#[derive(Clone)]
pub struct WireDoc {
    buf: Arc<[u8]>,
    start: usize,
    end: usize,
}

impl WireDoc {
    /// Validates `bytes` as a complete document.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the buffer is not a well-formed document.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let buf: Arc<[u8]> = bytes.into();
        let end = validate_document(&buf, 0, 0)
            .ok_or_else(|| Error::internal("malformed wire document"))?;
        if end != buf.len() {
            return Err(Error::internal("trailing bytes after wire document"));
        }
        Ok(Self { buf, start: 0, end })
    }

    /// Encodes an object value (heap or wire) as a document.
    ///
    /// # Errors
    ///
    /// Returns an error for non-object input or unencodable field values.
    pub fn from_object(value: &Value) -> Result<Self> {
        if let Value::BsonObject(doc) = value {
            return Ok(doc.clone());
        }
        if !matches!(value, Value::Object(_)) {
            return Err(Error::internal(format!("cannot encode {} as a document", value.tag())));
        }
        let mut builder = WireBuilder::new();
        for (name, field) in value.object_iter() {
            builder.append(&name, &field)?;
        }
        Ok(builder.finish())
    }

    /// Encodes an array value (any representation) as a wire array.
    ///
    /// # Errors
    ///
    /// Returns an error for non-array input or unencodable elements.
    pub fn from_array(value: &Value) -> Result<Self> {
        if let Value::BsonArray(doc) = value {
            return Ok(doc.clone());
        }
        if !value.is_array() {
            return Err(Error::internal(format!("cannot encode {} as an array", value.tag())));
        }
        let mut builder = WireBuilder::new();
        for (i, element) in value.array_iter().enumerate() {
            builder.append(&i.to_string(), &element)?;
        }
        Ok(builder.finish())
    }

    /// The encoded bytes of this document.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Iterates `(name, value)` pairs in encoded order.
    #[must_use]
    pub fn iter(&self) -> WireIter<'_> {
        WireIter {
            doc: self,
            pos: self.start + 4,
        }
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Looks up an array element by position.
    #[must_use]
    pub fn get_element(&self, index: usize) -> Option<Value> {
        self.iter().nth(index).map(|(_, v)| v)
    }

    /// Returns true if the document has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end - self.start <= 5
    }

    fn view(&self, start: usize) -> Option<Self> {
        let len = usize::try_from(read_i32(&self.buf, start)?).ok()?;
        Some(Self {
            buf: Arc::clone(&self.buf),
            start,
            end: start + len,
        })
    }
}

/// Iterator over the elements of a [`WireDoc`].
pub struct WireIter<'a> {
    doc: &'a WireDoc,
    pos: usize,
}

impl<'a> Iterator for WireIter<'a> {
    type Item = (&'a str, Value);

    fn next(&mut self) -> Option<Self::Item> {
        let buf: &'a [u8] = &self.doc.buf;
        let type_byte = *buf.get(self.pos)?;
        if type_byte == 0 || self.pos >= self.doc.end {
            return None;
        }
        let name_start = self.pos + 1;
        let name_end = name_start + buf[name_start..].iter().position(|b| *b == 0)?;
        let name = std::str::from_utf8(&buf[name_start..name_end]).ok()?;
        let payload = name_end + 1;
        let size = payload_size(buf, type_byte, payload)?;
        let value = match type_byte {
            TYPE_DOUBLE => Value::Double(f64::from_le_bytes(read_array(buf, payload)?)),
            TYPE_STRING => {
                let len = usize::try_from(read_i32(buf, payload)?).ok()?;
                let bytes = buf.get(payload + 4..payload + 4 + len - 1)?;
                Value::from(std::str::from_utf8(bytes).ok()?)
            }
            TYPE_OBJECT => Value::BsonObject(self.doc.view(payload)?),
            TYPE_ARRAY => Value::BsonArray(self.doc.view(payload)?),
            TYPE_BOOL => Value::Bool(*buf.get(payload)? != 0),
            TYPE_DATE => Value::Date(i64::from_le_bytes(read_array(buf, payload)?)),
            TYPE_NULL => Value::Null,
            TYPE_INT32 => Value::Int32(read_i32(buf, payload)?),
            TYPE_TIMESTAMP => Value::Timestamp(u64::from_le_bytes(read_array(buf, payload)?)),
            TYPE_INT64 => Value::Int64(i64::from_le_bytes(read_array(buf, payload)?)),
            TYPE_DECIMAL => Value::Decimal(Decimal::deserialize(read_array(buf, payload)?)),
            TYPE_MAXKEY => Value::MaxKey,
            TYPE_MINKEY => Value::MinKey,
            _ => return None,
        };
        self.pos = payload + size;
        Some((name, value))
    }
}

fn read_array<const N: usize>(buf: &[u8], pos: usize) -> Option<[u8; N]> {
    buf.get(pos..pos + N)?.try_into().ok()
}

fn read_i32(buf: &[u8], pos: usize) -> Option<i32> {
    read_array(buf, pos).map(i32::from_le_bytes)
}

fn payload_size(buf: &[u8], type_byte: u8, payload: usize) -> Option<usize> {
    match type_byte {
        TYPE_DOUBLE | TYPE_DATE | TYPE_TIMESTAMP | TYPE_INT64 => Some(8),
        TYPE_STRING => Some(4 + usize::try_from(read_i32(buf, payload)?).ok()?),
        TYPE_OBJECT | TYPE_ARRAY => usize::try_from(read_i32(buf, payload)?).ok(),
        TYPE_BOOL => Some(1),
        TYPE_NULL | TYPE_MAXKEY | TYPE_MINKEY => Some(0),
        TYPE_INT32 => Some(4),
        TYPE_DECIMAL => Some(16),
        _ => None,
    }
}

/// Validates the document starting at `start`, returning its end offset.
fn validate_document(buf: &[u8], start: usize, depth: usize) -> Option<usize> {
    if depth > MAX_NESTING {
        return None;
    }
    let len = usize::try_from(read_i32(buf, start)?).ok()?;
    if len < 5 {
        return None;
    }
    let end = start.checked_add(len)?;
    if end > buf.len() || buf[end - 1] != 0 {
        return None;
    }
    let mut pos = start + 4;
    while pos < end - 1 {
        let type_byte = buf[pos];
        let name_start = pos + 1;
        let name_end = name_start + buf.get(name_start..end)?.iter().position(|b| *b == 0)?;
        std::str::from_utf8(&buf[name_start..name_end]).ok()?;
        let payload = name_end + 1;
        let size = payload_size(buf, type_byte, payload)?;
        if payload + size > end - 1 {
            return None;
        }
        match type_byte {
            TYPE_STRING => {
                if size < 5 || buf[payload + size - 1] != 0 {
                    return None;
                }
                std::str::from_utf8(&buf[payload + 4..payload + size - 1]).ok()?;
            }
            TYPE_OBJECT | TYPE_ARRAY => {
                if validate_document(buf, payload, depth + 1)? != payload + size {
                    return None;
                }
            }
            _ => {}
        }
        pos = payload + size;
    }
    (pos == end - 1).then_some(end)
}

/// Incrementally encodes a document.
#[derive(Debug)]
pub struct WireBuilder {
    buf: Vec<u8>,
}

impl Default for WireBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WireBuilder {
    /// Starts an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: vec![0, 0, 0, 0],
        }
    }

    /// Appends a field. Nothing values are skipped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a field name containing a null byte and
    /// `Internal` for VM-internal values that have no wire form.
    pub fn append(&mut self, name: &str, value: &Value) -> Result<()> {
        if name.contains('\0') {
            return Err(Error::invalid_argument("field name cannot contain a null byte"));
        }
        let type_byte = match value {
            Value::Nothing => return Ok(()),
            Value::Double(_) => TYPE_DOUBLE,
            Value::String(_) => TYPE_STRING,
            Value::Object(_) | Value::BsonObject(_) => TYPE_OBJECT,
            Value::Array(_) | Value::ArraySet(_) | Value::ArrayMultiSet(_) | Value::BsonArray(_) => TYPE_ARRAY,
            Value::Bool(_) => TYPE_BOOL,
            Value::Date(_) => TYPE_DATE,
            Value::Null => TYPE_NULL,
            Value::Int32(_) => TYPE_INT32,
            Value::Timestamp(_) => TYPE_TIMESTAMP,
            Value::Int64(_) => TYPE_INT64,
            Value::Decimal(_) => TYPE_DECIMAL,
            Value::MaxKey => TYPE_MAXKEY,
            Value::MinKey => TYPE_MINKEY,
            other => {
                return Err(Error::internal(format!("{} has no wire encoding", other.tag())));
            }
        };
        self.buf.push(type_byte);
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(0);
        match value {
            Value::Double(f) => self.buf.extend_from_slice(&f.to_le_bytes()),
            Value::String(s) => {
                let len = i32::try_from(s.len() + 1)
                    .map_err(|_| Error::invalid_argument("string too large to encode"))?;
                self.buf.extend_from_slice(&len.to_le_bytes());
                self.buf.extend_from_slice(s.as_bytes());
                self.buf.push(0);
            }
            Value::Object(_) | Value::BsonObject(_) => {
                let doc = WireDoc::from_object(value)?;
                self.buf.extend_from_slice(doc.as_bytes());
            }
            Value::Array(_) | Value::ArraySet(_) | Value::ArrayMultiSet(_) | Value::BsonArray(_) => {
                let doc = WireDoc::from_array(value)?;
                self.buf.extend_from_slice(doc.as_bytes());
            }
            Value::Bool(b) => self.buf.push(u8::from(*b)),
            Value::Date(ms) => self.buf.extend_from_slice(&ms.to_le_bytes()),
            Value::Int32(n) => self.buf.extend_from_slice(&n.to_le_bytes()),
            Value::Timestamp(ts) => self.buf.extend_from_slice(&ts.to_le_bytes()),
            Value::Int64(n) => self.buf.extend_from_slice(&n.to_le_bytes()),
            Value::Decimal(d) => self.buf.extend_from_slice(&d.serialize()),
            _ => {}
        }
        Ok(())
    }

    /// Terminates the document and returns it as a view.
    #[must_use]
    pub fn finish(mut self) -> WireDoc {
        self.buf.push(0);
        let len = i32::try_from(self.buf.len()).unwrap_or(i32::MAX);
        self.buf[..4].copy_from_slice(&len.to_le_bytes());
        let end = self.buf.len();
        WireDoc {
            buf: self.buf.into(),
            start: 0,
            end,
        }
    }
}
