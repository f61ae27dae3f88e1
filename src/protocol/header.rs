//! Typed message headers.
//!
//! A header is a name plus a typed value. The value is always stored as an
//! owned byte buffer, whatever its declared type:
//!
//! ```text
//! ┌───────────────┬────────────┬──────────────────────┐
//! │ Name          │ Value type │ Value bytes          │
//! │ ≤ 127 bytes   │ 1 byte     │ owned, type-encoded  │
//! └───────────────┴────────────┴──────────────────────┘
//! ```
//!
//! Header identity is the name alone, compared ASCII case-insensitively.
//!
//! # Example
//!
//! ```
//! use eventstream_rpc::protocol::Header;
//!
//! let a = Header::new("Client-Name", "alpha");
//! let b = Header::new("client-name", "beta");
//! assert_eq!(a, b);
//! assert_eq!(a.as_str(), Some("alpha"));
//! ```

use std::hash::{Hash, Hasher};

use bytes::Bytes;

/// Maximum header name length in bytes. Longer names are truncated.
pub const MAX_HEADER_NAME_LEN: usize = 127;

/// Declared type of a header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HeaderValueType {
    BoolTrue = 0,
    BoolFalse = 1,
    Byte = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    ByteBuf = 6,
    String = 7,
    Timestamp = 8,
    Uuid = 9,
}

impl HeaderValueType {
    /// Convert from the raw wire value.
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::BoolTrue,
            1 => Self::BoolFalse,
            2 => Self::Byte,
            3 => Self::Int16,
            4 => Self::Int32,
            5 => Self::Int64,
            6 => Self::ByteBuf,
            7 => Self::String,
            8 => Self::Timestamp,
            9 => Self::Uuid,
            _ => return None,
        })
    }
}

/// Borrowed view of a header, as exchanged with the transport.
///
/// Outbound sends build a short-lived array of these over the caller's
/// headers; inbound messages arrive as these over transport-owned buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRef<'a> {
    /// Header name.
    pub name: &'a str,
    /// Declared value type.
    pub value_type: HeaderValueType,
    /// Encoded value bytes.
    pub value: &'a [u8],
}

/// An owned, typed header.
#[derive(Debug, Clone)]
pub struct Header {
    name: String,
    value_type: HeaderValueType,
    value: Bytes,
}

impl Header {
    /// Create a string-valued header.
    pub fn new(name: &str, value: &str) -> Self {
        Self::with_value(name, HeaderValueType::String, value.as_bytes())
    }

    /// Create a header from a declared type and its encoded value bytes.
    ///
    /// The bytes are copied; the header never borrows from the caller.
    pub fn with_value(name: &str, value_type: HeaderValueType, value: &[u8]) -> Self {
        Self {
            name: truncate_name(name).to_string(),
            value_type,
            value: Bytes::copy_from_slice(value),
        }
    }

    /// Create a boolean header. The value is carried by the type alone.
    pub fn bool(name: &str, value: bool) -> Self {
        let value_type = if value {
            HeaderValueType::BoolTrue
        } else {
            HeaderValueType::BoolFalse
        };
        Self::with_value(name, value_type, &[])
    }

    /// Create a single-byte header.
    pub fn byte(name: &str, value: i8) -> Self {
        Self::with_value(name, HeaderValueType::Byte, &value.to_be_bytes())
    }

    /// Create a 16-bit integer header.
    pub fn int16(name: &str, value: i16) -> Self {
        Self::with_value(name, HeaderValueType::Int16, &value.to_be_bytes())
    }

    /// Create a 32-bit integer header.
    pub fn int32(name: &str, value: i32) -> Self {
        Self::with_value(name, HeaderValueType::Int32, &value.to_be_bytes())
    }

    /// Create a 64-bit integer header.
    pub fn int64(name: &str, value: i64) -> Self {
        Self::with_value(name, HeaderValueType::Int64, &value.to_be_bytes())
    }

    /// Create a raw byte buffer header.
    pub fn byte_buf(name: &str, value: &[u8]) -> Self {
        Self::with_value(name, HeaderValueType::ByteBuf, value)
    }

    /// Create a timestamp header (milliseconds since the Unix epoch).
    pub fn timestamp(name: &str, millis: i64) -> Self {
        Self::with_value(name, HeaderValueType::Timestamp, &millis.to_be_bytes())
    }

    /// Create a UUID header from its 16 raw bytes.
    pub fn uuid(name: &str, value: [u8; 16]) -> Self {
        Self::with_value(name, HeaderValueType::Uuid, &value)
    }

    /// Copy a borrowed wire header into an owned one.
    pub fn from_wire(wire: &HeaderRef<'_>) -> Self {
        Self::with_value(wire.name, wire.value_type, wire.value)
    }

    /// Borrow this header as a wire handle.
    #[inline]
    pub fn as_wire(&self) -> HeaderRef<'_> {
        HeaderRef {
            name: &self.name,
            value_type: self.value_type,
            value: &self.value,
        }
    }

    /// Get the header name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the declared value type.
    #[inline]
    pub fn value_type(&self) -> HeaderValueType {
        self.value_type
    }

    /// Get the encoded value bytes.
    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Check whether this header's name matches `name`, ignoring ASCII case.
    #[inline]
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(truncate_name(name))
    }

    /// Move this header out, leaving an empty header in its place.
    pub fn take(&mut self) -> Header {
        let value_type = self.value_type;
        std::mem::replace(
            self,
            Header {
                name: String::new(),
                value_type,
                value: Bytes::new(),
            },
        )
    }

    /// Get the value as a string, if this is a valid UTF-8 string header.
    pub fn as_str(&self) -> Option<&str> {
        match self.value_type {
            HeaderValueType::String => std::str::from_utf8(&self.value).ok(),
            _ => None,
        }
    }

    /// Get the value as a boolean, if this is a boolean header.
    pub fn as_bool(&self) -> Option<bool> {
        match self.value_type {
            HeaderValueType::BoolTrue => Some(true),
            HeaderValueType::BoolFalse => Some(false),
            _ => None,
        }
    }

    /// Get the value as a signed byte.
    pub fn as_byte(&self) -> Option<i8> {
        match self.value_type {
            HeaderValueType::Byte => self.fixed::<1>().map(i8::from_be_bytes),
            _ => None,
        }
    }

    /// Get the value as a 16-bit integer.
    pub fn as_i16(&self) -> Option<i16> {
        match self.value_type {
            HeaderValueType::Int16 => self.fixed::<2>().map(i16::from_be_bytes),
            _ => None,
        }
    }

    /// Get the value as a 32-bit integer.
    pub fn as_i32(&self) -> Option<i32> {
        match self.value_type {
            HeaderValueType::Int32 => self.fixed::<4>().map(i32::from_be_bytes),
            _ => None,
        }
    }

    /// Get the value as a 64-bit integer. Timestamps are accepted too.
    pub fn as_i64(&self) -> Option<i64> {
        match self.value_type {
            HeaderValueType::Int64 | HeaderValueType::Timestamp => {
                self.fixed::<8>().map(i64::from_be_bytes)
            }
            _ => None,
        }
    }

    /// Get the value as raw bytes, if this is a byte buffer header.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.value_type {
            HeaderValueType::ByteBuf => Some(&self.value),
            _ => None,
        }
    }

    /// Get the value as a UUID.
    pub fn as_uuid(&self) -> Option<[u8; 16]> {
        match self.value_type {
            HeaderValueType::Uuid => self.fixed::<16>(),
            _ => None,
        }
    }

    fn fixed<const N: usize>(&self) -> Option<[u8; N]> {
        let value: &[u8] = &self.value;
        value.try_into().ok()
    }
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for Header {}

impl Hash for Header {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.name.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
        state.write_usize(self.name.len());
    }
}

/// Truncate a name to at most [`MAX_HEADER_NAME_LEN`] bytes on a char boundary.
fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_HEADER_NAME_LEN {
        return name;
    }
    let mut end = MAX_HEADER_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
