//! Message types, flags, and the parsed message records exchanged with the
//! transport.
//!
//! The framing codec lives outside this crate. Messages cross the transport
//! boundary already parsed into a type, a flags word, headers and an
//! optional payload.

use bytes::Bytes;

use super::header::{Header, HeaderRef};

/// Message type as carried in the `:message-type` slot of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    /// Application-level message, routed by higher layers.
    ApplicationMessage = 0,
    /// Application-level error, routed by higher layers.
    ApplicationError = 1,
    /// Keep-alive ping.
    Ping = 2,
    /// Reply to a ping.
    PingResponse = 3,
    /// Handshake request. Sent once per connection.
    Connect = 4,
    /// Handshake reply.
    ConnectAck = 5,
    /// Peer detected a protocol violation.
    ProtocolError = 6,
    /// Peer hit an internal error.
    InternalError = 7,
}

impl MessageType {
    /// Convert from the raw wire value.
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::ApplicationMessage,
            1 => Self::ApplicationError,
            2 => Self::Ping,
            3 => Self::PingResponse,
            4 => Self::Connect,
            5 => Self::ConnectAck,
            6 => Self::ProtocolError,
            7 => Self::InternalError,
            _ => return None,
        })
    }
}

/// Flag constants for the protocol.
pub mod flags {
    /// CONNECT_ACK: the server accepted the connection.
    pub const CONNECTION_ACCEPTED: u32 = 0x0000_0001;
    /// Application message: this is the last message on its stream.
    pub const TERMINATE_STREAM: u32 = 0x0000_0002;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u32, flag: u32) -> bool {
        flags & flag != 0
    }
}

/// A message submitted to the transport.
///
/// Borrows everything. The transport must copy what it needs before
/// `send_message` returns.
#[derive(Debug, Clone, Copy)]
pub struct OutboundMessage<'a> {
    /// Message type.
    pub message_type: MessageType,
    /// Flags word.
    pub flags: u32,
    /// Header handles.
    pub headers: &'a [HeaderRef<'a>],
    /// Optional payload.
    pub payload: Option<&'a Bytes>,
}

/// A message delivered by the transport.
///
/// Borrows transport-owned buffers for the duration of the dispatch call.
#[derive(Debug, Clone, Copy)]
pub struct InboundMessage<'a> {
    /// Message type.
    pub message_type: MessageType,
    /// Flags word.
    pub flags: u32,
    /// Header handles.
    pub headers: &'a [HeaderRef<'a>],
    /// Optional payload.
    pub payload: Option<&'a Bytes>,
}

impl InboundMessage<'_> {
    /// Check if a flag is set.
    #[inline]
    pub fn has_flag(&self, flag: u32) -> bool {
        flags::has_flag(self.flags, flag)
    }

    /// Copy the headers out into owned values.
    pub fn decode_headers(&self) -> Vec<Header> {
        self.headers.iter().map(Header::from_wire).collect()
    }
}

/// An owned message.
///
/// Used by transports that queue messages, and by peers that script the
/// server side of a connection.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Message type.
    pub message_type: MessageType,
    /// Flags word.
    pub flags: u32,
    /// Headers.
    pub headers: Vec<Header>,
    /// Optional payload.
    pub payload: Option<Bytes>,
}

impl Frame {
    /// Create a frame with no headers and no payload.
    pub fn new(message_type: MessageType, flags: u32) -> Self {
        Self {
            message_type,
            flags,
            headers: Vec::new(),
            payload: None,
        }
    }

    /// Add a header.
    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    /// Set the payload.
    pub fn payload(mut self, payload: Bytes) -> Self {
        self.payload = Some(payload);
        self
    }

    /// CONNECT_ACK frame, accepted or rejected.
    pub fn connect_ack(accepted: bool) -> Self {
        let flags = if accepted {
            flags::CONNECTION_ACCEPTED
        } else {
            0
        };
        Self::new(MessageType::ConnectAck, flags)
    }

    /// Copy an outbound message into an owned frame.
    pub fn from_outbound(message: &OutboundMessage<'_>) -> Self {
        Self {
            message_type: message.message_type,
            flags: message.flags,
            headers: message.headers.iter().map(Header::from_wire).collect(),
            payload: message.payload.cloned(),
        }
    }

    /// Check if a flag is set.
    #[inline]
    pub fn has_flag(&self, flag: u32) -> bool {
        flags::has_flag(self.flags, flag)
    }

    /// Find a header by name, ignoring ASCII case.
    pub fn find_header(&self, name: &str) -> Option<&Header> {
        self.headers.iter().find(|h| h.is_named(name))
    }

    /// Borrow this frame as an inbound message and pass it to `f`.
    pub fn with_inbound<R>(&self, f: impl FnOnce(&InboundMessage<'_>) -> R) -> R {
        let handles: Vec<HeaderRef<'_>> = self.headers.iter().map(Header::as_wire).collect();
        let message = InboundMessage {
            message_type: self.message_type,
            flags: self.flags,
            headers: &handles,
            payload: self.payload.as_ref(),
        };
        f(&message)
    }
}
