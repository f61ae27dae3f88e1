//! Protocol module - headers, message records, amendments and the CONNECT
//! header merge.
//!
//! This module implements the data model of the event-stream RPC protocol:
//! - Typed headers with case-insensitive name identity
//! - Message types, flags and parsed message records
//! - Message amendments for customizing outgoing messages
//! - The pure merge of default and proposed CONNECT headers

mod amendment;
mod header;
mod merge;
mod message;

pub use amendment::MessageAmendment;
pub use header::{Header, HeaderRef, HeaderValueType, MAX_HEADER_NAME_LEN};
pub use merge::{compose_connect, merge_headers, ConnectMessage, HeaderMerge};
pub use message::{flags, Frame, InboundMessage, MessageType, OutboundMessage};

/// Reserved header carrying the protocol version on CONNECT.
pub const VERSION_HEADER: &str = ":version";

/// Protocol version sent in [`VERSION_HEADER`].
pub const PROTOCOL_VERSION: &str = "0.1.0";
