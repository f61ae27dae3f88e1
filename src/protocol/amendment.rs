//! Message amendments.
//!
//! An amendment is the caller's customization of an outgoing message: an
//! ordered list of extra headers and an optional payload. It is built fresh
//! for each handshake attempt and consumed by it.

use bytes::Bytes;

use super::header::Header;

/// Headers and an optional payload to merge into an outgoing message.
#[derive(Debug, Clone, Default)]
pub struct MessageAmendment {
    headers: Vec<Header>,
    payload: Option<Bytes>,
}

impl MessageAmendment {
    /// Create an empty amendment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an amendment from an ordered header list.
    pub fn from_headers(headers: Vec<Header>) -> Self {
        Self {
            headers,
            payload: None,
        }
    }

    /// Create an amendment carrying only a payload.
    pub fn from_payload(payload: Bytes) -> Self {
        Self {
            headers: Vec::new(),
            payload: Some(payload),
        }
    }

    /// Create an amendment from headers and a payload.
    pub fn from_parts(headers: Vec<Header>, payload: Option<Bytes>) -> Self {
        Self { headers, payload }
    }

    /// Append a header (builder style).
    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    /// Set the payload (builder style).
    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Append a header, taking ownership of it.
    pub fn add_header(&mut self, header: Header) {
        self.headers.push(header);
    }

    /// Get the headers in order.
    #[inline]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Get mutable access to the header list.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }

    /// Get the payload.
    #[inline]
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Replace the payload.
    pub fn set_payload(&mut self, payload: Option<Bytes>) {
        self.payload = payload;
    }

    /// Remove and return the payload.
    pub fn take_payload(&mut self) -> Option<Bytes> {
        self.payload.take()
    }

    /// Split into headers and payload.
    pub fn into_parts(self) -> (Vec<Header>, Option<Bytes>) {
        (self.headers, self.payload)
    }

    /// True when there are no headers and no payload.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.payload.is_none()
    }
}
