//! Connection handle, state machine and the uniform send path.
//!
//! A [`Connection`] is created by the connect factory once the transport is
//! up. It is handed to [`ConnectionHandler::on_connect`] and may be cloned
//! and used from any thread. All sends funnel through one primitive that
//! builds a scratch array of header handles, submits it, and guarantees
//! exactly one flush completion per attempt.
//!
//! # States
//!
//! ```text
//! WaitingForConnectAck ──accepted──► Connected ──close──► Disconnected
//!          │                                                  ▲
//!          └──rejected──► Disconnecting ──close───────────────┘
//! ```
//!
//! [`ConnectionHandler::on_connect`]: crate::handler::ConnectionHandler::on_connect

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::completion::PendingSend;
use crate::error::{Result, RpcError};
use crate::protocol::{
    Header, HeaderRef, MessageAmendment, MessageType, OutboundMessage, PROTOCOL_VERSION,
    VERSION_HEADER,
};
use crate::transport::Transport;

/// Identifier of a connection within its resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl ConnectionId {
    /// Raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handshake and lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// CONNECT sent, waiting for the server's reply.
    WaitingForConnectAck = 0,
    /// Handshake accepted.
    Connected = 1,
    /// Handshake rejected, close in progress.
    Disconnecting = 2,
    /// Terminal.
    Disconnected = 3,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::WaitingForConnectAck,
            1 => Self::Connected,
            2 => Self::Disconnecting,
            _ => Self::Disconnected,
        }
    }
}

/// Handle to an established transport connection.
///
/// Cheap to clone. The transport is released when the transport reports
/// shutdown, not when the last handle is dropped; sends after that point
/// complete with [`RpcError::ConnectionClosed`].
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    id: ConnectionId,
    state: AtomicU8,
    /// Immutable after construction. Always holds the version header.
    default_headers: Vec<Header>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    close_requested: AtomicBool,
    connect_sent: AtomicBool,
    protocol_errors: AtomicU64,
}

impl Connection {
    /// Create a connection in `WaitingForConnectAck` with the default headers
    /// seeded.
    pub(crate) fn new(id: ConnectionId, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                state: AtomicU8::new(ConnectionState::WaitingForConnectAck as u8),
                default_headers: vec![Header::new(VERSION_HEADER, PROTOCOL_VERSION)],
                transport: Mutex::new(Some(transport)),
                close_requested: AtomicBool::new(false),
                connect_sent: AtomicBool::new(false),
                protocol_errors: AtomicU64::new(0),
            }),
        }
    }

    /// Connection id.
    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// True once the handshake was accepted and before any close.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Headers every CONNECT carries. Callers cannot override these.
    pub fn default_headers(&self) -> &[Header] {
        &self.inner.default_headers
    }

    /// Number of PROTOCOL_ERROR / INTERNAL_ERROR frames received.
    pub fn protocol_error_count(&self) -> u64 {
        self.inner.protocol_errors.load(Ordering::Acquire)
    }

    /// Send a PING.
    pub fn send_ping<F>(&self, headers: &[Header], payload: Option<Bytes>, on_flush: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.send_message(
            headers,
            payload.as_ref(),
            MessageType::Ping,
            0,
            PendingSend::new(MessageType::Ping, on_flush),
        );
    }

    /// Send a PING_RESPONSE.
    pub fn send_ping_response<F>(&self, headers: &[Header], payload: Option<Bytes>, on_flush: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.send_message(
            headers,
            payload.as_ref(),
            MessageType::PingResponse,
            0,
            PendingSend::new(MessageType::PingResponse, on_flush),
        );
    }

    /// Send an arbitrary protocol message.
    ///
    /// CONNECT is reserved for the handshake; passing it completes
    /// `on_flush` with [`RpcError::InvalidMessageType`].
    pub fn send_protocol_message<F>(
        &self,
        headers: &[Header],
        payload: Option<Bytes>,
        message_type: MessageType,
        flags: u32,
        on_flush: F,
    ) where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let completion = PendingSend::new(message_type, on_flush);
        if message_type == MessageType::Connect {
            completion.complete(Err(RpcError::InvalidMessageType(message_type)));
            return;
        }
        self.send_message(headers, payload.as_ref(), message_type, flags, completion);
    }

    /// Close with a success code.
    pub fn close(&self) {
        self.close_with(Ok(()));
    }

    /// Close with an error code.
    pub fn close_with_error(&self, error: RpcError) {
        self.close_with(Err(error));
    }

    /// Request transport shutdown and move to `Disconnected` immediately.
    ///
    /// Only the first call reaches the transport. `reason` is what
    /// `on_disconnect` will receive.
    pub(crate) fn close_with(&self, reason: Result<()>) {
        self.force_state(ConnectionState::Disconnected);
        if self.inner.close_requested.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::debug!(connection = %self.id(), "Closing: {:?}", reason);
        if let Some(transport) = self.transport() {
            transport.close(reason);
        }
    }

    /// Send the CONNECT message. Succeeds at most once per connection.
    ///
    /// CONNECT carries no user flush callback; its outcome arrives as
    /// CONNECT_ACK. A rejection reported before `send_message` returns is
    /// handed back to the caller, since no CONNECT_ACK can follow it.
    pub(crate) fn send_connect(&self, amendment: MessageAmendment) -> Result<()> {
        if self.inner.connect_sent.swap(true, Ordering::AcqRel) {
            return Err(RpcError::HandshakeAlreadySent);
        }

        let (headers, payload) = amendment.into_parts();
        let scratch = header_handles(&headers)?;
        let Some(transport) = self.transport() else {
            return Err(RpcError::ConnectionClosed);
        };

        tracing::debug!(
            connection = %self.id(),
            "Sending CONNECT with {} headers",
            headers.len()
        );

        let outcome = Arc::new(Mutex::new(ConnectOutcome::default()));
        let sink = outcome.clone();
        let id = self.id();
        let completion = PendingSend::new(MessageType::Connect, move |result| {
            let mut outcome = sink.lock();
            match result {
                Err(e) if !outcome.submitted => outcome.rejected = Some(e),
                Err(e) => tracing::debug!(connection = %id, "CONNECT flush failed: {}", e),
                Ok(()) => {}
            }
        });

        transport.send_message(
            OutboundMessage {
                message_type: MessageType::Connect,
                flags: 0,
                headers: &scratch,
                payload: payload.as_ref(),
            },
            completion,
        );

        let mut outcome = outcome.lock();
        outcome.submitted = true;
        match outcome.rejected.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Move from `from` to `to` if the current state is `from`.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn force_state(&self, to: ConnectionState) {
        self.inner.state.store(to as u8, Ordering::Release);
    }

    pub(crate) fn record_protocol_error(&self) -> u64 {
        self.inner.protocol_errors.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop the transport handle. Returns it the first time only.
    pub(crate) fn release_transport(&self) -> Option<Arc<dyn Transport>> {
        self.force_state(ConnectionState::Disconnected);
        self.inner.transport.lock().take()
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.inner.transport.lock().clone()
    }

    /// The send primitive. Completes `completion` exactly once.
    fn send_message(
        &self,
        headers: &[Header],
        payload: Option<&Bytes>,
        message_type: MessageType,
        flags: u32,
        completion: PendingSend,
    ) {
        if self.inner.close_requested.load(Ordering::Acquire) {
            completion.complete(Err(RpcError::ConnectionClosed));
            return;
        }
        let Some(transport) = self.transport() else {
            completion.complete(Err(RpcError::ConnectionClosed));
            return;
        };

        let scratch = match header_handles(headers) {
            Ok(scratch) => scratch,
            Err(e) => {
                tracing::warn!(connection = %self.id(), "Failed to build {:?} headers: {}", message_type, e);
                completion.complete(Err(e));
                return;
            }
        };

        transport.send_message(
            OutboundMessage {
                message_type,
                flags,
                headers: &scratch,
                payload,
            },
            completion,
        );
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Synchronous result of the CONNECT submission.
#[derive(Default)]
struct ConnectOutcome {
    submitted: bool,
    rejected: Option<RpcError>,
}

/// Build the scratch array of header handles for one send.
fn header_handles(headers: &[Header]) -> Result<Vec<HeaderRef<'_>>> {
    let mut scratch = Vec::new();
    scratch
        .try_reserve_exact(headers.len())
        .map_err(|_| RpcError::AllocationFailed)?;
    scratch.extend(headers.iter().map(Header::as_wire));
    Ok(scratch)
}
