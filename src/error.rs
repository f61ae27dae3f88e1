//! Error types for eventstream-rpc-client.

use thiserror::Error;

use crate::protocol::MessageType;

/// Main error type for all connection operations.
///
/// Errors are handed to several callbacks (`on_error`, `on_disconnect`,
/// flush completions), so the type is `Clone` and carries no I/O handles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The transport could not establish the underlying connection.
    #[error("Transport setup failed: {0}")]
    TransportSetup(String),

    /// The connection is closed, or was closed by the peer.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The peer reported a protocol or internal error.
    #[error("Protocol error")]
    ProtocolError,

    /// A header array or message could not be allocated.
    #[error("Allocation failed")]
    AllocationFailed,

    /// The transport queue is full and cannot accept the message.
    #[error("Transport queue full")]
    QueueFull,

    /// A CONNECT message was already sent on this connection.
    #[error("Handshake already sent")]
    HandshakeAlreadySent,

    /// The message type cannot be sent through the generic send path.
    #[error("Invalid message type for send: {0:?}")]
    InvalidMessageType(MessageType),

    /// Connection options failed validation.
    #[error("Invalid connection options: {0}")]
    InvalidOptions(String),
}

impl RpcError {
    /// Stable integer code for this error. Success is `0`.
    pub fn code(&self) -> i32 {
        match self {
            RpcError::TransportSetup(_) => 1,
            RpcError::ConnectionClosed => 2,
            RpcError::ProtocolError => 3,
            RpcError::AllocationFailed => 4,
            RpcError::QueueFull => 5,
            RpcError::HandshakeAlreadySent => 6,
            RpcError::InvalidMessageType(_) => 7,
            RpcError::InvalidOptions(_) => 8,
        }
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Integer code for a completion or disconnect result (`0` on success).
pub fn result_code(result: &Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}
