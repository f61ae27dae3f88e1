//! Handler module - connection lifecycle events.
//!
//! Provides:
//! - [`ConnectionHandler`] - one method per connection event
//! - [`Callbacks`] - a handler assembled from closures
//!
//! Each event is dispatched exactly once, from the connection's event loop.
//!
//! # Example
//!
//! ```ignore
//! use eventstream_rpc::handler::Callbacks;
//! use eventstream_rpc::protocol::{Header, MessageAmendment};
//!
//! let callbacks = Callbacks::new()
//!     .with_connect(|conn| tracing::info!("connected: {}", conn.id()))
//!     .with_disconnect(|reason| tracing::info!("disconnected: {:?}", reason))
//!     .with_amender(|| {
//!         MessageAmendment::new().header(Header::new("client-name", "accepted.worker"))
//!     });
//! ```

mod callbacks;

pub use callbacks::Callbacks;

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::{Result, RpcError};
use crate::protocol::{Header, MessageAmendment};

/// Receives connection lifecycle events.
///
/// Every method has a default, so implementors override only what they use.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// The server accepted the handshake.
    fn on_connect(&self, connection: &Connection) {
        let _ = connection;
    }

    /// The transport shut down. `Ok(())` after a clean close.
    fn on_disconnect(&self, reason: Result<()>) {
        let _ = reason;
    }

    /// A setup failure or a protocol/internal error frame.
    ///
    /// Return `true` to close the connection, `false` to keep it open.
    fn on_error(&self, error: &RpcError) -> bool {
        let _ = error;
        true
    }

    /// The server sent a PING. No response is sent automatically.
    fn on_ping(&self, headers: Vec<Header>, payload: Option<Bytes>) {
        let _ = (headers, payload);
    }

    /// Whether [`on_ping`](Self::on_ping) should be called at all.
    ///
    /// When `false`, inbound PING headers are not decoded.
    fn wants_ping(&self) -> bool {
        true
    }

    /// Headers and payload to add to the CONNECT message.
    fn connect_amendment(&self) -> Option<MessageAmendment> {
        None
    }
}
