//! # eventstream-rpc-client
//!
//! Client side of the event-stream RPC connection protocol.
//!
//! This crate runs the connection handshake and the message plumbing above a
//! framed transport. Frame encoding and sockets belong to the transport; this
//! layer decides what to send and what inbound frames mean.
//!
//! ## Lifecycle
//!
//! - [`connect`] hands the options to a [`Connector`](transport::Connector)
//! - on transport setup a [`Connection`] is created and CONNECT is sent,
//!   carrying the `:version` header plus any amender headers
//! - CONNECT_ACK with the accepted flag fires `on_connect`; without it the
//!   connection is closed
//! - transport shutdown fires `on_disconnect` and frees the connection
//!
//! ## Example
//!
//! ```ignore
//! use eventstream_rpc::{connect, ConnectionOptions, ResourceScope};
//! use eventstream_rpc::transport::memory::{self, MemoryConfig};
//!
//! #[tokio::main]
//! async fn main() -> eventstream_rpc::Result<()> {
//!     let (connector, _listener) = memory::listener(MemoryConfig::default());
//!     let scope = ResourceScope::new();
//!
//!     let options = ConnectionOptions::builder()
//!         .connector(connector)
//!         .host("localhost")
//!         .on_connect(|conn| {
//!             conn.send_ping(&[], None, |r| tracing::debug!("ping flushed: {:?}", r));
//!         })
//!         .build()?;
//!
//!     connect(options, &scope)
//! }
//! ```

pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;

mod client;
mod completion;
mod connection;
mod dispatch;
mod scope;

pub use client::{connect, ConnectionOptions, ConnectionOptionsBuilder, DEFAULT_PORT};
pub use completion::{FlushCallback, PendingSend};
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use error::{result_code, Result, RpcError};
pub use handler::{Callbacks, ConnectionHandler};
pub use scope::ResourceScope;
