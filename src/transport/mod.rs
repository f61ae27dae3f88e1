//! Transport module - the boundary to socket I/O, TLS and framing.
//!
//! The connection engine never touches bytes. It talks to a transport through
//! three traits:
//! - [`Connector`] - starts a connection attempt
//! - [`Transport`] - an established connection: submit messages, close
//! - [`TransportEvents`] - callbacks the transport drives from its event loop
//!
//! A transport must deliver `on_setup` once, then any number of `on_message`
//! calls, then `on_shutdown` once, all from a single event loop per
//! connection. `on_shutdown` is only delivered after a successful setup.
//!
//! [`memory`] provides an in-process implementation backed by tokio channels.

pub mod memory;

#[cfg(test)]
pub(crate) mod recording;

use std::sync::Arc;
use std::time::Duration;

use crate::completion::PendingSend;
use crate::error::Result;
use crate::protocol::{InboundMessage, OutboundMessage};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Socket-level options, passed through to the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// How long the connector may take to establish the connection.
    pub connect_timeout: Duration,
    /// Enable TCP keep-alive.
    pub keep_alive: bool,
    /// Interval between keep-alive probes.
    pub keep_alive_interval: Option<Duration>,
    /// Time without a probe reply before the connection is dropped.
    pub keep_alive_timeout: Option<Duration>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keep_alive: false,
            keep_alive_interval: None,
            keep_alive_timeout: None,
        }
    }
}

/// TLS options. Opaque to this crate; only the connector reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Server name for SNI and certificate verification.
    pub server_name: Option<String>,
    /// ALPN protocol list, in preference order.
    pub alpn_protocols: Vec<String>,
}

/// Everything a connector needs to reach the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Socket options.
    pub socket: SocketOptions,
    /// TLS options, if the connection is encrypted.
    pub tls: Option<TlsOptions>,
}

/// Starts connection attempts.
pub trait Connector: Send + Sync + 'static {
    /// Begin connecting.
    ///
    /// Returning `Err` rejects the attempt synchronously; `events` is then
    /// never called. Returning `Ok` promises exactly one `on_setup`.
    fn connect(&self, options: &TransportOptions, events: Arc<dyn TransportEvents>) -> Result<()>;
}

/// An established transport connection.
pub trait Transport: Send + Sync + 'static {
    /// Submit a message.
    ///
    /// The transport copies what it needs before returning and completes
    /// `completion` exactly once, synchronously on rejection or later from
    /// its event loop.
    fn send_message(&self, message: OutboundMessage<'_>, completion: PendingSend);

    /// Request shutdown. `reason` is reported back through `on_shutdown`.
    fn close(&self, reason: Result<()>);
}

/// Callbacks driven by the transport's event loop.
pub trait TransportEvents: Send + Sync + 'static {
    /// The connection attempt finished.
    fn on_setup(&self, result: Result<Arc<dyn Transport>>);

    /// A message arrived.
    fn on_message(&self, message: &InboundMessage<'_>);

    /// The connection shut down.
    fn on_shutdown(&self, reason: Result<()>);
}
