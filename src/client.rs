//! Connection options and the connect entry point.
//!
//! [`ConnectionOptionsBuilder`] collects the transport settings and the
//! event handler. [`connect`] hands them to the connector and returns as
//! soon as the attempt is accepted; everything after that is reported
//! through the handler.
//!
//! # Example
//!
//! ```ignore
//! use eventstream_rpc::{connect, ConnectionOptions, ResourceScope};
//! use eventstream_rpc::protocol::{Header, MessageAmendment};
//! use eventstream_rpc::transport::memory::{self, MemoryConfig};
//!
//! let (connector, listener) = memory::listener(MemoryConfig::default());
//! let scope = ResourceScope::new();
//!
//! let options = ConnectionOptions::builder()
//!     .connector(connector)
//!     .host("localhost")
//!     .port(8033)
//!     .on_connect(|conn| tracing::info!("connected: {}", conn.id()))
//!     .on_disconnect(|reason| tracing::info!("disconnected: {:?}", reason))
//!     .connect_amender(|| {
//!         MessageAmendment::new().header(Header::new("client-name", "accepted.worker"))
//!     })
//!     .build()?;
//!
//! connect(options, &scope)?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::connection::Connection;
use crate::dispatch::ConnectionDriver;
use crate::error::{Result, RpcError};
use crate::handler::{Callbacks, ConnectionHandler};
use crate::protocol::{Header, MessageAmendment};
use crate::scope::ResourceScope;
use crate::transport::{Connector, SocketOptions, TlsOptions, TransportOptions};

/// Default server port.
pub const DEFAULT_PORT: u16 = 8033;

/// Everything needed to start a connection attempt. Immutable once built.
#[derive(Clone)]
pub struct ConnectionOptions {
    connector: Arc<dyn Connector>,
    transport: TransportOptions,
    handler: Arc<dyn ConnectionHandler>,
}

impl ConnectionOptions {
    /// Create a builder.
    pub fn builder() -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::new()
    }

    /// Transport settings passed to the connector.
    pub fn transport(&self) -> &TransportOptions {
        &self.transport
    }

    /// Server host.
    pub fn host(&self) -> &str {
        &self.transport.host
    }

    /// Server port.
    pub fn port(&self) -> u16 {
        self.transport.port
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectionOptions`].
///
/// Either pass a full [`ConnectionHandler`] with [`handler`](Self::handler)
/// or set individual callbacks; mixing both is rejected by `build()`.
pub struct ConnectionOptionsBuilder {
    connector: Option<Arc<dyn Connector>>,
    host: String,
    port: u16,
    socket: SocketOptions,
    tls: Option<TlsOptions>,
    handler: Option<Arc<dyn ConnectionHandler>>,
    callbacks: Option<Callbacks>,
}

impl ConnectionOptionsBuilder {
    /// Create a builder with default socket options and no TLS.
    pub fn new() -> Self {
        Self {
            connector: None,
            host: String::new(),
            port: DEFAULT_PORT,
            socket: SocketOptions::default(),
            tls: None,
            handler: None,
            callbacks: None,
        }
    }

    /// Set the connector that opens the transport.
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Set a shared connector.
    pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Server host. Required.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Server port.
    ///
    /// Default: 8033
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Replace all socket options.
    pub fn socket_options(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }

    /// Set the connect timeout.
    ///
    /// Default: 3 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.socket.connect_timeout = timeout;
        self
    }

    /// Enable TLS with the given options.
    pub fn tls_options(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Use a full event handler.
    pub fn handler(mut self, handler: Arc<dyn ConnectionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Called once the server accepts the handshake.
    pub fn on_connect<F>(self, f: F) -> Self
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.with_callbacks(|c| c.with_connect(f))
    }

    /// Called once the transport shuts down.
    pub fn on_disconnect<F>(self, f: F) -> Self
    where
        F: Fn(Result<()>) + Send + Sync + 'static,
    {
        self.with_callbacks(|c| c.with_disconnect(f))
    }

    /// Called on setup failures and protocol error frames.
    /// Return `true` to close the connection.
    pub fn on_error<F>(self, f: F) -> Self
    where
        F: Fn(&RpcError) -> bool + Send + Sync + 'static,
    {
        self.with_callbacks(|c| c.with_error(f))
    }

    /// Called for each inbound PING.
    pub fn on_ping<F>(self, f: F) -> Self
    where
        F: Fn(Vec<Header>, Option<Bytes>) + Send + Sync + 'static,
    {
        self.with_callbacks(|c| c.with_ping(f))
    }

    /// Supplies extra CONNECT headers and payload.
    pub fn connect_amender<F>(self, f: F) -> Self
    where
        F: Fn() -> MessageAmendment + Send + Sync + 'static,
    {
        self.with_callbacks(|c| c.with_amender(f))
    }

    fn with_callbacks(mut self, f: impl FnOnce(Callbacks) -> Callbacks) -> Self {
        let callbacks = self.callbacks.take().unwrap_or_default();
        self.callbacks = Some(f(callbacks));
        self
    }

    /// Validate and build the options.
    pub fn build(self) -> Result<ConnectionOptions> {
        if self.host.is_empty() {
            return Err(RpcError::InvalidOptions("host is required".into()));
        }
        let Some(connector) = self.connector else {
            return Err(RpcError::InvalidOptions("connector is required".into()));
        };

        let handler: Arc<dyn ConnectionHandler> = match (self.handler, self.callbacks) {
            (Some(_), Some(_)) => {
                return Err(RpcError::InvalidOptions(
                    "set either a handler or individual callbacks".into(),
                ))
            }
            (Some(handler), None) => handler,
            (None, callbacks) => Arc::new(callbacks.unwrap_or_default()),
        };

        Ok(ConnectionOptions {
            connector,
            transport: TransportOptions {
                host: self.host,
                port: self.port,
                socket: self.socket,
                tls: self.tls,
            },
            handler,
        })
    }
}

impl Default for ConnectionOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Start a connection attempt.
///
/// `Ok` means the attempt is underway: exactly one of `on_error` (setup
/// failure) or the handshake outcome follows, and `on_disconnect` follows
/// any connection that got past setup. `Err` means the connector refused
/// the attempt and no callback will fire.
pub fn connect(options: ConnectionOptions, scope: &ResourceScope) -> Result<()> {
    let ConnectionOptions {
        connector,
        transport,
        handler,
    } = options;

    tracing::debug!("Connecting to {}:{}", transport.host, transport.port);
    let driver = Arc::new(ConnectionDriver::new(handler, scope.clone()));

    connector.connect(&transport, driver).map_err(|e| {
        tracing::error!("Connect to {}:{} refused: {}", transport.host, transport.port, e);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportEvents;

    struct RefusingConnector;

    impl Connector for RefusingConnector {
        fn connect(&self, _: &TransportOptions, _: Arc<dyn TransportEvents>) -> Result<()> {
            Err(RpcError::TransportSetup("no route".into()))
        }
    }

    #[test]
    fn test_builder_defaults() {
        let options = ConnectionOptions::builder()
            .connector(RefusingConnector)
            .host("localhost")
            .build()
            .unwrap();

        assert_eq!(options.host(), "localhost");
        assert_eq!(options.port(), DEFAULT_PORT);
        assert_eq!(options.transport().socket, SocketOptions::default());
        assert!(options.transport().tls.is_none());
    }

    #[test]
    fn test_builder_settings() {
        let tls = TlsOptions {
            server_name: Some("rpc.local".into()),
            alpn_protocols: vec!["x-amzn-http2".into()],
        };
        let options = ConnectionOptions::builder()
            .connector(RefusingConnector)
            .host("rpc.local")
            .port(443)
            .connect_timeout(Duration::from_millis(250))
            .tls_options(tls.clone())
            .build()
            .unwrap();

        assert_eq!(options.port(), 443);
        assert_eq!(
            options.transport().socket.connect_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(options.transport().tls, Some(tls));
    }

    #[test]
    fn test_builder_requires_host_and_connector() {
        let err = ConnectionOptions::builder()
            .connector(RefusingConnector)
            .build()
            .unwrap_err();
        assert!(matches!(err, RpcError::InvalidOptions(_)));

        let err = ConnectionOptions::builder().host("h").build().unwrap_err();
        assert!(matches!(err, RpcError::InvalidOptions(_)));
    }

    #[test]
    fn test_builder_rejects_handler_and_callbacks() {
        let err = ConnectionOptions::builder()
            .connector(RefusingConnector)
            .host("h")
            .handler(Arc::new(Callbacks::new()))
            .on_disconnect(|_| {})
            .build()
            .unwrap_err();
        assert!(matches!(err, RpcError::InvalidOptions(_)));
    }

    #[test]
    fn test_connect_refused_synchronously() {
        let scope = ResourceScope::new();
        let options = ConnectionOptions::builder()
            .connector(RefusingConnector)
            .host("h")
            .on_error(|_| panic!("no callback after a synchronous refusal"))
            .build()
            .unwrap();

        assert_eq!(
            connect(options, &scope),
            Err(RpcError::TransportSetup("no route".into()))
        );
        assert_eq!(scope.live_count(), 0);
    }
}
