//! Closure-backed connection handler.

use bytes::Bytes;

use super::ConnectionHandler;
use crate::connection::Connection;
use crate::error::{Result, RpcError};
use crate::protocol::{Header, MessageAmendment};

type ConnectFn = Box<dyn Fn(&Connection) + Send + Sync>;
type DisconnectFn = Box<dyn Fn(Result<()>) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&RpcError) -> bool + Send + Sync>;
type PingFn = Box<dyn Fn(Vec<Header>, Option<Bytes>) + Send + Sync>;
type AmenderFn = Box<dyn Fn() -> MessageAmendment + Send + Sync>;

/// A [`ConnectionHandler`] built from optional closures.
///
/// Unset events fall back to the trait defaults: errors close the
/// connection, pings are not decoded, CONNECT carries no amendment.
#[derive(Default)]
pub struct Callbacks {
    on_connect: Option<ConnectFn>,
    on_disconnect: Option<DisconnectFn>,
    on_error: Option<ErrorFn>,
    on_ping: Option<PingFn>,
    connect_amender: Option<AmenderFn>,
}

impl Callbacks {
    /// Create a handler with no callbacks set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect callback.
    pub fn with_connect<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.on_connect = Some(Box::new(f));
        self
    }

    /// Set the disconnect callback.
    pub fn with_disconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(Result<()>) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Box::new(f));
        self
    }

    /// Set the error callback. Return `true` to close the connection.
    pub fn with_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&RpcError) -> bool + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Set the ping callback.
    pub fn with_ping<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Header>, Option<Bytes>) + Send + Sync + 'static,
    {
        self.on_ping = Some(Box::new(f));
        self
    }

    /// Set the CONNECT amender. Called once per connection attempt.
    pub fn with_amender<F>(mut self, f: F) -> Self
    where
        F: Fn() -> MessageAmendment + Send + Sync + 'static,
    {
        self.connect_amender = Some(Box::new(f));
        self
    }
}

impl ConnectionHandler for Callbacks {
    fn on_connect(&self, connection: &Connection) {
        if let Some(f) = &self.on_connect {
            f(connection);
        }
    }

    fn on_disconnect(&self, reason: Result<()>) {
        if let Some(f) = &self.on_disconnect {
            f(reason);
        }
    }

    fn on_error(&self, error: &RpcError) -> bool {
        match &self.on_error {
            Some(f) => f(error),
            None => true,
        }
    }

    fn on_ping(&self, headers: Vec<Header>, payload: Option<Bytes>) {
        if let Some(f) = &self.on_ping {
            f(headers, payload);
        }
    }

    fn wants_ping(&self) -> bool {
        self.on_ping.is_some()
    }

    fn connect_amendment(&self) -> Option<MessageAmendment> {
        self.connect_amender.as_ref().map(|f| f())
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_ping", &self.on_ping.is_some())
            .field("connect_amender", &self.connect_amender.is_some())
            .finish()
    }
}
