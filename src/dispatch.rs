//! Per-connection driver.
//!
//! Receives transport events, runs the handshake, routes inbound frames by
//! type and tears the connection down when the transport shuts down.
//!
//! ```text
//! on_setup(Ok) ──► Connection + CONNECT ──► on_message(CONNECT_ACK) ──► on_connect
//!      │                                             │
//!      └─ Err ──► on_error                           └─ rejected ──► close
//!
//! on_shutdown ──► scope removal + on_disconnect (once)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::connection::{Connection, ConnectionState};
use crate::error::{Result, RpcError};
use crate::handler::ConnectionHandler;
use crate::protocol::{compose_connect, flags, InboundMessage, MessageType};
use crate::scope::ResourceScope;
use crate::transport::{Transport, TransportEvents};

pub(crate) struct ConnectionDriver {
    handler: Arc<dyn ConnectionHandler>,
    scope: ResourceScope,
    connection: Mutex<Option<Connection>>,
    /// Set when the failure was already reported through `on_error`.
    setup_failed: AtomicBool,
}

impl ConnectionDriver {
    pub(crate) fn new(handler: Arc<dyn ConnectionHandler>, scope: ResourceScope) -> Self {
        Self {
            handler,
            scope,
            connection: Mutex::new(None),
            setup_failed: AtomicBool::new(false),
        }
    }

    fn connection(&self) -> Option<Connection> {
        self.connection.lock().clone()
    }

    fn start_handshake(&self, connection: &Connection) -> Result<()> {
        let amendment = self.handler.connect_amendment();
        let message = compose_connect(connection.default_headers(), None, amendment)?;

        for header in &message.leftover {
            tracing::debug!(
                connection = %connection.id(),
                "Dropping amender header {:?}, a default header has the same name",
                header.name()
            );
        }

        connection.send_connect(message.amendment)
    }

    fn fail_setup(&self, connection: &Connection, error: RpcError) {
        tracing::error!(connection = %connection.id(), "Handshake setup failed: {}", error);
        self.setup_failed.store(true, Ordering::Release);
        self.handler.on_error(&error);
        connection.close_with_error(error);
    }

    fn on_connect_ack(&self, connection: &Connection, message: &InboundMessage<'_>) {
        if message.has_flag(flags::CONNECTION_ACCEPTED) {
            if connection.transition(ConnectionState::WaitingForConnectAck, ConnectionState::Connected) {
                tracing::debug!(connection = %connection.id(), "Handshake accepted");
                self.handler.on_connect(connection);
                return;
            }
        } else if connection.transition(
            ConnectionState::WaitingForConnectAck,
            ConnectionState::Disconnecting,
        ) {
            tracing::debug!(connection = %connection.id(), "Handshake rejected");
            connection.close_with_error(RpcError::ConnectionClosed);
            return;
        }

        tracing::warn!(
            connection = %connection.id(),
            "Ignoring CONNECT_ACK in state {:?}",
            connection.state()
        );
    }

    fn on_ping(&self, connection: &Connection, message: &InboundMessage<'_>) {
        match connection.state() {
            ConnectionState::Connected | ConnectionState::WaitingForConnectAck => {}
            state => {
                tracing::trace!(connection = %connection.id(), "Ignoring PING in state {:?}", state);
                return;
            }
        }
        if !self.handler.wants_ping() {
            return;
        }

        let headers = message.decode_headers();
        self.handler.on_ping(headers, message.payload.cloned());
    }

    fn on_error_frame(&self, connection: &Connection, message_type: MessageType) {
        let count = connection.record_protocol_error();
        if self.handler.on_error(&RpcError::ProtocolError) {
            tracing::debug!(connection = %connection.id(), "Closing after {:?}", message_type);
            connection.close_with_error(RpcError::ProtocolError);
        } else {
            tracing::warn!(
                connection = %connection.id(),
                "Received {:?}, keeping connection open ({} so far)",
                message_type,
                count
            );
        }
    }
}

impl TransportEvents for ConnectionDriver {
    fn on_setup(&self, result: Result<Arc<dyn Transport>>) {
        let transport = match result {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!("Transport setup failed: {}", e);
                self.setup_failed.store(true, Ordering::Release);
                self.handler.on_error(&e);
                return;
            }
        };

        let connection = Connection::new(self.scope.allocate_id(), transport);
        self.scope.insert(connection.clone());
        *self.connection.lock() = Some(connection.clone());
        tracing::debug!(connection = %connection.id(), "Transport up, starting handshake");

        if let Err(e) = self.start_handshake(&connection) {
            self.fail_setup(&connection, e);
        }
    }

    fn on_message(&self, message: &InboundMessage<'_>) {
        let Some(connection) = self.connection() else {
            tracing::trace!("Ignoring {:?} without a connection", message.message_type);
            return;
        };

        match message.message_type {
            MessageType::ConnectAck => self.on_connect_ack(&connection, message),
            MessageType::Ping => self.on_ping(&connection, message),
            MessageType::PingResponse => {
                tracing::trace!(connection = %connection.id(), "PING_RESPONSE received");
            }
            MessageType::ProtocolError | MessageType::InternalError => {
                self.on_error_frame(&connection, message.message_type)
            }
            other => {
                tracing::trace!(connection = %connection.id(), "Ignoring {:?}", other);
            }
        }
    }

    fn on_shutdown(&self, reason: Result<()>) {
        let Some(connection) = self.connection.lock().take() else {
            tracing::trace!("Shutdown without a connection");
            return;
        };

        self.scope.remove(connection.id());
        drop(connection.release_transport());
        tracing::debug!(connection = %connection.id(), "Shut down: {:?}", reason);

        if self.setup_failed.load(Ordering::Acquire) {
            return;
        }
        self.handler.on_disconnect(reason);
    }
}
