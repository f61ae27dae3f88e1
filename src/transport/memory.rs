//! In-process transport backed by tokio channels.
//!
//! Each connection gets a dedicated event-loop task. The task is the only
//! place inbound messages are dispatched and flush completions fire, which is
//! the threading contract [`TransportEvents`] expects.
//!
//! # Architecture
//!
//! ```text
//! Connection ─► mpsc::Sender<Outbound> ─┐
//!                                       ├─► Event loop task ─► MemoryPeer
//! MemoryPeer ─► mpsc::Sender<PeerEvent>─┘         │
//!                                                 └─► TransportEvents
//! ```
//!
//! # Example
//!
//! ```ignore
//! use eventstream_rpc::transport::memory::{listener, MemoryConfig};
//!
//! let (connector, mut listener) = listener(MemoryConfig::default());
//! // hand `connector` to ConnectionOptions, then on the server side:
//! let mut peer = listener.accept().await.unwrap();
//! let connect = peer.recv().await.unwrap();
//! peer.send(Frame::connect_ack(true))?;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::{Connector, Transport, TransportEvents, TransportOptions};
use crate::completion::PendingSend;
use crate::error::{Result, RpcError};
use crate::protocol::{Frame, OutboundMessage};

/// Default capacity of the per-connection outbound queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum sends delivered per loop iteration.
const MAX_BATCH_SIZE: usize = 64;

/// Configuration for in-memory connections.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Outbound queue capacity. Sends beyond it fail with `QueueFull`.
    pub channel_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Create a connector and the listener that accepts its connections.
pub fn listener(config: MemoryConfig) -> (MemoryConnector, MemoryListener) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    (
        MemoryConnector { accept_tx, config },
        MemoryListener { accept_rx },
    )
}

/// A connection waiting to be accepted.
struct Incoming {
    peer: MemoryPeer,
    accepted: oneshot::Sender<()>,
}

/// Connects to a [`MemoryListener`].
#[derive(Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<Incoming>,
    config: MemoryConfig,
}

impl Connector for MemoryConnector {
    fn connect(&self, options: &TransportOptions, events: Arc<dyn TransportEvents>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| RpcError::TransportSetup("no tokio runtime".to_string()))?;

        let capacity = self.config.channel_capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
        let (from_peer_tx, from_peer_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        let (accepted_tx, accepted_rx) = oneshot::channel();

        let peer = MemoryPeer {
            host: options.host.clone(),
            port: options.port,
            rx: to_peer_rx,
            tx: from_peer_tx,
        };
        let transport = Arc::new(MemoryTransport {
            tx: outbound_tx,
            close_tx: Mutex::new(Some(close_tx)),
        });

        let accept_tx = self.accept_tx.clone();
        let connect_timeout = options.socket.connect_timeout;
        let target = format!("{}:{}", options.host, options.port);

        runtime.spawn(async move {
            let incoming = Incoming {
                peer,
                accepted: accepted_tx,
            };
            if accept_tx.send(incoming).is_err() {
                events.on_setup(Err(RpcError::TransportSetup(format!(
                    "connection refused by {}",
                    target
                ))));
                return;
            }

            match tokio::time::timeout(connect_timeout, accepted_rx).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    events.on_setup(Err(RpcError::TransportSetup(format!(
                        "connection refused by {}",
                        target
                    ))));
                    return;
                }
                Err(_) => {
                    events.on_setup(Err(RpcError::TransportSetup(format!(
                        "connect to {} timed out",
                        target
                    ))));
                    return;
                }
            }

            tracing::debug!("In-memory connection to {} established", target);
            event_loop(events, transport, outbound_rx, close_rx, from_peer_rx, to_peer_tx).await;
        });

        Ok(())
    }
}

/// Accepts connections made through a [`MemoryConnector`].
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<Incoming>,
}

impl MemoryListener {
    /// Accept the next connection.
    ///
    /// Connections whose connect timeout already expired are skipped.
    /// Returns `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        while let Some(incoming) = self.accept_rx.recv().await {
            if incoming.accepted.send(()).is_ok() {
                return Some(incoming.peer);
            }
        }
        None
    }
}

/// Messages from the peer to the event loop.
enum PeerEvent {
    Frame(Frame),
    Shutdown(Result<()>),
}

/// Server side of an in-memory connection.
pub struct MemoryPeer {
    host: String,
    port: u16,
    rx: mpsc::UnboundedReceiver<Frame>,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl MemoryPeer {
    /// Host the client asked for.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port the client asked for.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Receive the next frame sent by the client.
    ///
    /// Returns `None` once the connection has shut down.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Deliver a frame to the client.
    pub fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(PeerEvent::Frame(frame))
            .map_err(|_| RpcError::ConnectionClosed)
    }

    /// Shut the connection down from the server side.
    pub fn shutdown(self, reason: Result<()>) {
        let _ = self.tx.send(PeerEvent::Shutdown(reason));
    }
}

/// A send waiting for the event loop.
struct Outbound {
    frame: Frame,
    completion: PendingSend,
}

/// Client-side handle given to the connection.
struct MemoryTransport {
    tx: mpsc::Sender<Outbound>,
    close_tx: Mutex<Option<oneshot::Sender<Result<()>>>>,
}

impl Transport for MemoryTransport {
    fn send_message(&self, message: OutboundMessage<'_>, completion: PendingSend) {
        let outbound = Outbound {
            frame: Frame::from_outbound(&message),
            completion,
        };

        if let Err(e) = self.tx.try_send(outbound) {
            match e {
                mpsc::error::TrySendError::Full(o) => o.completion.complete(Err(RpcError::QueueFull)),
                mpsc::error::TrySendError::Closed(o) => {
                    o.completion.complete(Err(RpcError::ConnectionClosed))
                }
            }
        }
    }

    fn close(&self, reason: Result<()>) {
        if let Some(close_tx) = self.close_tx.lock().take() {
            let _ = close_tx.send(reason);
        }
    }
}

/// Per-connection event loop.
///
/// Queued sends are delivered before a pending close is honored, so a send
/// submitted before `close` still reaches the peer.
async fn event_loop(
    events: Arc<dyn TransportEvents>,
    transport: Arc<MemoryTransport>,
    mut outbound: mpsc::Receiver<Outbound>,
    mut close_rx: oneshot::Receiver<Result<()>>,
    mut from_peer: mpsc::UnboundedReceiver<PeerEvent>,
    to_peer: mpsc::UnboundedSender<Frame>,
) {
    let handle: Arc<dyn Transport> = transport.clone();
    events.on_setup(Ok(handle));

    let reason = loop {
        tokio::select! {
            biased;

            Some(first) = outbound.recv() => {
                let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
                batch.push(first);
                while batch.len() < MAX_BATCH_SIZE {
                    match outbound.try_recv() {
                        Ok(next) => batch.push(next),
                        Err(_) => break,
                    }
                }
                deliver_batch(&to_peer, batch);
            }

            reason = &mut close_rx => break reason.unwrap_or(Ok(())),

            event = from_peer.recv() => match event {
                Some(PeerEvent::Frame(frame)) => frame.with_inbound(|m| events.on_message(m)),
                Some(PeerEvent::Shutdown(reason)) => break reason,
                None => break Err(RpcError::ConnectionClosed),
            },
        }
    };

    // Sends that raced the shutdown still complete, with an error.
    outbound.close();
    while let Ok(leftover) = outbound.try_recv() {
        leftover.completion.complete(Err(RpcError::ConnectionClosed));
    }
    drop(to_peer);
    drop(transport);

    tracing::debug!("In-memory connection shut down: {:?}", reason);
    events.on_shutdown(reason);
}

fn deliver_batch(to_peer: &mpsc::UnboundedSender<Frame>, batch: Vec<Outbound>) {
    for Outbound { frame, completion } in batch {
        let result = to_peer
            .send(frame)
            .map_err(|_| RpcError::ConnectionClosed);
        completion.complete(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Header, InboundMessage, MessageType};
    use crate::transport::SocketOptions;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedSender;

    enum Event {
        Setup(Result<Arc<dyn Transport>>),
        Message(Frame),
        Shutdown(Result<()>),
    }

    struct ChannelEvents(UnboundedSender<Event>);

    impl TransportEvents for ChannelEvents {
        fn on_setup(&self, result: Result<Arc<dyn Transport>>) {
            let _ = self.0.send(Event::Setup(result));
        }

        fn on_message(&self, message: &InboundMessage<'_>) {
            let frame = Frame {
                message_type: message.message_type,
                flags: message.flags,
                headers: message.decode_headers(),
                payload: message.payload.cloned(),
            };
            let _ = self.0.send(Event::Message(frame));
        }

        fn on_shutdown(&self, reason: Result<()>) {
            let _ = self.0.send(Event::Shutdown(reason));
        }
    }

    fn options(timeout: Duration) -> TransportOptions {
        TransportOptions {
            host: "127.0.0.1".to_string(),
            port: 8033,
            socket: SocketOptions {
                connect_timeout: timeout,
                ..SocketOptions::default()
            },
            tls: None,
        }
    }

    fn connect(
        connector: &MemoryConnector,
        timeout: Duration,
    ) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        connector
            .connect(&options(timeout), Arc::new(ChannelEvents(tx)))
            .unwrap();
        rx
    }

    async fn setup(events: &mut mpsc::UnboundedReceiver<Event>) -> Arc<dyn Transport> {
        match events.recv().await {
            Some(Event::Setup(Ok(transport))) => transport,
            _ => panic!("expected successful setup"),
        }
    }

    fn send(transport: &Arc<dyn Transport>, frame: &Frame, completion: PendingSend) {
        let handles: Vec<_> = frame.headers.iter().map(Header::as_wire).collect();
        transport.send_message(
            OutboundMessage {
                message_type: frame.message_type,
                flags: frame.flags,
                headers: &handles,
                payload: frame.payload.as_ref(),
            },
            completion,
        );
    }

    #[test]
    fn test_connect_without_runtime_rejected() {
        let (connector, _listener) = listener(MemoryConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = connector.connect(
            &options(Duration::from_secs(1)),
            Arc::new(ChannelEvents(tx)),
        );
        assert!(matches!(result, Err(RpcError::TransportSetup(_))));
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut listener) = listener(MemoryConfig::default());
        let mut events = connect(&connector, Duration::from_secs(1));
        let mut peer = listener.accept().await.unwrap();
        assert_eq!(peer.host(), "127.0.0.1");
        assert_eq!(peer.port(), 8033);

        let transport = setup(&mut events).await;

        let (flushed_tx, flushed_rx) = oneshot::channel();
        let ping = Frame::new(MessageType::Ping, 0).header(Header::new("k", "v"));
        send(
            &transport,
            &ping,
            PendingSend::new(MessageType::Ping, move |r| {
                let _ = flushed_tx.send(r);
            }),
        );

        let received = peer.recv().await.unwrap();
        assert_eq!(received.message_type, MessageType::Ping);
        assert_eq!(received.find_header("k").and_then(Header::as_str), Some("v"));
        assert_eq!(flushed_rx.await.unwrap(), Ok(()));

        peer.send(Frame::new(MessageType::PingResponse, 0)).unwrap();
        match events.recv().await {
            Some(Event::Message(frame)) => assert_eq!(frame.message_type, MessageType::PingResponse),
            _ => panic!("expected message"),
        }
    }

    #[tokio::test]
    async fn test_close_reports_reason_and_ends_peer() {
        let (connector, mut listener) = listener(MemoryConfig::default());
        let mut events = connect(&connector, Duration::from_secs(1));
        let mut peer = listener.accept().await.unwrap();
        let transport = setup(&mut events).await;

        transport.close(Err(RpcError::ConnectionClosed));
        transport.close(Ok(()));

        match events.recv().await {
            Some(Event::Shutdown(reason)) => assert_eq!(reason, Err(RpcError::ConnectionClosed)),
            _ => panic!("expected shutdown"),
        }
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let (connector, mut listener) = listener(MemoryConfig::default());
        let mut events = connect(&connector, Duration::from_secs(1));
        let _peer = listener.accept().await.unwrap();
        let transport = setup(&mut events).await;

        transport.close(Ok(()));
        assert!(matches!(events.recv().await, Some(Event::Shutdown(Ok(())))));

        let (tx, rx) = oneshot::channel();
        send(
            &transport,
            &Frame::new(MessageType::Ping, 0),
            PendingSend::new(MessageType::Ping, move |r| {
                let _ = tx.send(r);
            }),
        );
        assert_eq!(rx.await.unwrap(), Err(RpcError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_peer_shutdown_reason_forwarded() {
        let (connector, mut listener) = listener(MemoryConfig::default());
        let mut events = connect(&connector, Duration::from_secs(1));
        let peer = listener.accept().await.unwrap();
        let _transport = setup(&mut events).await;

        peer.shutdown(Err(RpcError::ProtocolError));
        match events.recv().await {
            Some(Event::Shutdown(reason)) => assert_eq!(reason, Err(RpcError::ProtocolError)),
            _ => panic!("expected shutdown"),
        }
    }

    #[tokio::test]
    async fn test_dropped_listener_fails_setup() {
        let (connector, listener) = listener(MemoryConfig::default());
        drop(listener);
        let mut events = connect(&connector, Duration::from_secs(1));
        assert!(matches!(
            events.recv().await,
            Some(Event::Setup(Err(RpcError::TransportSetup(_))))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unaccepted_connection_times_out() {
        let (connector, mut listener) = listener(MemoryConfig::default());
        let started = tokio::time::Instant::now();
        let mut events = connect(&connector, crate::transport::DEFAULT_CONNECT_TIMEOUT);

        assert!(matches!(
            events.recv().await,
            Some(Event::Setup(Err(RpcError::TransportSetup(_))))
        ));
        assert!(started.elapsed() >= crate::transport::DEFAULT_CONNECT_TIMEOUT);

        // The expired connection is not handed out afterwards.
        drop(connector);
        assert!(listener.accept().await.is_none());
    }

    #[tokio::test]
    async fn test_full_queue_rejects_synchronously() {
        let (connector, mut listener) = listener(MemoryConfig { channel_capacity: 1 });
        let mut events = connect(&connector, Duration::from_secs(1));
        let _peer = listener.accept().await.unwrap();
        let transport = setup(&mut events).await;

        // No await between sends, so the loop cannot drain the queue.
        let results = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..3 {
            let results = results.clone();
            send(
                &transport,
                &Frame::new(MessageType::Ping, 0),
                PendingSend::new(MessageType::Ping, move |r| results.lock().push(r)),
            );
        }

        let rejected = results
            .lock()
            .iter()
            .filter(|r| **r == Err(RpcError::QueueFull))
            .count();
        assert_eq!(rejected, 2);
    }
}
