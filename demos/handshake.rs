//! Handshake - connect, ping and close over the in-memory transport.
//!
//! This example demonstrates:
//! - Building connection options with individual callbacks
//! - Adding a `client-name` header to CONNECT through the amender
//! - Scripting the server side with a `MemoryListener`
//! - Answering a server PING and closing cleanly
//!
//! # Running
//!
//! ```text
//! RUST_LOG=debug cargo run --example handshake
//! ```

use bytes::Bytes;
use eventstream_rpc::protocol::{Frame, Header, MessageAmendment, MessageType};
use eventstream_rpc::transport::memory::{self, MemoryConfig};
use eventstream_rpc::{connect, Connection, ConnectionOptions, ResourceScope};
use tokio::sync::mpsc;

enum Event {
    Connected(Connection),
    Ping(Vec<Header>, Option<Bytes>),
    Disconnected(eventstream_rpc::Result<()>),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (connector, mut listener) = memory::listener(MemoryConfig::default());

    // Server: accept names starting with "accepted.", then ping once.
    let server = tokio::spawn(async move {
        let mut peer = listener.accept().await?;
        let connect = peer.recv().await?;
        let accepted = connect
            .find_header("client-name")
            .and_then(Header::as_str)
            .is_some_and(|name| name.starts_with("accepted."));
        println!("server: CONNECT from {}:{}, accepted={}", peer.host(), peer.port(), accepted);

        peer.send(Frame::connect_ack(accepted)).ok()?;
        peer.send(Frame::new(MessageType::Ping, 0).payload(Bytes::from_static(b"are you there")))
            .ok()?;

        let reply = peer.recv().await?;
        println!("server: got {:?}", reply.message_type);

        // Drain until the client closes.
        while peer.recv().await.is_some() {}
        Some(())
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (on_connect, on_ping, on_disconnect) = (tx.clone(), tx.clone(), tx);

    let options = ConnectionOptions::builder()
        .connector(connector)
        .host("localhost")
        .connect_amender(|| {
            MessageAmendment::new().header(Header::new("client-name", "accepted.handshake"))
        })
        .on_connect(move |conn| {
            let _ = on_connect.send(Event::Connected(conn.clone()));
        })
        .on_ping(move |headers, payload| {
            let _ = on_ping.send(Event::Ping(headers, payload));
        })
        .on_disconnect(move |reason| {
            let _ = on_disconnect.send(Event::Disconnected(reason));
        })
        .build()?;

    let scope = ResourceScope::new();
    connect(options, &scope)?;

    let mut connection = None;
    while let Some(event) = rx.recv().await {
        match event {
            Event::Connected(conn) => {
                println!("client: connected as {}", conn.id());
                connection = Some(conn);
            }
            Event::Ping(headers, payload) => {
                println!("client: ping with {} headers", headers.len());
                if let Some(conn) = &connection {
                    conn.send_ping_response(&headers, payload, |result| {
                        println!("client: ping response flushed: {:?}", result);
                    });
                    conn.close();
                }
            }
            Event::Disconnected(reason) => {
                println!("client: disconnected: {:?}", reason);
                break;
            }
        }
    }

    server.await?;
    println!("live connections: {}", scope.live_count());
    Ok(())
}
