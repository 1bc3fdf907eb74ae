//! The real-time event channel: one Socket.IO connection per logged-in session.

mod event;
pub mod packet;

use futures::{SinkExt, StreamExt};
use parley_common::Identity;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::Message as Frame;
use url::Url;

pub use event::{InboundEvent, OutboundEvent, ReadReceipt};
use packet::{Packet, SocketPacket};

use crate::error::{ClientError, Result};

/// Handle to an open (or opening) connection. Emits are queued and never block; the
/// connection's tasks are aborted when the handle is dropped.
#[derive(Debug)]
pub struct EventChannel {
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl EventChannel {
    pub fn new(outbound: mpsc::UnboundedSender<OutboundEvent>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { outbound, tasks }
    }

    /// Fire-and-forget; a closed connection drops the event.
    pub fn emit(&self, event: OutboundEvent) {
        let name = event.name();
        if self.outbound.send(event).is_err() {
            tracing::debug!(name, "event channel closed, dropping emit");
        }
    }

    /// Ties another task's lifetime to this channel.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Opens event channels for an identity. Inbound events are delivered on `inbound` until the
/// returned channel is dropped or the connection ends.
pub trait EventConnector: Send + Sync {
    fn open(&self, identity: &Identity, inbound: mpsc::UnboundedSender<InboundEvent>)
        -> EventChannel;
}

/// Connects to a Socket.IO v4 server over the websocket transport.
#[derive(Clone, Debug)]
pub struct SocketIoConnector {
    origin: Url,
}

impl SocketIoConnector {
    pub fn new(origin: Url) -> Self {
        Self { origin }
    }

    pub fn endpoint(&self) -> Result<Url> {
        let mut url = self.origin.join("socket.io/")?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::Protocol(format!("cannot use {scheme} for {url}")))?;
        url.query_pairs_mut()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");
        Ok(url)
    }
}

impl EventConnector for SocketIoConnector {
    fn open(
        &self,
        identity: &Identity,
        inbound: mpsc::UnboundedSender<InboundEvent>,
    ) -> EventChannel {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        // queued ahead of everything else, flushed once the namespace connect is acknowledged
        let _ = outbound.send(OutboundEvent::Setup(identity.user.clone()));
        let endpoint = self.endpoint();
        let task = tokio::spawn(async move {
            let result = match endpoint {
                Ok(endpoint) => run_connection(endpoint, outbound_rx, inbound).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => tracing::info!("event channel closed"),
                Err(err) => tracing::warn!("event channel failed: {err}"),
            }
        });
        EventChannel::new(outbound, vec![task])
    }
}

async fn run_connection(
    endpoint: Url,
    mut outbound: mpsc::UnboundedReceiver<OutboundEvent>,
    inbound: mpsc::UnboundedSender<InboundEvent>,
) -> Result<()> {
    let (mut socket, _) = tokio_tungstenite::connect_async(endpoint.as_str()).await?;
    tracing::info!(%endpoint, "event channel connected");

    match socket.next().await {
        Some(Ok(Frame::Text(frame))) => match Packet::decode(&frame)? {
            Packet::Open(handshake) => tracing::debug!(sid = %handshake.sid, "engine.io open"),
            other => return Err(ClientError::Protocol(format!("expected open, got {other:?}"))),
        },
        Some(Ok(other)) => return Err(ClientError::Protocol(format!("expected open, got {other:?}"))),
        Some(Err(err)) => return Err(err.into()),
        None => return Ok(()),
    }
    let connect = Packet::Message(SocketPacket::Connect(None)).encode()?;
    socket.send(Frame::Text(connect)).await?;
    // the server drops events that arrive before it acknowledges the namespace connect
    let mut connected = false;

    loop {
        tokio::select! {
            frame = socket.next() => {
                let frame = match frame {
                    Some(frame) => frame?,
                    None => return Ok(()),
                };
                let text = match frame {
                    Frame::Text(text) => text,
                    Frame::Close(_) => return Ok(()),
                    _ => continue,
                };
                let packet = match Packet::decode(&text) {
                    Ok(packet) => packet,
                    Err(err) => {
                        tracing::warn!("dropping frame: {err}");
                        continue;
                    }
                };
                match packet {
                    Packet::Ping => socket.send(Frame::Text(Packet::Pong.encode()?)).await?,
                    Packet::Message(SocketPacket::Connect(_)) => {
                        tracing::debug!("namespace connected");
                        connected = true;
                    }
                    Packet::Close | Packet::Message(SocketPacket::Disconnect) => return Ok(()),
                    Packet::Message(SocketPacket::ConnectError(reason)) => {
                        return Err(ClientError::Protocol(format!("connect refused: {reason:?}")));
                    }
                    Packet::Message(SocketPacket::Event { name, payload }) => {
                        match InboundEvent::decode(&name, payload) {
                            Ok(Some(event)) => {
                                if inbound.send(event).is_err() {
                                    return Ok(());
                                }
                            }
                            Ok(None) => tracing::debug!(name, "ignoring event"),
                            Err(err) => tracing::warn!(name, "malformed event payload: {err}"),
                        }
                    }
                    other => tracing::trace!(?other, "engine.io packet"),
                }
            }
            event = outbound.recv(), if connected => {
                let Some(event) = event else {
                    return Ok(());
                };
                let frame = Packet::event(event.name(), event.payload()?).encode()?;
                tracing::trace!(name = event.name(), "emit");
                socket.send(Frame::Text(frame)).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn endpoint_uses_websocket_scheme() {
        let connector = SocketIoConnector::new(Url::parse("https://chat.example.com").unwrap());
        assert_eq!(
            connector.endpoint().unwrap().as_str(),
            "wss://chat.example.com/socket.io/?EIO=4&transport=websocket"
        );
        let connector = SocketIoConnector::new(Url::parse("http://localhost:5000").unwrap());
        assert_eq!(
            connector.endpoint().unwrap().as_str(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
    }

    struct Server {
        socket: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    }

    impl Server {
        /// Accepts the client and completes the engine.io handshake, leaving the namespace
        /// connect unanswered.
        async fn accept(listener: &tokio::net::TcpListener) -> Self {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            let open = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
            socket.send(Frame::Text(open.into())).await.unwrap();
            let mut server = Self { socket };
            assert_eq!(server.recv().await, "40");
            server
        }

        async fn send(&mut self, text: &str) {
            self.socket.send(Frame::Text(text.into())).await.unwrap();
        }

        async fn recv(&mut self) -> String {
            match self.socket.next().await {
                Some(Ok(Frame::Text(text))) => text.to_string(),
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    }

    async fn listen() -> (tokio::net::TcpListener, SocketIoConnector) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        (listener, SocketIoConnector::new(origin))
    }

    fn identity() -> Identity {
        Identity {
            user: parley_common::User {
                identifier: "u1".into(),
                display_name: "A".into(),
                email: None,
                avatar: None,
            },
            token: "t".into(),
        }
    }

    #[tokio::test]
    async fn events_wait_for_the_connect_ack() {
        let (listener, connector) = listen().await;
        let (inbound, mut events) = mpsc::unbounded_channel();
        let channel = connector.open(&identity(), inbound);
        let mut server = Server::accept(&listener).await;

        channel.emit(OutboundEvent::JoinChat("c1".into()));
        let early = tokio::time::timeout(Duration::from_millis(300), server.socket.next()).await;
        assert!(early.is_err(), "client sent {early:?} before the connect ack");

        server.send(r#"40{"sid":"n1"}"#).await;
        assert_eq!(server.recv().await, r#"42["setup",{"_id":"u1","name":"A"}]"#);
        assert_eq!(server.recv().await, r#"42["join chat","c1"]"#);

        server.send("2").await;
        assert_eq!(server.recv().await, "3");
        server.send(r#"42["connected"]"#).await;
        assert_eq!(events.recv().await, Some(InboundEvent::Connected));
    }

    #[tokio::test]
    async fn refused_connect_ends_the_channel() {
        let (listener, connector) = listen().await;
        let (inbound, mut events) = mpsc::unbounded_channel();
        let _channel = connector.open(&identity(), inbound);
        let mut server = Server::accept(&listener).await;

        server.send(r#"44{"message":"Not authorized"}"#).await;
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn dropping_the_channel_aborts_its_tasks() {
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
        let (guard, released) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        let channel = EventChannel::new(outbound, vec![task]);
        channel.emit(OutboundEvent::JoinChat("c1".into()));
        assert_eq!(
            outbound_rx.recv().await,
            Some(OutboundEvent::JoinChat("c1".into()))
        );
        drop(channel);
        assert!(released.await.is_err());
        assert_eq!(outbound_rx.recv().await, None);
    }
}
