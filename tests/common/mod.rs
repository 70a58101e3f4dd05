#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use duochat::network::{Connection, MessageCodec};
use duochat::{setup_local_tracing, AppError, Message, PeerHandler};
use rstest::fixture;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

#[fixture]
#[once]
pub fn setup() {
    setup_local_tracing().expect("failed to setup tracing");
}

#[derive(Debug)]
pub enum PeerEvent {
    Received(Message),
    Connected(SocketAddr),
    Disconnected,
    ConnectFailed(String),
}

/// Forwards every notification into a channel the test can await on.
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelHandler { tx }, rx)
    }
}

impl PeerHandler for ChannelHandler {
    fn on_receive(&mut self, message: &Message) {
        let _ = self.tx.send(PeerEvent::Received(message.clone()));
    }

    fn on_connect(&mut self, peer: SocketAddr) {
        let _ = self.tx.send(PeerEvent::Connected(peer));
    }

    fn on_disconnect(&mut self) {
        let _ = self.tx.send(PeerEvent::Disconnected);
    }

    fn on_connect_failed(&mut self, error: &AppError) {
        let _ = self.tx.send(PeerEvent::ConnectFailed(error.to_string()));
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<PeerEvent>) -> PeerEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a peer event")
        .expect("handler dropped")
}

/// A bare TCP client standing in for the remote peer.
pub struct RawPeer {
    pub connection: Connection<OwnedReadHalf>,
    pub writer: OwnedWriteHalf,
}

impl RawPeer {
    pub async fn connect(port: u16) -> RawPeer {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect to listener");
        let (reader, writer) = stream.into_split();
        RawPeer {
            connection: Connection::new(reader, 1024, 64 * 1024),
            writer,
        }
    }

    pub async fn send(&mut self, message: &Message) {
        self.writer
            .write_all(&MessageCodec::encode(message))
            .await
            .expect("write frame");
    }

    pub async fn receive(&mut self) -> Message {
        timeout(WAIT, self.connection.read_frame())
            .await
            .expect("timed out waiting for a frame")
            .expect("read frame")
            .expect("stream closed")
            .into_message()
            .expect("decode frame")
    }
}
