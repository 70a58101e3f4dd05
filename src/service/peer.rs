// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, trace, warn};

use crate::network::{Connection, MessageFrame};
use crate::AppResult;

use super::config::NetworkConfig;

/// Upper bound for draining queued frames when a connection is closed.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// The single active peer: the read side is polled by the owning task, the
/// write side belongs to a writer task fed through `frame_tx`.
#[derive(Debug)]
pub(crate) struct PeerConnection {
    peer_addr: SocketAddr,
    connection: Connection,
    frame_tx: mpsc::UnboundedSender<Bytes>,
    writer: JoinHandle<()>,
}

impl PeerConnection {
    /// Must be called from within the manager's runtime.
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, config: &NetworkConfig) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("failed to set TCP_NODELAY for {}: {}", peer_addr, e);
        }
        let (reader, writer) = stream.into_split();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_frames(BufWriter::new(writer), frame_rx, peer_addr));
        PeerConnection {
            peer_addr,
            connection: Connection::new(
                reader,
                config.conn_read_buffer_size,
                config.max_frame_size,
            ),
            frame_tx,
            writer,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Queues a frame for writing. Failures are only logged.
    pub fn send(&self, frame: Bytes) {
        if let Err(e) = self.frame_tx.send(frame) {
            warn!(
                "writer for {} has exited, dropping {} bytes",
                self.peer_addr,
                e.0.len()
            );
        }
    }

    pub async fn read_frame(&mut self) -> AppResult<Option<MessageFrame>> {
        self.connection.read_frame().await
    }

    /// Flushes queued frames, shuts down the write direction and releases the
    /// socket. Errors are ignored.
    pub async fn close(self) {
        let PeerConnection {
            peer_addr,
            connection,
            frame_tx,
            mut writer,
        } = self;
        drop(frame_tx);
        if time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
            debug!("writer for {} did not finish in time, aborting", peer_addr);
            writer.abort();
        }
        drop(connection);
        debug!("connection to {} closed", peer_addr);
    }
}

async fn write_frames(
    mut writer: BufWriter<OwnedWriteHalf>,
    mut frame_rx: mpsc::UnboundedReceiver<Bytes>,
    peer_addr: SocketAddr,
) {
    while let Some(frame) = frame_rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!("write to {} failed: {}", peer_addr, e);
            break;
        }
        if let Err(e) = writer.flush().await {
            warn!("flush to {} failed: {}", peer_addr, e);
            break;
        }
        trace!("wrote {} bytes to {}", frame.len(), peer_addr);
    }
    let _ = writer.shutdown().await;
}
