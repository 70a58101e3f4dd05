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

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::runtime::{self, Runtime};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Duration};
use tracing::{debug, error, info, trace, warn};

use crate::message::{Message, MessageKind};
use crate::network::{MessageCodec, MessageFrame};
use crate::{AppError, AppResult};

use super::config::{NetworkConfig, Role};
use super::handler::PeerHandler;
use super::peer::PeerConnection;
use super::Shutdown;

const LISTEN_BACKLOG: u32 = 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Owns one chat connection and the background thread that drives it.
///
/// A manager is either a listener, which accepts one peer at a time and keeps
/// accepting after that peer leaves, or a connector, which dials a listener
/// once. Both expose the same surface: [`send`](Self::send) plus the
/// [`PeerHandler`] notifications. Dropping the manager stops the background
/// thread and closes the socket; no notification is delivered once the drop
/// has started.
#[derive(Debug)]
pub struct ConnectionManager {
    role: Role,
    local_addr: Option<SocketAddr>,
    command_tx: mpsc::UnboundedSender<Message>,
    notify_shutdown: broadcast::Sender<()>,
    closing: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    runner: Option<thread::JoinHandle<()>>,
}

impl ConnectionManager {
    /// Binds `0.0.0.0:port` and starts accepting peers. Port 0 picks a free
    /// port, see [`local_addr`](Self::local_addr).
    pub fn listen<H: PeerHandler>(port: u16, handler: H) -> AppResult<Self> {
        Self::listen_with_config(port, handler, NetworkConfig::default())
    }

    pub fn listen_with_config<H: PeerHandler>(
        port: u16,
        handler: H,
        config: NetworkConfig,
    ) -> AppResult<Self> {
        let rt = build_runtime()?;
        let bound = {
            let _guard = rt.enter();
            bind_listener(port)
        };
        let listener = match bound {
            Ok(listener) => listener,
            Err(e) => {
                rt.shutdown_background();
                error!("failed to bind listener on port {}: {}", port, e);
                return Err(e.into());
            }
        };
        let local_addr = listener.local_addr()?;
        info!("tcp listener binding to {} for accepting a peer", local_addr);

        let (state, channels) = PeerLoop::new(Box::new(handler), config);
        let task = ListenerTask { listener, state };
        Self::start(Role::Listener, Some(local_addr), rt, channels, task)
    }

    /// Starts dialing `address:port`. The attempt runs in the background;
    /// success is reported through `on_connect`, failure through
    /// `on_connect_failed`.
    pub fn connect<H: PeerHandler>(
        port: u16,
        address: impl Into<String>,
        handler: H,
    ) -> AppResult<Self> {
        Self::connect_with_config(port, address, handler, NetworkConfig::default())
    }

    pub fn connect_with_config<H: PeerHandler>(
        port: u16,
        address: impl Into<String>,
        handler: H,
        config: NetworkConfig,
    ) -> AppResult<Self> {
        let rt = build_runtime()?;
        let address = address.into();
        info!("connecting to {}:{}", address, port);

        let (state, channels) = PeerLoop::new(Box::new(handler), config);
        let task = ConnectorTask {
            address,
            port,
            state,
        };
        Self::start(Role::Connector, None, rt, channels, task)
    }

    fn start<T: RoleTask>(
        role: Role,
        local_addr: Option<SocketAddr>,
        rt: Runtime,
        channels: LoopChannels,
        task: T,
    ) -> AppResult<Self> {
        let LoopChannels {
            command_tx,
            notify_shutdown,
            closing,
            connected,
        } = channels;
        let runner = thread::Builder::new()
            .name(format!("duochat-{}", role))
            .spawn(move || {
                rt.block_on(task.run());
                debug!("{} background loop exited", role);
            })?;

        Ok(ConnectionManager {
            role,
            local_addr,
            command_tx,
            notify_shutdown,
            closing,
            connected,
            runner: Some(runner),
        })
    }

    /// Encodes `message` and writes it to the current peer. Fire and forget:
    /// nothing is reported back, and the message is dropped if no peer is
    /// connected.
    pub fn send(&self, message: Message) {
        if let Err(e) = self.command_tx.send(message) {
            warn!(
                "{} background loop has exited, dropping message {:#018x}",
                self.role,
                e.0.identifier()
            );
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Bound address of a listener; `None` for a connector.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::Release);
        let _ = self.notify_shutdown.send(());
        if let Some(runner) = self.runner.take() {
            if runner.thread().id() == thread::current().id() {
                // dropped from inside a handler; the loop exits on its own
                warn!("{} manager dropped on its own background thread", self.role);
                return;
            }
            if runner.join().is_err() {
                error!("{} background thread panicked", self.role);
            }
        }
        info!("{} connection manager closed", self.role);
    }
}

fn build_runtime() -> AppResult<Runtime> {
    Ok(runtime::Builder::new_current_thread().enable_all().build()?)
}

/// Must be called with the manager's runtime entered.
fn bind_listener(port: u16) -> io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// The role-specific event loop run on the background thread.
trait RoleTask: Send + 'static {
    fn run(self) -> impl Future<Output = ()>;
}

/// Handles kept by the manager to talk to its background loop.
struct LoopChannels {
    command_tx: mpsc::UnboundedSender<Message>,
    notify_shutdown: broadcast::Sender<()>,
    closing: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

/// What woke the loop up: a role specific completion (accept or connect) or
/// one of the events both roles share.
enum Event<R> {
    Role(R),
    Loop(LoopEvent),
}

enum LoopEvent {
    Shutdown,
    Frame(AppResult<Option<MessageFrame>>),
    Outbound(Option<Message>),
}

/// State shared by both roles: the peer slot, the handler and the inbound
/// command queue. Only touched from the background thread.
struct PeerLoop {
    handler: Box<dyn PeerHandler>,
    config: NetworkConfig,
    peer: Option<PeerConnection>,
    command_rx: mpsc::UnboundedReceiver<Message>,
    shutdown: Shutdown,
    connected: Arc<AtomicBool>,
}

impl PeerLoop {
    fn new(handler: Box<dyn PeerHandler>, config: NetworkConfig) -> (Self, LoopChannels) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (notify_shutdown, _) = broadcast::channel(1);
        let closing = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));
        let state = PeerLoop {
            handler,
            config,
            peer: None,
            command_rx,
            shutdown: Shutdown::new(notify_shutdown.subscribe(), closing.clone()),
            connected: connected.clone(),
        };
        let channels = LoopChannels {
            command_tx,
            notify_shutdown,
            closing,
            connected,
        };
        (state, channels)
    }

    /// Runs `f` against the handler unless teardown has begun.
    fn notify<F: FnOnce(&mut dyn PeerHandler)>(&mut self, f: F) {
        if self.shutdown.is_shutdown() {
            return;
        }
        f(self.handler.as_mut());
    }

    async fn attach(&mut self, stream: TcpStream, peer_addr: SocketAddr) {
        if let Some(previous) = self.peer.take() {
            warn!(
                "peer {} replaces active peer {}",
                peer_addr,
                previous.peer_addr()
            );
            previous.close().await;
        }
        info!("established a connection with {}", peer_addr);
        self.peer = Some(PeerConnection::new(stream, peer_addr, &self.config));
        self.connected.store(true, Ordering::Release);
        self.notify(|handler| handler.on_connect(peer_addr));
    }

    async fn lose_peer(&mut self) {
        if let Some(peer) = self.peer.take() {
            info!("peer {} disconnected", peer.peer_addr());
            peer.close().await;
        }
        self.connected.store(false, Ordering::Release);
        self.notify(|handler| handler.on_disconnect());
    }

    fn send(&self, message: &Message) {
        match &self.peer {
            Some(peer) => {
                let frame = MessageCodec::encode(message);
                trace!(
                    "sending {:?} {:#018x} ({} bytes) to {}",
                    message.kind(),
                    message.identifier(),
                    frame.len(),
                    peer.peer_addr()
                );
                peer.send(frame);
            }
            None => debug!(
                "no connected peer, dropping message {:#018x}",
                message.identifier()
            ),
        }
    }

    fn dispatch(&mut self, frame: MessageFrame) {
        let message = match frame.into_message() {
            Ok(message) => message,
            Err(e) => {
                warn!("dropping undecodable frame: {}", e);
                return;
            }
        };
        debug!(
            "received {:?} {:#018x}",
            message.kind(),
            message.identifier()
        );
        self.notify(|handler| handler.on_receive(&message));
        if message.kind() == MessageKind::New && !self.shutdown.is_shutdown() {
            self.send(&message.acknowledge());
        }
    }

    /// Handles the events common to both roles. Returns `false` once the loop
    /// should stop.
    async fn handle(&mut self, event: LoopEvent) -> bool {
        match event {
            LoopEvent::Shutdown | LoopEvent::Outbound(None) => {
                debug!("shutdown requested, closing connection");
                if let Some(peer) = self.peer.take() {
                    peer.close().await;
                }
                self.connected.store(false, Ordering::Release);
                return false;
            }
            LoopEvent::Outbound(Some(message)) => self.send(&message),
            LoopEvent::Frame(Ok(Some(frame))) => self.dispatch(frame),
            LoopEvent::Frame(Ok(None)) => self.lose_peer().await,
            LoopEvent::Frame(Err(e)) => {
                if e.is_peer_loss() {
                    debug!("read ended with peer loss: {}", e);
                } else {
                    warn!("read failed, dropping peer: {}", e);
                }
                self.lose_peer().await;
            }
        }
        true
    }
}

/// Reads from the peer slot; pending forever while the slot is empty.
async fn read_peer(peer: &mut Option<PeerConnection>) -> AppResult<Option<MessageFrame>> {
    match peer {
        Some(peer) => peer.read_frame().await,
        None => std::future::pending().await,
    }
}

struct ListenerTask {
    listener: TcpListener,
    state: PeerLoop,
}

impl RoleTask for ListenerTask {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.state.shutdown.recv() => Event::Loop(LoopEvent::Shutdown),
                accepted = self.listener.accept() => Event::Role(accepted),
                frame = read_peer(&mut self.state.peer) => Event::Loop(LoopEvent::Frame(frame)),
                message = self.state.command_rx.recv() => Event::Loop(LoopEvent::Outbound(message)),
            };

            match event {
                Event::Role(Ok((stream, peer_addr))) => {
                    self.state.attach(stream, peer_addr).await;
                }
                Event::Role(Err(e)) => {
                    error!("accept failed: {}", e);
                    time::sleep(ACCEPT_BACKOFF).await;
                }
                Event::Loop(event) => {
                    if !self.state.handle(event).await {
                        break;
                    }
                }
            }
        }
    }
}

struct ConnectorTask {
    address: String,
    port: u16,
    state: PeerLoop,
}

impl RoleTask for ConnectorTask {
    async fn run(mut self) {
        let connect = TcpStream::connect((self.address.clone(), self.port));
        tokio::pin!(connect);
        let mut connecting = true;

        loop {
            let event = tokio::select! {
                biased;
                _ = self.state.shutdown.recv() => Event::Loop(LoopEvent::Shutdown),
                connected = &mut connect, if connecting => Event::Role(connected),
                frame = read_peer(&mut self.state.peer) => Event::Loop(LoopEvent::Frame(frame)),
                message = self.state.command_rx.recv() => Event::Loop(LoopEvent::Outbound(message)),
            };

            match event {
                Event::Role(result) => {
                    connecting = false;
                    match result.and_then(|stream| stream.peer_addr().map(|addr| (stream, addr))) {
                        Ok((stream, peer_addr)) => self.state.attach(stream, peer_addr).await,
                        Err(e) => {
                            error!(
                                "failed to connect to {}:{}: {}",
                                self.address, self.port, e
                            );
                            let error = AppError::from(e);
                            self.state
                                .notify(|handler| handler.on_connect_failed(&error));
                        }
                    }
                }
                Event::Loop(event) => {
                    if !self.state.handle(event).await {
                        break;
                    }
                }
            }
        }
    }
}
