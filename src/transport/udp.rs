/// UDP host transport
///
/// Carries NowLink frames between hosts as UDP datagrams laid out as
/// `source address (6 bytes) ‖ frame`. The socket is non-blocking and
/// owned by a tokio runtime; `send` never waits, it either hands the
/// datagram to the kernel or reports `Busy`.
///
/// Routes are learned from inbound traffic: the first well-formed datagram
/// from a peer address pins that address to the socket it came from, and
/// later datagrams claiming the same address from elsewhere do not move
/// it. Only [`UdpTransport::add_route`] re-points a known peer. Broadcast
/// goes to every configured broadcast target (another host's socket, or
/// a subnet broadcast address once [`UdpTransport::enable_broadcast`] is
/// called).
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{ReceiveHandler, SendStatus, SendStatusHandler, Transport, TransportError};
use crate::contracts::{FrameType, PeerAddress};
use crate::errors::Result;
use crate::MAX_FRAME_SIZE;

/// Largest datagram this transport produces
pub const MAX_DATAGRAM_SIZE: usize = PeerAddress::LEN + MAX_FRAME_SIZE;

/// Routes learned for unregistered addresses stop here; peers in the
/// table can always be learned
pub const MAX_LEARNED_ROUTES: usize = 256;

type HandlerSlot = Arc<RwLock<Option<ReceiveHandler>>>;

/// Peer address to socket map
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<PeerAddress, SocketAddr>,
}

impl RouteTable {
    pub fn get(&self, peer: PeerAddress) -> Option<SocketAddr> {
        self.routes.get(&peer).copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Set or replace the route for `peer`
    pub fn pin(&mut self, peer: PeerAddress, endpoint: SocketAddr) {
        self.routes.insert(peer, endpoint);
    }

    /// Record where a datagram from `peer` came from
    ///
    /// Returns whether the table changed. A known route is never moved,
    /// and a new unregistered address is refused once the table is full.
    pub fn learn(&mut self, peer: PeerAddress, endpoint: SocketAddr, registered: bool) -> bool {
        match self.routes.get(&peer) {
            Some(known) if *known == endpoint => false,
            Some(known) => {
                warn!(%peer, %known, claimed = %endpoint, "datagram from unexpected endpoint; route kept");
                false
            }
            None if self.routes.len() >= MAX_LEARNED_ROUTES && !registered => {
                trace!(%peer, %endpoint, "route table full; route not learned");
                false
            }
            None => {
                self.routes.insert(peer, endpoint);
                true
            }
        }
    }
}

pub struct UdpTransport {
    local: PeerAddress,
    socket: Arc<UdpSocket>,
    runtime: Handle,
    routes: Arc<RwLock<RouteTable>>,
    broadcast_targets: RwLock<Vec<SocketAddr>>,
    peers: Arc<Mutex<HashSet<PeerAddress>>>,
    on_receive: HandlerSlot,
    on_send_status: RwLock<Option<SendStatusHandler>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpTransport {
    /// Bind a socket for the node with address `local`
    ///
    /// Must be called from within a tokio runtime; the receive loop is
    /// spawned on that runtime by `init`.
    pub async fn bind(bind_addr: SocketAddr, local: PeerAddress) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        // try_send_to reports WouldBlock until the reactor has seen the socket writable
        socket.writable().await?;
        debug!(%local, addr = %socket.local_addr()?, "UDP transport bound");
        Ok(Self {
            local,
            socket: Arc::new(socket),
            runtime: Handle::current(),
            routes: Arc::new(RwLock::new(RouteTable::default())),
            broadcast_targets: RwLock::new(Vec::new()),
            peers: Arc::new(Mutex::new(HashSet::new())),
            on_receive: Arc::new(RwLock::new(None)),
            on_send_status: RwLock::new(None),
            recv_task: Mutex::new(None),
        })
    }

    pub fn local_socket_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Allow sending to subnet broadcast addresses
    pub fn enable_broadcast(&self) -> io::Result<()> {
        self.socket.set_broadcast(true)
    }

    /// Add a destination for frames sent to [`PeerAddress::BROADCAST`]
    pub fn add_broadcast_target(&self, target: SocketAddr) {
        let mut targets = self.broadcast_targets.write();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    /// Pin `peer` to `endpoint` without waiting to hear from it
    pub fn add_route(&self, peer: PeerAddress, endpoint: SocketAddr) {
        self.routes.write().pin(peer, endpoint);
    }

    pub fn route(&self, peer: PeerAddress) -> Option<SocketAddr> {
        self.routes.read().get(peer)
    }

    /// Number of peer addresses with a known endpoint
    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    fn spawn_receiver(&self) -> JoinHandle<()> {
        let socket = self.socket.clone();
        let routes = self.routes.clone();
        let peers = self.peers.clone();
        let on_receive = self.on_receive.clone();
        let local = self.local;

        self.runtime.spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            loop {
                let (n, from) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) if is_transient(&e) => continue,
                    Err(e) => {
                        warn!(error = %e, "UDP receive loop stopped");
                        break;
                    }
                };
                if n < PeerAddress::LEN {
                    trace!(%from, len = n, "runt datagram ignored");
                    continue;
                }

                let mut mac = [0u8; PeerAddress::LEN];
                mac.copy_from_slice(&buf[..PeerAddress::LEN]);
                let source = PeerAddress::new(mac);
                if source == local {
                    continue;
                }

                let frame = &buf[PeerAddress::LEN..n];
                let well_formed = frame
                    .first()
                    .is_some_and(|&tag| FrameType::try_from(tag).is_ok());
                if well_formed {
                    let registered = peers.lock().contains(&source);
                    routes.write().learn(source, from, registered);
                }

                let handler = on_receive.read().clone();
                if let Some(handler) = handler {
                    handler(source, frame);
                }
            }
        })
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused | io::ErrorKind::Interrupted
    )
}

impl Transport for UdpTransport {
    fn init(&self) -> std::result::Result<(), TransportError> {
        let mut task = self.recv_task.lock();
        if task.is_none() {
            *task = Some(self.spawn_receiver());
        }
        Ok(())
    }

    fn local_address(&self) -> PeerAddress {
        self.local
    }

    fn register_peer(
        &self,
        address: PeerAddress,
        _channel: u8,
        _encrypt: bool,
    ) -> std::result::Result<(), TransportError> {
        if self.peers.lock().insert(address) {
            Ok(())
        } else {
            Err(TransportError::PeerExists)
        }
    }

    fn send(&self, destination: PeerAddress, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        if self.recv_task.lock().is_none() {
            return Err(TransportError::NotInitialized);
        }
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(TransportError::TooLarge(bytes.len()));
        }
        if !self.peers.lock().contains(&destination) {
            return Err(TransportError::PeerNotFound);
        }

        let targets = if destination.is_broadcast() {
            self.broadcast_targets.read().clone()
        } else {
            vec![self.route(destination).ok_or(TransportError::NoRoute)?]
        };

        let mut datagram = Vec::with_capacity(PeerAddress::LEN + bytes.len());
        datagram.extend_from_slice(self.local.as_bytes());
        datagram.extend_from_slice(bytes);
        let mut accepted = 0;
        let mut last_error = None;
        for target in &targets {
            match self.socket.try_send_to(&datagram, *target) {
                Ok(_) => accepted += 1,
                Err(e) => {
                    warn!(%destination, %target, error = %e, "datagram not sent");
                    last_error = Some(e);
                }
            }
        }
        if accepted == 0 {
            return Err(last_error.map_or(TransportError::NoRoute, TransportError::from));
        }

        // No link-level confirmation over UDP; report the kernel hand-off
        let status_handler = self.on_send_status.read().clone();
        if let Some(handler) = status_handler {
            handler(destination, SendStatus::Success);
        }
        Ok(())
    }

    fn set_receive_handler(&self, handler: ReceiveHandler) {
        *self.on_receive.write() = Some(handler);
    }

    fn set_send_status_handler(&self, handler: SendStatusHandler) {
        *self.on_send_status.write() = Some(handler);
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
    }
}
