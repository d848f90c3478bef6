/// Transport contract - the radio the protocol rides on
///
/// The core never touches hardware. Anything that can push up to 250
/// bytes to a 6-byte address, keep a peer table and call back on receive
/// can carry NowLink: a radio driver binding, the in-process
/// [`loopback`] medium, or the [`udp`] host transport.
use std::sync::Arc;

use thiserror::Error;

use crate::contracts::PeerAddress;

pub mod loopback;
pub mod udp;

pub use loopback::{FrameRecord, LoopbackMedium, LoopbackTransport};
pub use udp::UdpTransport;

/// Called with the wire source and the raw frame bytes
pub type ReceiveHandler = Arc<dyn Fn(PeerAddress, &[u8]) + Send + Sync>;

/// Called with the destination and the link-level outcome of a send
pub type SendStatusHandler = Arc<dyn Fn(PeerAddress, SendStatus) + Send + Sync>;

/// Link-level result of one transmission
///
/// Only confirms the frame left the radio (or reached the next hop),
/// never that the remote application consumed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Success,
    Failed,
}

/// Errors reported by a transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport not initialized")]
    NotInitialized,

    /// Registration of an address that is already in the peer table
    #[error("peer already registered")]
    PeerExists,

    /// Unicast to an address that was never registered
    #[error("peer not registered")]
    PeerNotFound,

    #[error("frame of {0} bytes exceeds transport limit")]
    TooLarge(usize),

    /// Local queue full; the frame was not accepted
    #[error("transport busy")]
    Busy,

    /// No known endpoint for a registered peer
    #[error("no route to peer")]
    NoRoute,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock => Self::Busy,
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Short-packet best-effort transport
///
/// Handlers may be invoked from any thread, including synchronously from
/// inside [`Transport::send`]. Implementations must not hold internal
/// locks while calling them.
pub trait Transport: Send + Sync {
    /// Bring the transport up; called once from `NowLink::begin`
    fn init(&self) -> Result<(), TransportError>;

    /// This node's own address
    fn local_address(&self) -> PeerAddress;

    /// Add `address` to the peer table
    ///
    /// Returns `Err(TransportError::PeerExists)` if it is already there.
    fn register_peer(
        &self,
        address: PeerAddress,
        channel: u8,
        encrypt: bool,
    ) -> Result<(), TransportError>;

    /// Enqueue one frame; completion is reported through the send-status handler
    fn send(&self, destination: PeerAddress, bytes: &[u8]) -> Result<(), TransportError>;

    /// Install the inbound frame handler, replacing any previous one
    fn set_receive_handler(&self, handler: ReceiveHandler);

    /// Install the send-status handler, replacing any previous one
    fn set_send_status_handler(&self, handler: SendStatusHandler);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn init(&self) -> Result<(), TransportError> {
        (**self).init()
    }

    fn local_address(&self) -> PeerAddress {
        (**self).local_address()
    }

    fn register_peer(
        &self,
        address: PeerAddress,
        channel: u8,
        encrypt: bool,
    ) -> Result<(), TransportError> {
        (**self).register_peer(address, channel, encrypt)
    }

    fn send(&self, destination: PeerAddress, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(destination, bytes)
    }

    fn set_receive_handler(&self, handler: ReceiveHandler) {
        (**self).set_receive_handler(handler)
    }

    fn set_send_status_handler(&self, handler: SendStatusHandler) {
        (**self).set_send_status_handler(handler)
    }
}
