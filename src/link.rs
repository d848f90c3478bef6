/// NowLink - one node's protocol endpoint
///
/// Owns the peer registry, the ACK manager and the application handlers
/// for a single transport. The receive path ([`crate::receiver`]) and the
/// discovery exchange ([`crate::discovery`]) extend this type from their
/// own modules.
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::ack_manager::{AckManager, Delivery, PendingAck, RetryPolicy};
use crate::config::LinkConfig;
use crate::contracts::{LegacyDataFrame, PeerAddress, PeerName};
use crate::errors::{NowLinkError, Result};
use crate::peers::{PeerRegistry, PeerStatus};
use crate::stats::{LinkStats, StatsSnapshot};
use crate::transmitter::Transmitter;
use crate::transport::{SendStatus, Transport};

/// Called for every decoded legacy data frame, ACKs included
pub type DataHandler = Arc<dyn Fn(PeerAddress, &LegacyDataFrame) + Send + Sync>;

/// Called with the payload of every generic packet
pub type PacketHandler = Arc<dyn Fn(PeerAddress, &[u8]) + Send + Sync>;

/// Called with the declared address and name of a discovered peer
pub type PeerDiscoveredHandler = Arc<dyn Fn(PeerAddress, &str) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    data: RwLock<Option<DataHandler>>,
    packet: RwLock<Option<PacketHandler>>,
    peer_discovered: RwLock<Option<PeerDiscoveredHandler>>,
}

pub struct NowLink<T> {
    transport: Arc<T>,
    config: LinkConfig,
    pub(crate) peers: PeerRegistry<T>,
    pub(crate) acks: AckManager,
    pub(crate) stats: LinkStats,
    handlers: Handlers,
}

impl<T: Transport + 'static> NowLink<T> {
    /// Bring the transport up and route its notifications into this link
    ///
    /// The installed handlers hold only a weak reference, so dropping the
    /// last `Arc<NowLink>` silences the link.
    ///
    /// # Errors
    /// `TransportInitFailed` if the transport refuses to start
    pub fn begin(self: &Arc<Self>) -> Result<()> {
        self.transport
            .init()
            .map_err(NowLinkError::TransportInitFailed)?;

        let link = Arc::downgrade(self);
        self.transport
            .set_receive_handler(Arc::new(move |source: PeerAddress, bytes: &[u8]| {
                if let Some(link) = link.upgrade() {
                    link.handle_receive(source, bytes);
                }
            }));

        let link = Arc::downgrade(self);
        self.transport
            .set_send_status_handler(Arc::new(move |destination: PeerAddress, status: SendStatus| {
                if let Some(link) = link.upgrade() {
                    link.handle_send_status(destination, status);
                }
            }));

        info!(address = %self.local_address(), name = %self.config.name, "link started");
        Ok(())
    }
}

impl<T: Transport> NowLink<T> {
    pub fn new(transport: T, config: LinkConfig) -> Arc<Self> {
        Self::with_shared_transport(Arc::new(transport), config)
    }

    pub fn with_shared_transport(transport: Arc<T>, config: LinkConfig) -> Arc<Self> {
        Arc::new(Self {
            peers: PeerRegistry::new(transport.clone(), config.channel),
            transport,
            config,
            acks: AckManager::new(),
            stats: LinkStats::default(),
            handlers: Handlers::default(),
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn local_address(&self) -> PeerAddress {
        self.transport.local_address()
    }

    pub fn name(&self) -> &PeerName {
        &self.config.name
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn pending_ack(&self) -> PendingAck {
        self.acks.pending()
    }

    /// Id the next reliable send will stamp on its frame
    pub fn next_message_id(&self) -> i32 {
        self.acks.peek_next_id()
    }

    pub fn add_peer(&self, address: PeerAddress) -> Result<PeerStatus> {
        self.peers.add_peer(address)
    }

    /// Send a legacy data frame once, without waiting for an ACK
    pub fn send_data(&self, destination: PeerAddress, frame: &LegacyDataFrame) -> Result<()> {
        self.track(Transmitter::send_data(&*self.transport, destination, frame))
    }

    /// Send an opaque packet of at most 249 bytes
    pub fn send_packet(&self, destination: PeerAddress, payload: &[u8]) -> Result<()> {
        self.track(Transmitter::send_packet(&*self.transport, destination, payload))
    }

    /// Acknowledge message `id` received from `destination`
    pub fn send_ack(&self, destination: PeerAddress, id: i32) -> Result<()> {
        self.send_data(destination, &LegacyDataFrame::ack(id))
    }

    /// Reliable send with the configured retries and ACK timeout
    pub fn send_with_ack(
        &self,
        destination: PeerAddress,
        frame: &mut LegacyDataFrame,
    ) -> Result<Delivery> {
        self.send_with_policy(destination, frame, RetryPolicy::from(&self.config))
    }

    /// Reliable send with explicit retries and ACK timeout
    pub fn send_with_ack_using(
        &self,
        destination: PeerAddress,
        frame: &mut LegacyDataFrame,
        retries: u32,
        ack_timeout: Duration,
    ) -> Result<Delivery> {
        let policy = RetryPolicy::new(retries, ack_timeout)
            .with_send_failure_backoff(self.config.send_failure_backoff);
        self.send_with_policy(destination, frame, policy)
    }

    fn send_with_policy(
        &self,
        destination: PeerAddress,
        frame: &mut LegacyDataFrame,
        policy: RetryPolicy,
    ) -> Result<Delivery> {
        self.acks
            .send_with_ack(&*self.transport, destination, frame, policy, &self.stats)
    }

    fn track(&self, result: Result<()>) -> Result<()> {
        match &result {
            Ok(()) => self.stats.record_sent(),
            Err(NowLinkError::SendFailed { .. }) => self.stats.record_send_failure(),
            Err(_) => {}
        }
        result
    }

    /// Transport send-status notification; diagnostics only
    pub fn handle_send_status(&self, destination: PeerAddress, status: SendStatus) {
        match status {
            SendStatus::Success => debug!(%destination, "link-level delivery confirmed"),
            SendStatus::Failed => {
                self.stats.record_link_failure();
                warn!(%destination, "link-level delivery failed");
            }
        }
    }

    /// Install the data-received handler, returning the one it replaces
    pub fn set_on_data_received<F>(&self, handler: F) -> Option<DataHandler>
    where
        F: Fn(PeerAddress, &LegacyDataFrame) + Send + Sync + 'static,
    {
        self.handlers.data.write().replace(Arc::new(handler))
    }

    /// Install the packet-received handler, returning the one it replaces
    pub fn set_on_packet_received<F>(&self, handler: F) -> Option<PacketHandler>
    where
        F: Fn(PeerAddress, &[u8]) + Send + Sync + 'static,
    {
        self.handlers.packet.write().replace(Arc::new(handler))
    }

    /// Install the peer-discovered handler, returning the one it replaces
    pub fn set_on_peer_discovered<F>(&self, handler: F) -> Option<PeerDiscoveredHandler>
    where
        F: Fn(PeerAddress, &str) + Send + Sync + 'static,
    {
        self.handlers.peer_discovered.write().replace(Arc::new(handler))
    }

    // Handlers are cloned out of the lock so they may re-register or send.

    pub(crate) fn notify_data(&self, source: PeerAddress, frame: &LegacyDataFrame) {
        let handler = self.handlers.data.read().clone();
        if let Some(handler) = handler {
            handler(source, frame);
        }
    }

    pub(crate) fn notify_packet(&self, source: PeerAddress, payload: &[u8]) {
        let handler = self.handlers.packet.read().clone();
        if let Some(handler) = handler {
            handler(source, payload);
        }
    }

    pub(crate) fn notify_peer_discovered(&self, address: PeerAddress, name: &str) {
        let handler = self.handlers.peer_discovered.read().clone();
        if let Some(handler) = handler {
            handler(address, name);
        }
    }
}
