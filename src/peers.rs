/// Peer registry - idempotent registration over the transport
///
/// The peer table itself lives in the transport. This wrapper only fixes
/// the registration policy (current channel, no encryption) and folds the
/// transport's "already exists" answer into success.
use std::sync::Arc;

use tracing::{debug, warn};

use crate::contracts::PeerAddress;
use crate::errors::{NowLinkError, Result};
use crate::transport::{Transport, TransportError};

/// Outcome of a successful [`PeerRegistry::add_peer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Added,
    AlreadyRegistered,
}

pub struct PeerRegistry<T> {
    transport: Arc<T>,
    channel: u8,
}

impl<T: Transport> PeerRegistry<T> {
    pub fn new(transport: Arc<T>, channel: u8) -> Self {
        Self { transport, channel }
    }

    /// Register `address`, unencrypted, on the configured channel
    ///
    /// # Errors
    /// `RegistrationFailed` for any transport error other than "already exists"
    pub fn add_peer(&self, address: PeerAddress) -> Result<PeerStatus> {
        match self.transport.register_peer(address, self.channel, false) {
            Ok(()) => {
                debug!(%address, "peer added");
                Ok(PeerStatus::Added)
            }
            Err(TransportError::PeerExists) => {
                debug!(%address, "peer already registered");
                Ok(PeerStatus::AlreadyRegistered)
            }
            Err(source) => {
                warn!(%address, error = %source, "peer registration failed");
                Err(NowLinkError::RegistrationFailed { address, source })
            }
        }
    }
}
