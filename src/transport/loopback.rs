/// In-process shared radio medium
///
/// Stations attached to one [`LoopbackMedium`] hear each other the way
/// radios on one channel do: broadcast reaches every other listening
/// station, unicast reaches the addressed one, and unicast requires the
/// destination in the sender's peer table. Delivery is synchronous on
/// the sending thread.
///
/// The medium keeps a log of every frame handed to it and can drop or
/// refuse frames on demand, which makes it the reference host for
/// exercising retry and discovery behaviour.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::{ReceiveHandler, SendStatus, SendStatusHandler, Transport, TransportError};
use crate::contracts::PeerAddress;
use crate::MAX_FRAME_SIZE;

/// One frame as seen by the medium
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub source: PeerAddress,
    pub destination: PeerAddress,
    pub bytes: Vec<u8>,
    /// Whether at least one station received it
    pub delivered: bool,
}

#[derive(Default)]
struct MediumState {
    stations: HashMap<PeerAddress, Arc<Station>>,
    log: Vec<FrameRecord>,
    drop_budget: HashMap<PeerAddress, usize>,
    fail_budget: HashMap<PeerAddress, usize>,
}

struct Station {
    address: PeerAddress,
    initialized: AtomicBool,
    peers: Mutex<HashSet<PeerAddress>>,
    registration_calls: Mutex<Vec<PeerAddress>>,
    on_receive: RwLock<Option<ReceiveHandler>>,
    on_send_status: RwLock<Option<SendStatusHandler>>,
}

impl Station {
    fn receive_handler(&self) -> Option<ReceiveHandler> {
        if !self.initialized.load(Ordering::Acquire) {
            return None;
        }
        self.on_receive.read().clone()
    }
}

/// Shared medium; clones refer to the same channel
#[derive(Clone, Default)]
pub struct LoopbackMedium {
    state: Arc<Mutex<MediumState>>,
}

impl LoopbackMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a station with the given address, replacing any previous one
    pub fn attach(&self, address: PeerAddress) -> LoopbackTransport {
        let station = Arc::new(Station {
            address,
            initialized: AtomicBool::new(false),
            peers: Mutex::new(HashSet::new()),
            registration_calls: Mutex::new(Vec::new()),
            on_receive: RwLock::new(None),
            on_send_status: RwLock::new(None),
        });
        self.state.lock().stations.insert(address, station.clone());
        LoopbackTransport {
            medium: self.clone(),
            station,
        }
    }

    /// Remove a station; frames addressed to it go nowhere afterwards
    pub fn detach(&self, address: PeerAddress) {
        self.state.lock().stations.remove(&address);
    }

    /// Silently lose the next `count` frames sent by `source`
    pub fn drop_next(&self, source: PeerAddress, count: usize) {
        *self.state.lock().drop_budget.entry(source).or_default() += count;
    }

    /// Make the next `count` sends by `source` fail locally
    pub fn fail_next_sends(&self, source: PeerAddress, count: usize) {
        *self.state.lock().fail_budget.entry(source).or_default() += count;
    }

    /// Every frame accepted so far, in send order
    pub fn frames(&self) -> Vec<FrameRecord> {
        self.state.lock().log.clone()
    }

    pub fn frames_from(&self, source: PeerAddress) -> Vec<FrameRecord> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|record| record.source == source)
            .cloned()
            .collect()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// Hand raw bytes to `destination` as if `source` had sent them
    ///
    /// Bypasses peer tables and loss injection; used to feed malformed or
    /// forged frames to a station. Returns whether anyone was listening.
    pub fn inject(&self, source: PeerAddress, destination: PeerAddress, bytes: &[u8]) -> bool {
        let handler = {
            let state = self.state.lock();
            state
                .stations
                .get(&destination)
                .and_then(|station| station.receive_handler())
        };
        match handler {
            Some(handler) => {
                handler(source, bytes);
                true
            }
            None => false,
        }
    }

    fn route(
        &self,
        source: PeerAddress,
        destination: PeerAddress,
        bytes: &[u8],
    ) -> Result<Vec<ReceiveHandler>, TransportError> {
        let mut state = self.state.lock();
        if take_one(&mut state.fail_budget, source) {
            return Err(TransportError::Other("injected send failure".to_string()));
        }

        let targets: Vec<ReceiveHandler> = if take_one(&mut state.drop_budget, source) {
            trace!(%source, %destination, "frame lost on medium");
            Vec::new()
        } else if destination.is_broadcast() {
            state
                .stations
                .values()
                .filter(|station| station.address != source)
                .filter_map(|station| station.receive_handler())
                .collect()
        } else {
            state
                .stations
                .get(&destination)
                .and_then(|station| station.receive_handler())
                .into_iter()
                .collect()
        };

        state.log.push(FrameRecord {
            source,
            destination,
            bytes: bytes.to_vec(),
            delivered: !targets.is_empty(),
        });
        Ok(targets)
    }
}

fn take_one(budget: &mut HashMap<PeerAddress, usize>, source: PeerAddress) -> bool {
    match budget.get_mut(&source) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

/// One station's handle on a [`LoopbackMedium`]
#[derive(Clone)]
pub struct LoopbackTransport {
    medium: LoopbackMedium,
    station: Arc<Station>,
}

impl LoopbackTransport {
    pub fn medium(&self) -> &LoopbackMedium {
        &self.medium
    }

    pub fn is_registered(&self, address: PeerAddress) -> bool {
        self.station.peers.lock().contains(&address)
    }

    /// Current peer table, sorted
    pub fn registered_peers(&self) -> Vec<PeerAddress> {
        let mut peers: Vec<_> = self.station.peers.lock().iter().copied().collect();
        peers.sort();
        peers
    }

    /// Every `register_peer` call made, duplicates included
    pub fn registration_calls(&self) -> Vec<PeerAddress> {
        self.station.registration_calls.lock().clone()
    }
}

impl Transport for LoopbackTransport {
    fn init(&self) -> Result<(), TransportError> {
        self.station.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn local_address(&self) -> PeerAddress {
        self.station.address
    }

    fn register_peer(
        &self,
        address: PeerAddress,
        _channel: u8,
        _encrypt: bool,
    ) -> Result<(), TransportError> {
        if !self.station.initialized.load(Ordering::Acquire) {
            return Err(TransportError::NotInitialized);
        }
        self.station.registration_calls.lock().push(address);
        if self.station.peers.lock().insert(address) {
            Ok(())
        } else {
            Err(TransportError::PeerExists)
        }
    }

    fn send(&self, destination: PeerAddress, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.station.initialized.load(Ordering::Acquire) {
            return Err(TransportError::NotInitialized);
        }
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(TransportError::TooLarge(bytes.len()));
        }
        if !self.is_registered(destination) {
            return Err(TransportError::PeerNotFound);
        }

        let source = self.station.address;
        let targets = self.medium.route(source, destination, bytes)?;
        for handler in &targets {
            handler(source, bytes);
        }

        let status = if destination.is_broadcast() || !targets.is_empty() {
            SendStatus::Success
        } else {
            SendStatus::Failed
        };
        let status_handler = self.station.on_send_status.read().clone();
        if let Some(handler) = status_handler {
            handler(destination, status);
        }
        Ok(())
    }

    fn set_receive_handler(&self, handler: ReceiveHandler) {
        *self.station.on_receive.write() = Some(handler);
    }

    fn set_send_status_handler(&self, handler: SendStatusHandler) {
        *self.station.on_send_status.write() = Some(handler);
    }
}
