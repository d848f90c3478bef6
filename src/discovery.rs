/// Discovery - broadcast request, unicast response
///
/// A node announces itself by broadcasting a `DiscoveryRequest` carrying
/// its address and name. Every listener registers the requester and
/// answers with a `DiscoveryResponse`; the requester registers each
/// responder and reports it to the peer-discovered handler. The exchange
/// is fire-and-forget: nothing is retried and send problems are only
/// logged.
use tracing::{debug, info, trace, warn};

use crate::contracts::{Command, DiscoveryFrame, PeerAddress};
use crate::link::NowLink;
use crate::transmitter::Transmitter;
use crate::transport::Transport;

impl<T: Transport> NowLink<T> {
    /// Broadcast a discovery request
    pub fn discover_peers(&self) {
        // The transport decides whether an unregistered broadcast can go out
        if let Err(e) = self.peers.add_peer(PeerAddress::BROADCAST) {
            warn!(error = %e, "broadcast address not registered; sending anyway");
        }

        let request = DiscoveryFrame::request(self.local_address(), *self.name());
        match Transmitter::send_discovery(self.transport(), PeerAddress::BROADCAST, &request) {
            Ok(()) => {
                self.stats.record_sent();
                debug!(name = %request.name, "discovery request broadcast");
            }
            Err(e) => {
                self.stats.record_send_failure();
                warn!(error = %e, "discovery request not sent");
            }
        }
    }

    pub(crate) fn on_discovery(&self, source: PeerAddress, frame: &DiscoveryFrame) {
        if frame.mac_addr == self.local_address() {
            trace!(%source, "own discovery frame ignored");
            return;
        }

        match frame.command {
            Command::DiscoveryRequest => self.answer_discovery(source, frame),
            Command::DiscoveryResponse => self.record_discovered(source, frame),
            other => debug!(%source, command = ?other, "discovery frame with foreign command ignored"),
        }
    }

    fn answer_discovery(&self, source: PeerAddress, request: &DiscoveryFrame) {
        debug!(%source, name = %request.name, "discovery request received");

        // Unregistered peers cannot be answered
        if self.peers.add_peer(source).is_err() {
            return;
        }

        let response = DiscoveryFrame::response(self.local_address(), *self.name());
        match Transmitter::send_discovery(self.transport(), source, &response) {
            Ok(()) => self.stats.record_sent(),
            Err(e) => {
                self.stats.record_send_failure();
                warn!(%source, error = %e, "discovery response not sent");
            }
        }
    }

    fn record_discovered(&self, source: PeerAddress, response: &DiscoveryFrame) {
        let address = response.mac_addr;
        if address != source {
            warn!(%source, declared = %address, "discovery response address differs from sender");
        }

        // Failure is logged by the registry; the peer is still reported
        let _ = self.peers.add_peer(address);

        let name = response.name.to_string_lossy();
        info!(%address, name = %name, "peer discovered");
        self.notify_peer_discovered(address, &name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::transport::{LoopbackMedium, ReceiveHandler, SendStatusHandler, TransportError};
    use crate::{LinkBuilder, PeerName};
    use parking_lot::Mutex;
    use std::sync::Arc;

    const NODE: PeerAddress = PeerAddress::new([0x02, 0, 0, 0, 0, 0x01]);
    const PEER: PeerAddress = PeerAddress::new([0x02, 0, 0, 0, 0, 0x02]);
    const OTHER: PeerAddress = PeerAddress::new([0x02, 0, 0, 0, 0, 0x03]);

    #[test]
    fn test_response_with_mismatched_address_registers_declared_address() {
        let medium = LoopbackMedium::new();
        let transport = medium.attach(NODE);
        let link = NowLink::new(transport.clone(), LinkBuilder::new().with_name("node").build());
        link.begin().unwrap();

        let found = Arc::new(Mutex::new(Vec::new()));
        let sink = found.clone();
        link.set_on_peer_discovered(move |address, name| {
            sink.lock().push((address, name.to_string()));
        });

        let response = DiscoveryFrame::response(OTHER, PeerName::new("kitchen"));
        let wire = codec::encode_discovery(&response).unwrap();
        assert!(medium.inject(PEER, NODE, &wire));

        assert_eq!(transport.registration_calls(), vec![OTHER]);
        assert_eq!(found.lock().as_slice(), &[(OTHER, "kitchen".to_string())]);
        assert!(medium.frames().is_empty());
    }

    #[test]
    fn test_own_discovery_frames_are_ignored() {
        let medium = LoopbackMedium::new();
        let transport = medium.attach(NODE);
        let link = NowLink::new(transport.clone(), LinkBuilder::new().with_name("node").build());
        link.begin().unwrap();

        let echo = DiscoveryFrame::request(NODE, PeerName::new("node"));
        medium.inject(PEER, NODE, &codec::encode_discovery(&echo).unwrap());

        assert!(transport.registration_calls().is_empty());
        assert!(medium.frames().is_empty());
    }

    /// Accepts every send but refuses every registration
    #[derive(Default)]
    struct FullPeerTable {
        sent: Mutex<Vec<(PeerAddress, Vec<u8>)>>,
    }

    impl Transport for FullPeerTable {
        fn init(&self) -> std::result::Result<(), TransportError> {
            Ok(())
        }

        fn local_address(&self) -> PeerAddress {
            NODE
        }

        fn register_peer(&self, _: PeerAddress, _: u8, _: bool) -> std::result::Result<(), TransportError> {
            Err(TransportError::Other("peer table full".to_string()))
        }

        fn send(&self, destination: PeerAddress, bytes: &[u8]) -> std::result::Result<(), TransportError> {
            self.sent.lock().push((destination, bytes.to_vec()));
            Ok(())
        }

        fn set_receive_handler(&self, _: ReceiveHandler) {}

        fn set_send_status_handler(&self, _: SendStatusHandler) {}
    }

    #[test]
    fn test_discovery_sent_when_broadcast_registration_fails() {
        let link = NowLink::new(FullPeerTable::default(), LinkBuilder::new().with_name("node").build());

        link.discover_peers();

        let sent = link.transport().sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, PeerAddress::BROADCAST);
        let request = codec::decode_discovery(&sent[0].1[1..]).unwrap();
        assert_eq!(request.command, Command::DiscoveryRequest);
        assert_eq!(request.mac_addr, NODE);
        assert_eq!(link.stats().frames_sent, 1);
    }

    #[test]
    fn test_discovery_before_begin_sends_nothing() {
        let medium = LoopbackMedium::new();
        let transport = medium.attach(NODE);
        let link = NowLink::new(transport, LinkBuilder::new().with_name("node").build());

        link.discover_peers();
        assert!(medium.frames().is_empty());
        let stats = link.stats();
        assert_eq!(stats.frames_sent, 0);
        assert_eq!(stats.send_failures, 1);
    }
}
