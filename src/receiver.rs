/// Receiver module - inbound frame dispatch
///
/// Every frame the transport hands up goes through [`NowLink::handle_receive`]:
/// the tag is decoded, the payload parsed, and the result routed to the ACK
/// manager, the application handlers or the discovery exchange. Empty,
/// malformed and unknown frames are logged and dropped here; nothing on
/// this path returns an error to the transport.
use tracing::{debug, trace};

use crate::codec;
use crate::contracts::{DiscoveryFrame, FrameType, LegacyDataFrame, PeerAddress};
use crate::errors::Result;
use crate::link::NowLink;
use crate::transport::Transport;

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<'a> {
    LegacyData(LegacyDataFrame),
    GenericPacket(&'a [u8]),
    Discovery(DiscoveryFrame),
}

/// Receiver - Parses wire bytes into [`Inbound`] frames
pub struct Receiver;

impl Receiver {
    /// Decode one frame
    ///
    /// Returns `Ok(None)` for a tag this protocol does not know.
    ///
    /// # Errors
    /// - `EmptyFrame` for zero-length input
    /// - `EmptyPayload` for a tag-only legacy data or discovery frame
    /// - `SizeMismatch` if a fixed record payload is longer than its layout
    pub fn parse(wire: &[u8]) -> Result<Option<Inbound<'_>>> {
        let raw = codec::decode(wire)?;
        let inbound = match raw.frame_type() {
            Some(FrameType::LegacyData) => {
                Inbound::LegacyData(codec::decode_legacy_data(raw.payload)?)
            }
            Some(FrameType::GenericPacket) => Inbound::GenericPacket(raw.payload),
            Some(FrameType::Discovery) => Inbound::Discovery(codec::decode_discovery(raw.payload)?),
            None => return Ok(None),
        };
        Ok(Some(inbound))
    }
}

impl<T: Transport> NowLink<T> {
    /// Dispatch one inbound frame from `source`
    ///
    /// Installed as the transport's receive handler by `begin`; hosts that
    /// drive the link by hand may call it directly.
    pub fn handle_receive(&self, source: PeerAddress, wire: &[u8]) {
        let inbound = match Receiver::parse(wire) {
            Ok(Some(inbound)) => inbound,
            Ok(None) => {
                self.stats.record_dropped();
                debug!(%source, tag = ?wire.first(), "unknown frame type dropped");
                return;
            }
            Err(e) => {
                self.stats.record_dropped();
                debug!(%source, len = wire.len(), error = %e, "inbound frame dropped");
                return;
            }
        };

        self.stats.record_received();
        trace!(%source, len = wire.len(), "frame received");

        match inbound {
            Inbound::LegacyData(frame) => self.on_legacy_data(source, &frame),
            Inbound::GenericPacket(payload) => self.notify_packet(source, payload),
            Inbound::Discovery(frame) => self.on_discovery(source, &frame),
        }
    }

    fn on_legacy_data(&self, source: PeerAddress, frame: &LegacyDataFrame) {
        if frame.is_ack() {
            if self.acks.acknowledge(frame.id) {
                self.stats.record_ack_matched();
                debug!(%source, id = frame.id, "ACK matched pending message");
            } else {
                trace!(%source, id = frame.id, "stale or unexpected ACK");
            }
        }
        // ACKs reach the application too, matched or not
        self.notify_data(source, frame);
    }
}
