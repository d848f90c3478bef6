/// Transmitter module - outbound framing and hand-off to the transport
///
/// Stateless: every call encodes, validates size, and passes the frame to
/// the transport in one step. Nothing here waits or retries; reliability
/// is layered on top by the ACK manager.
use crate::codec;
use crate::contracts::{DiscoveryFrame, FrameType, LegacyDataFrame, PeerAddress};
use crate::errors::{NowLinkError, Result};
use crate::transport::Transport;

/// Transmitter - Encodes and sends frames over a [`Transport`]
pub struct Transmitter;

impl Transmitter {
    /// Encode a legacy data frame into wire bytes
    pub fn serialize_data(frame: &LegacyDataFrame) -> Result<Vec<u8>> {
        codec::encode_legacy_data(frame)
    }

    /// Send already-encoded wire bytes
    ///
    /// # Errors
    /// `SendFailed` if the transport refuses to enqueue the frame
    pub fn send_raw<T: Transport + ?Sized>(
        transport: &T,
        destination: PeerAddress,
        wire: &[u8],
    ) -> Result<()> {
        transport
            .send(destination, wire)
            .map_err(|source| NowLinkError::SendFailed {
                address: destination,
                source,
            })
    }

    /// Send a legacy data frame without waiting for any acknowledgment
    pub fn send_data<T: Transport + ?Sized>(
        transport: &T,
        destination: PeerAddress,
        frame: &LegacyDataFrame,
    ) -> Result<()> {
        let wire = Self::serialize_data(frame)?;
        Self::send_raw(transport, destination, &wire)
    }

    /// Send an opaque generic packet
    ///
    /// # Errors
    /// `PayloadTooLarge` before anything is sent if `payload` exceeds 249 bytes
    pub fn send_packet<T: Transport + ?Sized>(
        transport: &T,
        destination: PeerAddress,
        payload: &[u8],
    ) -> Result<()> {
        let wire = codec::encode(FrameType::GenericPacket, payload)?;
        Self::send_raw(transport, destination, &wire)
    }

    pub fn send_discovery<T: Transport + ?Sized>(
        transport: &T,
        destination: PeerAddress,
        frame: &DiscoveryFrame,
    ) -> Result<()> {
        let wire = codec::encode_discovery(frame)?;
        Self::send_raw(transport, destination, &wire)
    }
}
