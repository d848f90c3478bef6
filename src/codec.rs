/// Frame codec - type tag framing and fixed record validation
///
/// A frame is one tag byte followed by the payload, 250 bytes at most.
/// `decode` only splits the tag off; whether the tag is known is the
/// receiver's concern, so unknown tags pass through here untouched.
use crate::contracts::{
    DiscoveryFrame, FrameType, LegacyDataFrame, DISCOVERY_LEN, LEGACY_DATA_LEN,
};
use crate::errors::{NowLinkError, Result};
use crate::{MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};

/// Borrowed view of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame<'a> {
    /// First byte of the frame, not necessarily a known [`FrameType`]
    pub tag: u8,
    pub payload: &'a [u8],
}

impl RawFrame<'_> {
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::try_from(self.tag).ok()
    }
}

/// Prepend the type tag to `payload`
///
/// # Errors
/// `PayloadTooLarge` if the result would exceed [`MAX_FRAME_SIZE`]
pub fn encode(frame_type: FrameType, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() + 1 > MAX_FRAME_SIZE {
        return Err(NowLinkError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(frame_type.tag());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Split a received frame into tag and payload
///
/// # Errors
/// `EmptyFrame` if `wire` has no bytes at all
pub fn decode(wire: &[u8]) -> Result<RawFrame<'_>> {
    match wire.split_first() {
        Some((&tag, payload)) => Ok(RawFrame { tag, payload }),
        None => Err(NowLinkError::EmptyFrame),
    }
}

pub fn encode_legacy_data(frame: &LegacyDataFrame) -> Result<Vec<u8>> {
    encode(FrameType::LegacyData, &frame.to_bytes())
}

pub fn encode_discovery(frame: &DiscoveryFrame) -> Result<Vec<u8>> {
    encode(FrameType::Discovery, &frame.to_bytes())
}

/// Decode a legacy data payload, zero-extending short senders
///
/// # Errors
/// - `EmptyPayload` if the frame carried only its tag
/// - `SizeMismatch` if the payload is longer than the record
pub fn decode_legacy_data(payload: &[u8]) -> Result<LegacyDataFrame> {
    let bytes = zero_extend::<LEGACY_DATA_LEN>(FrameType::LegacyData, payload)?;
    Ok(LegacyDataFrame::from_bytes(&bytes))
}

/// Decode a discovery payload, zero-extending short senders
pub fn decode_discovery(payload: &[u8]) -> Result<DiscoveryFrame> {
    let bytes = zero_extend::<DISCOVERY_LEN>(FrameType::Discovery, payload)?;
    Ok(DiscoveryFrame::from_bytes(&bytes))
}

fn zero_extend<const N: usize>(frame_type: FrameType, payload: &[u8]) -> Result<[u8; N]> {
    if payload.is_empty() {
        return Err(NowLinkError::EmptyPayload { frame_type });
    }
    if payload.len() > N {
        return Err(NowLinkError::SizeMismatch {
            frame_type,
            expected: N,
            received: payload.len(),
        });
    }
    let mut bytes = [0u8; N];
    bytes[..payload.len()].copy_from_slice(payload);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{Command, PeerAddress, PeerName};
    use proptest::prelude::*;

    #[test]
    fn test_generic_packet_boundary() {
        assert!(encode(FrameType::GenericPacket, &[0xAB; 249]).is_ok());
        assert_eq!(encode(FrameType::GenericPacket, &[0xAB; 249]).unwrap().len(), 250);

        match encode(FrameType::GenericPacket, &[0xAB; 250]) {
            Err(NowLinkError::PayloadTooLarge { size, max }) => {
                assert_eq!(size, 250);
                assert_eq!(max, 249);
            }
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_empty_frame() {
        assert!(matches!(decode(&[]), Err(NowLinkError::EmptyFrame)));
    }

    #[test]
    fn test_decode_tag_only() {
        let frame = decode(&[0x02]).unwrap();
        assert_eq!(frame.frame_type(), Some(FrameType::GenericPacket));
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_unknown_tag_passes_through() {
        let frame = decode(&[0xFF, 1, 2, 3]).unwrap();
        assert_eq!(frame.tag, 0xFF);
        assert_eq!(frame.frame_type(), None);
        assert_eq!(frame.payload, &[1, 2, 3]);
    }

    #[test]
    fn test_legacy_payload_zero_extended() {
        let mut full = LegacyDataFrame::sensor_data(1.5, -2.0, "abc").to_bytes();
        full[..4].copy_from_slice(&Command::Ack.to_raw().to_le_bytes());
        full[4..8].copy_from_slice(&9i32.to_le_bytes());

        // A sender that only transmits command and id
        let frame = decode_legacy_data(&full[..8]).unwrap();
        assert_eq!(frame.command, Command::Ack);
        assert_eq!(frame.id, 9);
        assert_eq!(frame.value1, 0.0);
        assert!(frame.text.is_empty());

        let one_byte = decode_legacy_data(&[Command::SensorData.to_raw() as u8]).unwrap();
        assert_eq!(one_byte.command, Command::SensorData);
    }

    #[test]
    fn test_empty_record_payload_rejected() {
        let err = decode_legacy_data(&[]).unwrap_err();
        assert!(matches!(err, NowLinkError::EmptyPayload { frame_type: FrameType::LegacyData }));
        assert!(err.is_decode_error());

        assert!(matches!(
            decode_discovery(&[]),
            Err(NowLinkError::EmptyPayload { frame_type: FrameType::Discovery })
        ));
    }

    #[test]
    fn test_oversized_records_rejected() {
        let err = decode_legacy_data(&[0u8; LEGACY_DATA_LEN + 1]).unwrap_err();
        assert!(matches!(
            err,
            NowLinkError::SizeMismatch { frame_type: FrameType::LegacyData, expected: 116, received: 117 }
        ));
        assert!(err.is_decode_error());

        let err = decode_discovery(&[0u8; DISCOVERY_LEN + 2]).unwrap_err();
        assert!(matches!(
            err,
            NowLinkError::SizeMismatch { frame_type: FrameType::Discovery, expected: 42, received: 44 }
        ));
    }

    #[test]
    fn test_record_frames_carry_tag() {
        let legacy = encode_legacy_data(&LegacyDataFrame::ack(3)).unwrap();
        assert_eq!(legacy.len(), LEGACY_DATA_LEN + 1);
        assert_eq!(legacy[0], 0x01);

        let discovery = encode_discovery(&DiscoveryFrame::request(
            PeerAddress::new([0xA0; 6]),
            PeerName::new("scout"),
        ))
        .unwrap();
        assert_eq!(discovery.len(), DISCOVERY_LEN + 1);
        assert_eq!(discovery[0], 0x03);

        let raw = decode(&discovery).unwrap();
        let frame = decode_discovery(raw.payload).unwrap();
        assert_eq!(frame.command, Command::DiscoveryRequest);
        assert_eq!(frame.name.to_string_lossy(), "scout");
    }

    fn arb_frame_type() -> impl Strategy<Value = FrameType> {
        prop::sample::select(FrameType::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_encode_decode_preserves_type_and_payload(
            frame_type in arb_frame_type(),
            payload in prop::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_SIZE),
        ) {
            let wire = encode(frame_type, &payload).unwrap();
            prop_assert_eq!(wire.len(), payload.len() + 1);

            let raw = decode(&wire).unwrap();
            prop_assert_eq!(raw.frame_type(), Some(frame_type));
            prop_assert_eq!(raw.payload, payload.as_slice());
        }

        #[test]
        fn prop_encode_rejects_oversized(
            frame_type in arb_frame_type(),
            extra in 1usize..64,
        ) {
            let payload = vec![0u8; MAX_PAYLOAD_SIZE + extra];
            let is_too_large = matches!(
                encode(frame_type, &payload),
                Err(NowLinkError::PayloadTooLarge { .. })
            );
            prop_assert!(is_too_large);
        }

        #[test]
        fn prop_legacy_fields_survive_encoding(
            raw_command in 0u32..8,
            id in any::<i32>(),
            value1 in -1.0e6f32..1.0e6,
            value2 in -1.0e6f32..1.0e6,
            text in "[a-zA-Z0-9 ]{0,99}",
        ) {
            let frame = LegacyDataFrame {
                command: Command::from_raw(raw_command),
                id,
                value1,
                value2,
                text: text.as_str().into(),
            };
            let wire = encode_legacy_data(&frame).unwrap();
            let decoded = decode_legacy_data(decode(&wire).unwrap().payload).unwrap();
            prop_assert_eq!(decoded, frame);
            prop_assert_eq!(decoded.text.to_string_lossy(), text);
        }
    }
}
