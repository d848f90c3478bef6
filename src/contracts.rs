/// Core data structures for the NowLink protocol
///
/// Every record here has a fixed little-endian wire layout so that
/// firmware peers written against the same layout can exchange frames
/// byte-for-byte. Layout constants live next to the types they describe.
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::errors::NowLinkError;

/// Size of the `text` buffer in a legacy data frame
pub const TEXT_LEN: usize = 100;

/// Size of the `name` buffer in a discovery frame
pub const NAME_LEN: usize = 32;

/// Encoded size of [`LegacyDataFrame`]
///
/// # Memory Layout
/// - command: 4 bytes (u32)
/// - id: 4 bytes (i32)
/// - value1: 4 bytes (f32)
/// - value2: 4 bytes (f32)
/// - text: 100 bytes
pub const LEGACY_DATA_LEN: usize = 4 + 4 + 4 + 4 + TEXT_LEN;

/// Encoded size of [`DiscoveryFrame`]
///
/// # Memory Layout
/// - command: 4 bytes (u32)
/// - mac_addr: 6 bytes
/// - name: 32 bytes
pub const DISCOVERY_LEN: usize = 4 + PeerAddress::LEN + NAME_LEN;

/// Six-byte physical address, the only identity a peer has
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PeerAddress([u8; 6]);

impl PeerAddress {
    pub const LEN: usize = 6;

    /// All-bits-set broadcast address
    pub const BROADCAST: PeerAddress = PeerAddress([0xFF; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Random locally-administered unicast address, for host nodes
    /// that have no burned-in MAC
    pub fn random_local() -> Self {
        let mut bytes: [u8; 6] = rand::random();
        bytes[0] = (bytes[0] & 0xFE) | 0x02;
        Self(bytes)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; 6]> for PeerAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl fmt::Debug for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddress({self})")
    }
}

impl FromStr for PeerAddress {
    type Err = NowLinkError;

    /// Accepts `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF`, any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NowLinkError::InvalidAddress(s.to_string());
        let mut bytes = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

/// Type tag carried in the first byte of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    LegacyData = 0x01,
    GenericPacket = 0x02,
    Discovery = 0x03,
}

impl FrameType {
    pub const ALL: [FrameType; 3] = [
        FrameType::LegacyData,
        FrameType::GenericPacket,
        FrameType::Discovery,
    ];

    pub const fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x01 => Ok(Self::LegacyData),
            0x02 => Ok(Self::GenericPacket),
            0x03 => Ok(Self::Discovery),
            other => Err(other),
        }
    }
}

/// Command carried by legacy data and discovery frames, 32 bits on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    ChangePage,
    SensorData,
    Ack,
    DiscoveryRequest,
    DiscoveryResponse,
    /// Value outside the known set, kept as received
    Unknown(u32),
}

impl Command {
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::ChangePage => 0,
            Self::SensorData => 1,
            Self::Ack => 2,
            Self::DiscoveryRequest => 3,
            Self::DiscoveryResponse => 4,
            Self::Unknown(raw) => raw,
        }
    }

    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::ChangePage,
            1 => Self::SensorData,
            2 => Self::Ack,
            3 => Self::DiscoveryRequest,
            4 => Self::DiscoveryResponse,
            other => Self::Unknown(other),
        }
    }
}

/// Fixed-capacity byte buffer holding UTF-8 text
///
/// Encoding truncates to at most `N - 1` bytes on a char boundary, so a
/// C peer always finds a NUL terminator. Decoding keeps all `N` bytes
/// exactly as received; the text view stops at the first NUL.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedText<const N: usize> {
    bytes: [u8; N],
}

/// 100-byte text field of a legacy data frame
pub type Text = FixedText<TEXT_LEN>;

/// 32-byte node name of a discovery frame
pub type PeerName = FixedText<NAME_LEN>;

impl<const N: usize> FixedText<N> {
    pub const CAPACITY: usize = N;

    pub const fn empty() -> Self {
        Self { bytes: [0; N] }
    }

    /// Copy `text`, truncated to fit with a terminator
    pub fn new(text: &str) -> Self {
        let mut end = text.len().min(N.saturating_sub(1));
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; N];
        bytes[..end].copy_from_slice(&text.as_bytes()[..end]);
        Self { bytes }
    }

    pub const fn from_bytes(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// Raw buffer, including anything after the first NUL
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Bytes up to the first NUL (or the whole buffer if there is none)
    pub fn text_bytes(&self) -> &[u8] {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(N);
        &self.bytes[..end]
    }

    pub fn len(&self) -> usize {
        self.text_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.text_bytes())
    }
}

impl<const N: usize> Default for FixedText<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> From<&str> for FixedText<N> {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl<const N: usize> fmt::Display for FixedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl<const N: usize> fmt::Debug for FixedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

/// LegacyDataFrame - the fixed-layout application record
///
/// Carries commands, sensor readings and application-level ACKs.
/// `id` is the correlation key the reliable sender stamps before
/// transmitting; the remote side echoes it back in an `Ack`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyDataFrame {
    pub command: Command,
    pub id: i32,
    pub value1: f32,
    pub value2: f32,
    pub text: Text,
}

impl LegacyDataFrame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            id: 0,
            value1: 0.0,
            value2: 0.0,
            text: Text::empty(),
        }
    }

    /// Sensor reading with two values and a label
    pub fn sensor_data(value1: f32, value2: f32, text: &str) -> Self {
        Self {
            value1,
            value2,
            text: Text::new(text),
            ..Self::new(Command::SensorData)
        }
    }

    /// Page change request
    pub fn change_page(page: &str) -> Self {
        Self {
            text: Text::new(page),
            ..Self::new(Command::ChangePage)
        }
    }

    /// Application-level acknowledgment of message `id`
    pub fn ack(id: i32) -> Self {
        Self {
            id,
            ..Self::new(Command::Ack)
        }
    }

    pub fn is_ack(&self) -> bool {
        self.command == Command::Ack
    }

    pub fn to_bytes(&self) -> [u8; LEGACY_DATA_LEN] {
        let mut out = [0u8; LEGACY_DATA_LEN];
        out[0..4].copy_from_slice(&self.command.to_raw().to_le_bytes());
        out[4..8].copy_from_slice(&self.id.to_le_bytes());
        out[8..12].copy_from_slice(&self.value1.to_le_bytes());
        out[12..16].copy_from_slice(&self.value2.to_le_bytes());
        out[16..].copy_from_slice(self.text.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; LEGACY_DATA_LEN]) -> Self {
        let mut text = [0u8; TEXT_LEN];
        text.copy_from_slice(&bytes[16..]);
        Self {
            command: Command::from_raw(read_u32(bytes, 0)),
            id: read_u32(bytes, 4) as i32,
            value1: f32::from_bits(read_u32(bytes, 8)),
            value2: f32::from_bits(read_u32(bytes, 12)),
            text: Text::from_bytes(text),
        }
    }
}

impl Default for LegacyDataFrame {
    fn default() -> Self {
        Self::new(Command::ChangePage)
    }
}

/// DiscoveryFrame - request or response of the discovery exchange
///
/// `mac_addr` is the sender's own address as it reports it, which need
/// not match the address the transport says the frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryFrame {
    pub command: Command,
    pub mac_addr: PeerAddress,
    pub name: PeerName,
}

impl DiscoveryFrame {
    pub fn request(mac_addr: PeerAddress, name: PeerName) -> Self {
        Self {
            command: Command::DiscoveryRequest,
            mac_addr,
            name,
        }
    }

    pub fn response(mac_addr: PeerAddress, name: PeerName) -> Self {
        Self {
            command: Command::DiscoveryResponse,
            mac_addr,
            name,
        }
    }

    pub fn to_bytes(&self) -> [u8; DISCOVERY_LEN] {
        let mut out = [0u8; DISCOVERY_LEN];
        out[0..4].copy_from_slice(&self.command.to_raw().to_le_bytes());
        out[4..10].copy_from_slice(self.mac_addr.as_bytes());
        out[10..].copy_from_slice(self.name.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; DISCOVERY_LEN]) -> Self {
        let mut mac = [0u8; PeerAddress::LEN];
        mac.copy_from_slice(&bytes[4..10]);
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&bytes[10..]);
        Self {
            command: Command::from_raw(read_u32(bytes, 0)),
            mac_addr: PeerAddress::new(mac),
            name: PeerName::from_bytes(name),
        }
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes_fit_frame() {
        assert_eq!(LEGACY_DATA_LEN, 116);
        assert_eq!(DISCOVERY_LEN, 42);
        assert!(LEGACY_DATA_LEN + 1 <= crate::MAX_FRAME_SIZE);
        assert!(DISCOVERY_LEN + 1 <= crate::MAX_FRAME_SIZE);
    }

    #[test]
    fn test_peer_address_display_and_parse() {
        let addr = PeerAddress::new([0x24, 0x6F, 0x28, 0xAB, 0xCD, 0xEF]);
        assert_eq!(addr.to_string(), "24:6F:28:AB:CD:EF");
        assert_eq!("24:6f:28:ab:cd:ef".parse::<PeerAddress>().unwrap(), addr);
        assert_eq!("24-6F-28-AB-CD-EF".parse::<PeerAddress>().unwrap(), addr);

        assert!("24:6F:28:AB:CD".parse::<PeerAddress>().is_err());
        assert!("24:6F:28:AB:CD:EF:00".parse::<PeerAddress>().is_err());
        assert!("24:6F:28:AB:CD:XY".parse::<PeerAddress>().is_err());
        assert!("246:F:28:AB:CD:EF".parse::<PeerAddress>().is_err());
    }

    #[test]
    fn test_random_local_address() {
        let addr = PeerAddress::random_local();
        assert_eq!(addr.octets()[0] & 0x01, 0, "must be unicast");
        assert_eq!(addr.octets()[0] & 0x02, 0x02, "must be locally administered");
        assert!(!addr.is_broadcast());
        assert!(PeerAddress::BROADCAST.is_broadcast());
    }

    #[test]
    fn test_frame_type_tags() {
        for frame_type in FrameType::ALL {
            assert_eq!(FrameType::try_from(frame_type.tag()), Ok(frame_type));
        }
        assert_eq!(FrameType::try_from(0x00), Err(0x00));
        assert_eq!(FrameType::try_from(0xFF), Err(0xFF));
    }

    #[test]
    fn test_command_raw_values() {
        assert_eq!(Command::ChangePage.to_raw(), 0);
        assert_eq!(Command::Ack.to_raw(), 2);
        assert_eq!(Command::DiscoveryResponse.to_raw(), 4);
        assert_eq!(Command::from_raw(1), Command::SensorData);
        assert_eq!(Command::from_raw(77), Command::Unknown(77));
        assert_eq!(Command::Unknown(77).to_raw(), 77);
    }

    #[test]
    fn test_fixed_text_truncates_with_terminator() {
        let long = "x".repeat(200);
        let text = Text::new(&long);
        assert_eq!(text.len(), TEXT_LEN - 1);
        assert_eq!(text.as_bytes()[TEXT_LEN - 1], 0);

        // 'é' is two bytes; a cut through it must back off to the boundary
        let name = PeerName::new(&"é".repeat(20));
        assert_eq!(name.len(), 30);
        assert_eq!(name.to_string_lossy(), "é".repeat(15));
    }

    #[test]
    fn test_fixed_text_keeps_raw_bytes() {
        let mut raw = [0u8; NAME_LEN];
        raw[..4].copy_from_slice(b"node");
        raw[10] = 0xAA;
        let name = PeerName::from_bytes(raw);
        assert_eq!(name.to_string_lossy(), "node");
        assert_eq!(name.as_bytes()[10], 0xAA);

        // No terminator at all: the full buffer is the text
        let full = PeerName::from_bytes([b'a'; NAME_LEN]);
        assert_eq!(full.len(), NAME_LEN);
    }

    #[test]
    fn test_legacy_frame_layout() {
        let mut frame = LegacyDataFrame::sensor_data(21.5, 1013.2, "room1");
        frame.id = -7;
        let bytes = frame.to_bytes();

        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-7i32).to_le_bytes());
        assert_eq!(&bytes[8..12], &21.5f32.to_le_bytes());
        assert_eq!(&bytes[16..21], b"room1");
        assert_eq!(LegacyDataFrame::from_bytes(&bytes), frame);
    }

    #[test]
    fn test_discovery_frame_layout() {
        let mac = PeerAddress::new([1, 2, 3, 4, 5, 6]);
        let frame = DiscoveryFrame::response(mac, PeerName::new("kitchen"));
        let bytes = frame.to_bytes();

        assert_eq!(&bytes[0..4], &4u32.to_le_bytes());
        assert_eq!(&bytes[4..10], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(&bytes[10..17], b"kitchen");
        assert_eq!(DiscoveryFrame::from_bytes(&bytes), frame);
    }
}
