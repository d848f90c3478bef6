/// NowLink Core - Connectionless short-packet messaging protocol
///
/// **Creator**: Shayan Golmezerji
/// **License**: Creative Commons Attribution 4.0 International (CC BY 4.0)
///
/// This library implements the protocol layer that sits on top of a
/// best-effort broadcast/unicast radio transport with a 250 byte packet
/// ceiling, no built-in retry and no built-in peer discovery.
///
/// # Components
/// - [`link`]: the per-node endpoint tying the pieces below together
/// - [`codec`]: 1-byte type tag framing and fixed record layouts
/// - [`peers`]: idempotent peer registration over the transport
/// - [`discovery`]: broadcast request / unicast response peer discovery
/// - [`ack_manager`]: application-level ACK with bounded retries
/// - [`receiver`]: inbound frame demultiplexing
/// - [`transport`]: the transport contract plus loopback and UDP hosts
///
/// # Design Principles
/// - The transport is a collaborator behind a trait; the core owns no radio
/// - At most one reliable send in flight per link
/// - Inbound decode problems are logged and dropped, never surfaced

pub mod errors;
pub mod contracts;
pub mod codec;
pub mod config;
pub mod transport;
pub mod peers;
pub mod transmitter;
pub mod receiver;
pub mod ack_manager;
pub mod discovery;
pub mod link;
pub mod stats;

pub use config::{LinkBuilder, LinkConfig};
pub use contracts::{
    Command, DiscoveryFrame, FixedText, FrameType, LegacyDataFrame, PeerAddress, PeerName, Text,
};
pub use errors::{NowLinkError, Result};
pub use link::NowLink;
pub use transport::{SendStatus, Transport, TransportError};

/// Hard per-packet ceiling imposed by the radio transport
pub const MAX_FRAME_SIZE: usize = 250;

/// Largest payload that fits behind the 1-byte type tag
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - 1;

/// Default number of reliable-send attempts
pub const DEFAULT_RETRIES: u32 = 5;

/// Default ACK wait per attempt in milliseconds
pub const ACK_TIMEOUT_MS: u64 = 200;

/// Pause after a local transport send failure before the next attempt
pub const SEND_FAILURE_BACKOFF_MS: u64 = 100;

/// Channel 0 tells the transport to use whatever channel it is on
pub const CURRENT_CHANNEL: u8 = 0;
