/// Error types for NowLink protocol operations
///
/// One enum covers the outbound path (caller errors and delivery outcomes)
/// and the inbound decode path. Inbound errors never reach the application:
/// the receiver logs and drops them.
use std::io;

use thiserror::Error;

use crate::contracts::{FrameType, PeerAddress};
use crate::transport::TransportError;

/// Result type alias for NowLink operations
pub type Result<T> = std::result::Result<T, NowLinkError>;

/// NowLink protocol error enumeration
#[derive(Debug, Error)]
pub enum NowLinkError {
    /// Transport refused to start; fatal to `begin`
    #[error("transport initialization failed: {0}")]
    TransportInitFailed(#[source] TransportError),

    /// Payload does not fit behind the type tag
    #[error("payload too large: {size} bytes, maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Transport rejected a peer registration for a reason other than "already exists"
    #[error("failed to register peer {address}: {source}")]
    RegistrationFailed {
        address: PeerAddress,
        #[source]
        source: TransportError,
    },

    /// Zero-length frame received
    #[error("empty frame")]
    EmptyFrame,

    /// Fixed-size record frame carrying no payload at all
    #[error("{frame_type:?} frame has an empty payload")]
    EmptyPayload { frame_type: FrameType },

    /// Fixed-size record payload longer than the record
    #[error("{frame_type:?} payload of {received} bytes exceeds record size {expected}")]
    SizeMismatch {
        frame_type: FrameType,
        expected: usize,
        received: usize,
    },

    /// No acknowledgment within one attempt's wait window
    ///
    /// Drives the retry inside the reliable send; callers only ever see
    /// `DeliveryFailed`.
    #[error("no ACK for message {id} within {timeout_ms} ms")]
    AckTimeout { id: i32, timeout_ms: u64 },

    /// All reliable-send attempts exhausted
    #[error("message {id} not acknowledged after {attempts} attempts")]
    DeliveryFailed { id: i32, attempts: u32 },

    /// A reliable send is already waiting for its acknowledgment
    #[error("reliable send already in progress for message {pending_id}")]
    SendInProgress { pending_id: i32 },

    /// Transport refused to enqueue a frame
    #[error("send to {address} failed: {source}")]
    SendFailed {
        address: PeerAddress,
        #[source]
        source: TransportError,
    },

    /// Text could not be parsed as a peer address
    #[error("invalid peer address: {0:?}")]
    InvalidAddress(String),

    /// I/O error while setting up a host transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl NowLinkError {
    /// Errors that only ever come from malformed inbound frames
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyFrame | Self::EmptyPayload { .. } | Self::SizeMismatch { .. }
        )
    }
}
