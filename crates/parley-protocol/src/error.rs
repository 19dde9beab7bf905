//! Error types for the protocol layer.

/// Errors raised while turning bytes into a [`Packet`](crate::Packet).
///
/// Every variant is local to one connection. Where the header could be
/// read, the variant keeps its `message_id` so the broker can correlate
/// the error reply, and `frame_len` so the frame buffer can step past it.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The header declares a payload larger than the configured cap.
    #[error("payload of {declared} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge {
        message_id: u32,
        declared: u32,
        max: usize,
    },

    /// The header's type field names no known message type.
    #[error("unknown message type {raw}")]
    InvalidMessageType {
        raw: u32,
        message_id: u32,
        frame_len: usize,
    },

    /// The payload checksum disagrees with the header (reject policy only).
    #[error("checksum mismatch: header {expected:#x}, payload {actual:#x}")]
    ChecksumMismatch {
        message_id: u32,
        expected: u32,
        actual: u32,
        frame_len: usize,
    },

    /// A message-transport unit ended before the packet did.
    ///
    /// `message_id` is set once the unit holds a whole header.
    #[error("truncated packet: need {needed} bytes, got {available}")]
    Truncated {
        message_id: Option<u32>,
        needed: usize,
        available: usize,
    },
}

impl ProtocolError {
    /// The offending packet's message ID, if its header was readable.
    pub fn message_id(&self) -> Option<u32> {
        match self {
            Self::PayloadTooLarge { message_id, .. }
            | Self::InvalidMessageType { message_id, .. }
            | Self::ChecksumMismatch { message_id, .. } => Some(*message_id),
            Self::Truncated { message_id, .. } => *message_id,
        }
    }
}
