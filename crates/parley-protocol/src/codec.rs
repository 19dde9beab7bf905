//! Byte layout, encoding, and stream framing.
//!
//! Every packet is a fixed 90-byte header followed by `payloadLength` raw
//! payload bytes. Integers are little-endian with no padding:
//!
//! ```text
//! offset size field
//!      0    4 type
//!      4    4 payloadLength
//!      8    4 messageId
//!     12    8 timestamp
//!     20    1 version
//!     21    1 flags
//!     22   32 sender  (NUL-padded)
//!     54   32 topic   (NUL-padded)
//!     86    4 checksum (XOR-fold of payload bytes, 0 when empty)
//! ```
//!
//! [`decode`] is the pure, stateless entry point. [`FrameBuffer`] wraps it
//! for stream transports, where one read may hold a partial header, a
//! partial payload, or several packets back to back.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::types::{ChecksumPolicy, Flags, MessageType, NAME_CAPACITY, Packet};
use crate::ProtocolError;

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 4 + 4 + 4 + 8 + 1 + 1 + NAME_CAPACITY * 2 + 4;

/// Default cap on a single packet's payload.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Decoder limits and validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Largest `payloadLength` accepted before any payload is buffered.
    pub max_payload: usize,
    pub checksum_policy: ChecksumPolicy,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
            checksum_policy: ChecksumPolicy::Warn,
        }
    }
}

/// XOR-fold of the payload bytes.
pub fn checksum(payload: &[u8]) -> u32 {
    payload.iter().fold(0u32, |acc, b| acc ^ u32::from(*b))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes a packet as one contiguous header + payload unit.
pub fn encode(packet: &Packet) -> Bytes {
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + packet.payload_len());
    encode_into(packet, &mut dst);
    dst.freeze()
}

/// Appends the encoded packet to `dst`.
pub fn encode_into(packet: &Packet, dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE + packet.payload_len());
    dst.put_u32_le(packet.kind.into());
    dst.put_u32_le(packet.payload_len() as u32);
    dst.put_u32_le(packet.message_id);
    dst.put_u64_le(packet.timestamp);
    dst.put_u8(packet.version);
    dst.put_u8(packet.flags.bits());
    put_name(dst, &packet.sender);
    put_name(dst, &packet.topic);
    dst.put_u32_le(checksum(&packet.payload));
    dst.put_slice(&packet.payload);
}

/// Writes a NUL-padded fixed-width name, truncated on a char boundary so
/// at least one terminating NUL always remains.
fn put_name(dst: &mut BytesMut, name: &str) {
    let text = truncate_name(name);
    dst.put_slice(text.as_bytes());
    dst.put_bytes(0, NAME_CAPACITY - text.len());
}

/// Returns the longest prefix of `name` that fits a header name field.
pub fn truncate_name(name: &str) -> &str {
    let limit = NAME_CAPACITY - 1;
    if name.len() <= limit {
        return name;
    }
    let mut end = limit;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Reads a NUL-terminated name field.
///
/// Invalid UTF-8 becomes U+FFFD, so such a name is not re-encoded with its
/// original bytes.
fn read_name(field: &[u8]) -> String {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes one packet from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` doesn't yet hold a whole packet, or
/// `Ok(Some((packet, consumed)))` on success. An oversized `payloadLength`
/// is rejected as soon as the header is visible, before any payload is
/// buffered.
pub fn decode(
    buf: &[u8],
    config: &CodecConfig,
) -> Result<Option<(Packet, usize)>, ProtocolError> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = &buf[..HEADER_SIZE];
    let raw_kind = header.get_u32_le();
    let payload_len = header.get_u32_le();
    let message_id = header.get_u32_le();
    let timestamp = header.get_u64_le();
    let version = header.get_u8();
    let flags = Flags::from_bits(header.get_u8());
    let sender = read_name(&header[..NAME_CAPACITY]);
    header.advance(NAME_CAPACITY);
    let topic = read_name(&header[..NAME_CAPACITY]);
    header.advance(NAME_CAPACITY);
    let wire_checksum = header.get_u32_le();

    if payload_len as usize > config.max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            message_id,
            declared: payload_len,
            max: config.max_payload,
        });
    }

    let frame_len = HEADER_SIZE + payload_len as usize;
    if buf.len() < frame_len {
        return Ok(None);
    }

    let kind = MessageType::try_from(raw_kind).map_err(|raw| {
        ProtocolError::InvalidMessageType {
            raw,
            message_id,
            frame_len,
        }
    })?;

    let payload = &buf[HEADER_SIZE..frame_len];
    let actual = checksum(payload);
    if actual != wire_checksum {
        match config.checksum_policy {
            ChecksumPolicy::Warn => {
                tracing::warn!(
                    message_id,
                    expected = wire_checksum,
                    actual,
                    "checksum mismatch, accepting packet"
                );
            }
            ChecksumPolicy::Reject => {
                return Err(ProtocolError::ChecksumMismatch {
                    message_id,
                    expected: wire_checksum,
                    actual,
                    frame_len,
                });
            }
        }
    }

    let packet = Packet {
        kind,
        message_id,
        timestamp,
        version,
        flags,
        sender,
        topic,
        payload: Bytes::copy_from_slice(payload),
    };
    Ok(Some((packet, frame_len)))
}

/// Decodes a message-transport unit, which must hold a whole packet.
///
/// Bytes past the end of the packet are ignored.
pub fn decode_unit(
    unit: &[u8],
    config: &CodecConfig,
) -> Result<Packet, ProtocolError> {
    match decode(unit, config)? {
        Some((packet, consumed)) => {
            if consumed < unit.len() {
                tracing::debug!(
                    extra = unit.len() - consumed,
                    "ignoring trailing bytes after packet"
                );
            }
            Ok(packet)
        }
        None => Err(ProtocolError::Truncated {
            message_id: header_message_id(unit),
            needed: needed_len(unit),
            available: unit.len(),
        }),
    }
}

/// The message ID of a buffer holding at least a whole header.
fn header_message_id(buf: &[u8]) -> Option<u32> {
    if buf.len() < HEADER_SIZE {
        return None;
    }
    let mut id_field = &buf[8..12];
    Some(id_field.get_u32_le())
}

/// Bytes needed for the packet at the front of an incomplete buffer.
fn needed_len(buf: &[u8]) -> usize {
    if buf.len() < 8 {
        return HEADER_SIZE;
    }
    let mut len_field = &buf[4..8];
    HEADER_SIZE + len_field.get_u32_le() as usize
}

// ---------------------------------------------------------------------------
// FrameBuffer
// ---------------------------------------------------------------------------

/// Reassembles packets from a byte stream.
///
/// Feed it every read with [`extend`](Self::extend), then drain it with
/// [`next_packet`](Self::next_packet) until that returns `Ok(None)`.
/// Errors never desynchronise the stream: a bad frame is stepped over, and
/// an oversized payload is discarded as it arrives without being buffered.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    /// Payload bytes of a rejected oversized frame still to be discarded.
    skip: usize,
    config: CodecConfig,
}

impl FrameBuffer {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(HEADER_SIZE * 4),
            skip: 0,
            config,
        }
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        if self.skip > 0 {
            let n = self.skip.min(data.len());
            self.skip -= n;
            self.buf.extend_from_slice(&data[n..]);
        } else {
            self.buf.extend_from_slice(data);
        }
    }

    /// Returns the next complete packet, `Ok(None)` if more bytes are
    /// needed, or the error for the frame just stepped over.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        if self.skip > 0 {
            return Ok(None);
        }
        match decode(&self.buf, &self.config) {
            Ok(Some((packet, consumed))) => {
                self.buf.advance(consumed);
                Ok(Some(packet))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                match &err {
                    ProtocolError::PayloadTooLarge { declared, .. } => {
                        self.buf.advance(HEADER_SIZE);
                        let pending = *declared as usize;
                        let buffered = pending.min(self.buf.len());
                        self.buf.advance(buffered);
                        self.skip = pending - buffered;
                    }
                    ProtocolError::InvalidMessageType { frame_len, .. }
                    | ProtocolError::ChecksumMismatch { frame_len, .. } => {
                        self.buf.advance(*frame_len);
                    }
                    ProtocolError::Truncated { .. } => {}
                }
                Err(err)
            }
        }
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
