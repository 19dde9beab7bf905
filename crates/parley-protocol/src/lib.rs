//! Wire protocol for Parley.
//!
//! This crate defines the binary packet that clients and the broker
//! exchange:
//!
//! - **Types** ([`Packet`], [`MessageType`], [`Flags`], reserved
//!   [`topics`]) — the logical packet value.
//! - **Codec** ([`encode`], [`decode`], [`decode_unit`], [`FrameBuffer`]) —
//!   the fixed-header byte layout and stream framing.
//! - **Errors** ([`ProtocolError`]) — malformed or oversized frames.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Packet) → Broker (routing, files, game)
//! ```
//!
//! The protocol layer holds no connection state. Stream transports keep
//! one [`FrameBuffer`] per connection; message transports call
//! [`decode_unit`] on each inbound unit.

mod codec;
mod error;
mod types;

pub use codec::{
    CodecConfig, DEFAULT_MAX_PAYLOAD, FrameBuffer, HEADER_SIZE, checksum,
    decode, decode_unit, encode, encode_into, truncate_name,
};
pub use error::ProtocolError;
pub use types::{
    ChecksumPolicy, Flags, MessageType, NAME_CAPACITY, PROTOCOL_VERSION,
    Packet, topics, unix_now,
};
