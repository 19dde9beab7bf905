//! Logical packet types for Parley's wire format.
//!
//! A [`Packet`] is what the rest of the broker works with. The byte layout
//! lives in [`codec`](crate::codec); nothing here knows about offsets or
//! byte order.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Version byte stamped on every packet this implementation sends.
pub const PROTOCOL_VERSION: u8 = 1;

/// Capacity of the fixed `sender` and `topic` header fields, including the
/// terminating NUL. At most `NAME_CAPACITY - 1` bytes of text survive.
pub const NAME_CAPACITY: usize = 32;

/// Reserved topic names.
///
/// Anything starting with [`GAME_PREFIX`](topics::GAME_PREFIX) is handed
/// to game matchmaking instead of the pub/sub router.
pub mod topics {
    /// Query for the online user list (inbound).
    pub const GET_USERS: &str = "/sys/get_users";
    /// Reply carrying the online user list (outbound).
    pub const USER_LIST: &str = "/sys/user_list";

    /// Namespace prefix for everything game-related.
    pub const GAME_PREFIX: &str = "/game/";
    pub const GAME_JOIN: &str = "/game/join";
    pub const GAME_MOVE: &str = "/game/move";
    pub const GAME_START: &str = "/game/start";
    pub const GAME_WAIT: &str = "/game/wait";
    pub const GAME_REJECT: &str = "/game/reject";
    pub const GAME_ABORT: &str = "/game/abort";
}

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// The closed set of packet types. Numbering starts at 1 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Login = 1,
    Logout = 2,
    Subscribe = 3,
    Unsubscribe = 4,
    PublishText = 5,
    PublishFile = 6,
    FileData = 7,
    Error = 8,
    Ack = 9,
}

impl TryFrom<u32> for MessageType {
    type Error = u32;

    /// Returns the raw value back when it names no known type.
    fn try_from(raw: u32) -> Result<Self, u32> {
        Ok(match raw {
            1 => Self::Login,
            2 => Self::Logout,
            3 => Self::Subscribe,
            4 => Self::Unsubscribe,
            5 => Self::PublishText,
            6 => Self::PublishFile,
            7 => Self::FileData,
            8 => Self::Error,
            9 => Self::Ack,
            other => return Err(other),
        })
    }
}

impl From<MessageType> for u32 {
    fn from(kind: MessageType) -> u32 {
        kind as u32
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::PublishText => "PUBLISH_TEXT",
            Self::PublishFile => "PUBLISH_FILE",
            Self::FileData => "FILE_DATA",
            Self::Error => "ERROR",
            Self::Ack => "ACK",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Packet flag bitset.
///
/// Unknown bits are preserved so a relayed packet leaves exactly as it
/// arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Self = Self(0);
    /// Topic field holds a target username.
    pub const PRIVATE: Self = Self(0x01);
    /// Topic field holds a topic name.
    pub const GROUP: Self = Self(0x02);
    /// Packet belongs to a file transfer.
    pub const FILE: Self = Self(0x04);
    /// Final chunk of a file transfer.
    pub const LAST: Self = Self(0x08);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// ChecksumPolicy
// ---------------------------------------------------------------------------

/// What the decoder does when a payload's checksum doesn't match the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Log a warning and accept the packet.
    #[default]
    Warn,
    /// Drop the packet and report a protocol error.
    Reject,
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One logical packet.
///
/// The wire header also carries `payloadLength` and `checksum`; both are
/// pure functions of `payload` and are computed by the encoder rather than
/// stored here, so a `Packet` can never disagree with its own payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: MessageType,
    /// Correlates a request with its ACK/ERROR and groups file chunks.
    pub message_id: u32,
    /// Seconds since the Unix epoch, as stamped by the sender.
    pub timestamp: u64,
    pub version: u8,
    pub flags: Flags,
    pub sender: String,
    /// Target username (private), topic name (group), or a reserved name.
    pub topic: String,
    pub payload: Bytes,
}

impl Packet {
    /// Creates an empty packet of the given type, stamped with the current
    /// time and [`PROTOCOL_VERSION`].
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            message_id: 0,
            timestamp: unix_now(),
            version: PROTOCOL_VERSION,
            flags: Flags::NONE,
            sender: String::new(),
            topic: String::new(),
            payload: Bytes::new(),
        }
    }

    /// An empty acknowledgement for `message_id`.
    pub fn ack(message_id: u32) -> Self {
        Self::new(MessageType::Ack).with_message_id(message_id)
    }

    /// An error reply for `message_id` with a human-readable reason.
    pub fn error(message_id: u32, reason: impl Into<String>) -> Self {
        Self::new(MessageType::Error)
            .with_message_id(message_id)
            .with_payload(reason.into())
    }

    /// A broker-originated text message on `topic`.
    pub fn text(topic: &str, text: impl Into<String>) -> Self {
        Self::new(MessageType::PublishText)
            .with_topic(topic)
            .with_payload(text.into())
    }

    pub fn with_message_id(mut self, message_id: u32) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_sender(mut self, sender: &str) -> Self {
        self.sender = sender.to_string();
        self
    }

    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = topic.to_string();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_private(&self) -> bool {
        self.flags.contains(Flags::PRIVATE)
    }

    pub fn is_last(&self) -> bool {
        self.flags.contains(Flags::LAST)
    }

    /// Returns `true` if the topic lies in the reserved game namespace.
    pub fn is_game(&self) -> bool {
        self.topic.starts_with(topics::GAME_PREFIX)
    }

    /// The payload as text, with invalid UTF-8 replaced.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Current wall-clock time in whole seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
