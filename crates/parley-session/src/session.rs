//! Session types: the broker's record of one live connection.
//!
//! A session tracks:
//! - WHICH connection it belongs to (`ConnectionId`)
//! - WHO is on the other end, once they log in (`username`)
//! - WHAT topics they receive group publishes for
//! - HOW packets reach them (an outbound channel drained by the
//!   connection's writer task)

use std::collections::HashSet;

use parley_protocol::Packet;
use parley_transport::{ConnectionId, TransportKind};
use tokio::sync::mpsc;

/// Channel sender for delivering outbound packets to a connection.
///
/// Unbounded so delivery never blocks a handler; the writer task applies
/// the transport's own backpressure.
pub type PacketSender = mpsc::UnboundedSender<Packet>;

/// One live connection's state.
#[derive(Debug)]
pub struct Session {
    /// The connection this session belongs to.
    pub id: ConnectionId,

    /// Bound username. Empty until LOGIN.
    pub username: String,

    /// Topics this session receives group publishes on.
    pub topics: HashSet<String>,

    /// Framing kind of the underlying transport. Never affects routing.
    pub kind: TransportKind,

    outbound: PacketSender,
}

impl Session {
    pub(crate) fn new(id: ConnectionId, kind: TransportKind, outbound: PacketSender) -> Self {
        Self {
            id,
            username: String::new(),
            topics: HashSet::new(),
            kind,
            outbound,
        }
    }

    /// Returns `true` once a username has been bound.
    pub fn is_logged_in(&self) -> bool {
        !self.username.is_empty()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    /// Queues a packet for the writer task. Returns `false` if the
    /// connection is already gone.
    pub fn send(&self, packet: Packet) -> bool {
        self.outbound.send(packet).is_ok()
    }
}

/// What a session held when it logged out or disconnected.
///
/// Downstream cleanup (persisted lists, game seat, transfers) runs off this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departed {
    pub id: ConnectionId,
    /// `None` if the session never logged in.
    pub username: Option<String>,
    pub topics: HashSet<String>,
}
