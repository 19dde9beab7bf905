//! Seats and the room lifecycle state machine.

use std::fmt;

use parley_transport::ConnectionId;

/// One of the two fixed slots in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seat {
    /// First to join; moves first.
    X,
    /// Second to join.
    O,
}

impl Seat {
    /// The mark sent to the client in its `/game/start` notice.
    pub fn mark(self) -> &'static str {
        match self {
            Self::X => "X",
            Self::O => "O",
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mark())
    }
}

/// The lifecycle state of the single game room.
///
/// ```text
/// Empty ──join──→ Waiting ──join (other conn)──→ Started
///   ↑                │                              │
///   └──── leave ─────┴────────── leave ─────────────┘
/// ```
///
/// - **Empty**: nobody seated.
/// - **Waiting**: seat X taken, waiting for an opponent.
/// - **Started**: both seats taken; moves are relayed between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomState {
    #[default]
    Empty,
    Waiting {
        seat1: ConnectionId,
    },
    Started {
        seat1: ConnectionId,
        seat2: ConnectionId,
    },
}

impl RoomState {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }

    /// Which seat `conn` occupies, if any.
    pub fn seat_of(&self, conn: ConnectionId) -> Option<Seat> {
        match *self {
            Self::Empty => None,
            Self::Waiting { seat1 } => (seat1 == conn).then_some(Seat::X),
            Self::Started { seat1, seat2 } => {
                if seat1 == conn {
                    Some(Seat::X)
                } else if seat2 == conn {
                    Some(Seat::O)
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Waiting { .. } => write!(f, "Waiting"),
            Self::Started { .. } => write!(f, "Started"),
        }
    }
}
