//! The single two-seat game room.
//!
//! The room only assigns seats and says who the opponent is. It never sees
//! a board: move payloads pass through the broker untouched, and win or
//! legality checks are the clients' business.

use parley_transport::ConnectionId;

use crate::{RoomError, RoomState, Seat};

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The joiner took seat X and is waiting for an opponent.
    Waiting { seat1: ConnectionId },
    /// The joiner took seat O; the game has begun.
    Started {
        seat1: ConnectionId,
        seat2: ConnectionId,
    },
}

/// Result of a seated connection leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The leaver was waiting alone; the room is empty again.
    Reset,
    /// A game was in progress; `opponent` should be told it was aborted.
    Aborted { opponent: ConnectionId },
}

/// The one global game room. Owned by the broker, not a static.
#[derive(Debug, Default)]
pub struct GameRoom {
    state: RoomState,
}

impl GameRoom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    /// Seats `conn`.
    ///
    /// # Errors
    /// - [`RoomError::RoomFull`] — a game is already running
    /// - [`RoomError::AlreadySeated`] — `conn` is the player already waiting
    pub fn join(&mut self, conn: ConnectionId) -> Result<JoinOutcome, RoomError> {
        match self.state {
            RoomState::Empty => {
                self.state = RoomState::Waiting { seat1: conn };
                tracing::info!(%conn, "game seat X taken, waiting for opponent");
                Ok(JoinOutcome::Waiting { seat1: conn })
            }
            RoomState::Waiting { seat1 } if seat1 == conn => {
                Err(RoomError::AlreadySeated(conn))
            }
            RoomState::Waiting { seat1 } => {
                self.state = RoomState::Started { seat1, seat2: conn };
                tracing::info!(%seat1, seat2 = %conn, "game started");
                Ok(JoinOutcome::Started { seat1, seat2: conn })
            }
            RoomState::Started { .. } => Err(RoomError::RoomFull),
        }
    }

    /// The seat a move from `conn` should be relayed to.
    ///
    /// `None` unless a game is running and `conn` holds one of its seats.
    pub fn opponent_of(&self, conn: ConnectionId) -> Option<ConnectionId> {
        match self.state {
            RoomState::Started { seat1, seat2 } if seat1 == conn => Some(seat2),
            RoomState::Started { seat1, seat2 } if seat2 == conn => Some(seat1),
            _ => None,
        }
    }

    /// Releases `conn`'s seat, resetting the room to empty.
    ///
    /// Returns `None` if `conn` wasn't seated (the room is untouched).
    pub fn leave(&mut self, conn: ConnectionId) -> Option<LeaveOutcome> {
        let seat = self.state.seat_of(conn)?;
        let outcome = match (self.state, seat) {
            (RoomState::Started { seat2, .. }, Seat::X) => LeaveOutcome::Aborted { opponent: seat2 },
            (RoomState::Started { seat1, .. }, Seat::O) => LeaveOutcome::Aborted { opponent: seat1 },
            _ => LeaveOutcome::Reset,
        };
        self.state = RoomState::Empty;
        tracing::info!(%conn, %seat, ?outcome, "game reset (player left)");
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    #[test]
    fn test_join_empty_room_waits() {
        let mut room = GameRoom::new();
        assert_eq!(room.join(cid(1)).unwrap(), JoinOutcome::Waiting { seat1: cid(1) });
        assert_eq!(room.state(), RoomState::Waiting { seat1: cid(1) });
    }

    #[test]
    fn test_join_same_connection_twice_is_rejected() {
        let mut room = GameRoom::new();
        room.join(cid(1)).unwrap();
        assert!(matches!(room.join(cid(1)), Err(RoomError::AlreadySeated(c)) if c == cid(1)));
        assert_eq!(room.state(), RoomState::Waiting { seat1: cid(1) });
    }

    #[test]
    fn test_opponent_of_requires_started_game() {
        let mut room = GameRoom::new();
        room.join(cid(1)).unwrap();
        assert_eq!(room.opponent_of(cid(1)), None);

        room.join(cid(2)).unwrap();
        assert_eq!(room.opponent_of(cid(1)), Some(cid(2)));
        assert_eq!(room.opponent_of(cid(2)), Some(cid(1)));
        assert_eq!(room.opponent_of(cid(3)), None);
    }

    #[test]
    fn test_leave_unseated_connection_is_noop() {
        let mut room = GameRoom::new();
        room.join(cid(1)).unwrap();
        assert_eq!(room.leave(cid(2)), None);
        assert_eq!(room.state(), RoomState::Waiting { seat1: cid(1) });
    }

    #[test]
    fn test_leave_while_waiting_resets_without_abort() {
        let mut room = GameRoom::new();
        room.join(cid(1)).unwrap();
        assert_eq!(room.leave(cid(1)), Some(LeaveOutcome::Reset));
        assert_eq!(room.state(), RoomState::Empty);
    }

    #[test]
    fn test_leave_started_game_aborts_for_either_seat() {
        let mut room = GameRoom::new();
        room.join(cid(1)).unwrap();
        room.join(cid(2)).unwrap();
        assert_eq!(room.leave(cid(2)), Some(LeaveOutcome::Aborted { opponent: cid(1) }));
        assert_eq!(room.state(), RoomState::Empty);

        room.join(cid(3)).unwrap();
        room.join(cid(4)).unwrap();
        assert_eq!(room.leave(cid(3)), Some(LeaveOutcome::Aborted { opponent: cid(4) }));
    }
}
