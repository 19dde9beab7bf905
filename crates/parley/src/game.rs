//! Game requests under `/game/`.
//!
//! The broker seats players and forwards moves. It never reads a move.

use parley_protocol::{Packet, topics};
use parley_room::{GameRoom, JoinOutcome, LeaveOutcome, RoomError, Seat};
use parley_session::SessionRegistry;
use parley_transport::ConnectionId;

use crate::signal;

pub(crate) const WAITING_PLAYER: &str = "waiting_player";
pub(crate) const ROOM_FULL: &str = "room_full";
pub(crate) const OPPONENT_LEFT: &str = "opponent_left";

/// Handles a PUBLISH_TEXT whose topic is in the game namespace.
pub(crate) fn handle_game(
    room: &mut GameRoom,
    registry: &SessionRegistry,
    conn: ConnectionId,
    packet: Packet,
) {
    match packet.topic.as_str() {
        topics::GAME_JOIN => join(room, registry, conn),
        topics::GAME_MOVE => match room.opponent_of(conn) {
            Some(opponent) => {
                registry.send(opponent, packet);
            }
            None => tracing::debug!(%conn, state = %room.state(), "ignoring move"),
        },
        other => tracing::debug!(%conn, topic = other, "ignoring unknown game topic"),
    }
}

fn join(room: &mut GameRoom, registry: &SessionRegistry, conn: ConnectionId) {
    match room.join(conn) {
        Ok(JoinOutcome::Waiting { seat1 }) => {
            signal::send_text(registry, seat1, topics::GAME_WAIT, WAITING_PLAYER);
        }
        Ok(JoinOutcome::Started { seat1, seat2 }) => {
            signal::send_text(registry, seat1, topics::GAME_START, Seat::X.mark());
            signal::send_text(registry, seat2, topics::GAME_START, Seat::O.mark());
        }
        Err(RoomError::RoomFull) => {
            signal::send_text(registry, conn, topics::GAME_REJECT, ROOM_FULL);
        }
        Err(e @ RoomError::AlreadySeated(_)) => {
            tracing::debug!(%conn, error = %e, "ignoring repeated join");
        }
    }
}

/// Frees any seat `conn` holds, telling the opponent if a game was running.
pub(crate) fn release_seat(room: &mut GameRoom, registry: &SessionRegistry, conn: ConnectionId) {
    if let Some(LeaveOutcome::Aborted { opponent }) = room.leave(conn) {
        tracing::info!(%conn, %opponent, "game aborted");
        signal::send_text(registry, opponent, topics::GAME_ABORT, OPPONENT_LEFT);
    }
}
