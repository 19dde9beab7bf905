//! Error types for the room layer.

use parley_transport::ConnectionId;

/// Reasons a join doesn't take a seat.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// Both seats are taken and a game is running.
    #[error("room is full")]
    RoomFull,

    /// The connection is already the one waiting in seat X.
    #[error("{0} is already seated")]
    AlreadySeated(ConnectionId),
}
