//! Two-player game matchmaking for Parley.
//!
//! There is exactly one room, and it is plain owned state rather than a
//! global: the broker holds a [`GameRoom`] value and passes joins, moves,
//! and departures through it. The room hands out seats X and O and
//! answers "who is my opponent"; the game's rules stay on the clients.
//!
//! # Key types
//!
//! - [`GameRoom`] — the seat-assignment state machine
//! - [`RoomState`] — `Empty → Waiting → Started`
//! - [`Seat`] — X (first) or O (second)
//! - [`JoinOutcome`] / [`LeaveOutcome`] — what the broker must announce

mod error;
mod room;
mod state;

pub use error::RoomError;
pub use room::{GameRoom, JoinOutcome, LeaveOutcome};
pub use state::{RoomState, Seat};
