//! # Parley
//!
//! Real-time topic broker over raw TCP and WebSocket.
//!
//! Clients log in with a username, subscribe to topics, publish text to a
//! topic or a single user, relay files in chunks, and play a two-player
//! game whose moves the broker forwards without inspecting. Everything
//! travels in one binary packet format (see [`parley_protocol`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::prelude::*;
//!
//! # async fn run() -> Result<(), ParleyError> {
//! let server = ParleyServer::builder()
//!     .config(BrokerConfig::load()?)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`parley_transport`]: TCP and WebSocket listeners behind one trait
//! - [`parley_protocol`]: packet codec and stream framing
//! - [`parley_session`]: session registry and persisted presence lists
//! - [`parley_room`]: the single game room
//! - this crate: request dispatch, routing, file relay, and the server

mod broker;
mod config;
mod error;
mod game;
mod handler;
mod request;
mod router;
mod server;
mod signal;
mod transfer;

pub use broker::Broker;
pub use config::BrokerConfig;
pub use error::{BrokerError, ParleyError};
pub use request::Request;
pub use router::Route;
pub use server::{ParleyServer, ParleyServerBuilder};
pub use transfer::{
    DiskStore, FileStore, MemoryFileStore, Sink, TransferKey, TransferTable, resolve_filename,
};

/// Everything needed to run a broker or talk to one.
pub mod prelude {
    pub use crate::{
        Broker, BrokerConfig, BrokerError, DiskStore, FileStore, MemoryFileStore, ParleyError,
        ParleyServer, ParleyServerBuilder,
    };
    pub use parley_protocol::{
        ChecksumPolicy, CodecConfig, Flags, FrameBuffer, MessageType, Packet, decode, encode,
        topics,
    };
    pub use parley_room::{GameRoom, RoomState, Seat};
    pub use parley_session::{FlatFileStore, MemoryStore, PresenceStore};
    pub use parley_transport::{ConnectionId, TransportKind};
}
