//! Connection session management for Parley.
//!
//! This crate owns the per-connection state the broker routes on:
//!
//! 1. **Sessions** — one per live connection ([`Session`]), with its bound
//!    username, subscribed topics, and outbound packet channel
//! 2. **Registry** — the single owner of all sessions
//!    ([`SessionRegistry`]), answering membership queries for routing
//! 3. **Presence persistence** — the flat online/topic/mapping lists
//!    ([`PresenceStore`]), updated as a side effect of login, logout,
//!    subscribe, and unsubscribe
//!
//! # How it fits in the stack
//!
//! ```text
//! Broker (above)  ← routes packets using registry membership
//!     ↕
//! Session Layer (this crate)  ← who is connected, who subscribes to what
//!     ↕
//! Protocol / Transport (below)  ← Packet, ConnectionId
//! ```

mod error;
mod registry;
mod session;
mod store;

pub use error::{SessionError, StoreError};
pub use registry::SessionRegistry;
pub use session::{Departed, PacketSender, Session};
pub use store::{
    FlatFileStore, MemoryStore, ONLINE_FILE, PresenceStore,
    TOPICS_FILE, USER_TOPICS_FILE,
};
