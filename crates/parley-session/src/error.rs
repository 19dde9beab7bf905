//! Error types for the session layer.

use parley_transport::ConnectionId;

/// Errors from session registry operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists for the connection. Normally means it already
    /// disconnected.
    #[error("no session for {0}")]
    NotFound(ConnectionId),

    /// LOGIN arrived with an empty sender field.
    #[error("username must not be empty")]
    MissingUsername,

    /// Another live connection already holds this username.
    #[error("username {0} is already in use")]
    UsernameTaken(String),

    /// The operation needs a bound username.
    #[error("login required")]
    NotLoggedIn(ConnectionId),
}

/// Errors from a [`PresenceStore`](crate::PresenceStore).
///
/// The registry logs these and carries on; persisted lists are a side
/// effect, not part of routing.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("presence store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
