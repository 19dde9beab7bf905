//! Error types for the Parley broker.

use parley_protocol::ProtocolError;
use parley_session::{SessionError, StoreError};
use parley_transport::TransportError;

/// Why a single request failed.
///
/// Every variant is reported to the originating connection as an ERROR
/// packet whose payload is the `Display` text. None of them close the
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Private target is not a bound username.
    #[error("user {0} does not exist or is offline")]
    UserUnavailable(String),

    /// Group publish to a topic the publisher hasn't subscribed to.
    #[error("not subscribed to topic {0}")]
    NotSubscribed(String),

    /// Group publish or announce with nobody to deliver to.
    #[error("topic {0} has no subscribers")]
    NoSubscribers(String),

    /// A data chunk whose transfer was never announced or already finished.
    #[error("no file transfer in progress for message {0}")]
    TransferNotFound(u32),

    /// The destination file could not be opened.
    #[error("cannot create file {filename} on server: {source}")]
    SinkUnavailable {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    /// The request's type is not one a client may send.
    #[error("invalid message type {0}")]
    InvalidMessageType(u32),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Login, subscribe, and unsubscribe failures.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Top-level error that wraps all crate-specific errors.
///
/// Returned by server setup and the connection handler. Request-level
/// failures use [`BrokerError`] instead and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The presence store couldn't be opened or reset.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file couldn't be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_error_display_is_error_payload() {
        let err = BrokerError::UserUnavailable("bob".into());
        assert_eq!(err.to_string(), "user bob does not exist or is offline");

        let err = BrokerError::TransferNotFound(42);
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_broker_error_from_session_error_is_transparent() {
        let err: BrokerError = SessionError::UsernameTaken("alice".into()).into();
        assert!(matches!(err, BrokerError::Session(_)));
        assert_eq!(err.to_string(), "username alice is already in use");
    }

    #[test]
    fn test_from_transport_error() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let parley_err: ParleyError = TransportError::AcceptFailed(io).into();
        assert!(matches!(parley_err, ParleyError::Transport(_)));
        assert!(parley_err.to_string().contains("port taken"));
    }

    #[test]
    fn test_from_store_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let parley_err: ParleyError = StoreError::from(io).into();
        assert!(matches!(parley_err, ParleyError::Store(_)));
    }

    #[test]
    fn test_from_config_error() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let parley_err: ParleyError = err.into();
        assert!(parley_err.to_string().starts_with("invalid configuration"));
    }
}
