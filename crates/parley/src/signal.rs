//! ACK and ERROR replies.

use parley_protocol::Packet;
use parley_session::SessionRegistry;
use parley_transport::ConnectionId;

use crate::BrokerError;

pub(crate) fn ack(registry: &SessionRegistry, conn: ConnectionId, message_id: u32) {
    registry.send(conn, Packet::ack(message_id));
}

/// Reports `err` to `conn`, echoing the request's message ID.
pub(crate) fn error(
    registry: &SessionRegistry,
    conn: ConnectionId,
    message_id: u32,
    err: &BrokerError,
) {
    tracing::debug!(%conn, message_id, error = %err, "request failed");
    registry.send(conn, Packet::error(message_id, err.to_string()));
}

/// ACK on success, ERROR otherwise.
pub(crate) fn reply(
    registry: &SessionRegistry,
    conn: ConnectionId,
    message_id: u32,
    result: Result<(), BrokerError>,
) {
    match result {
        Ok(()) => ack(registry, conn, message_id),
        Err(e) => error(registry, conn, message_id, &e),
    }
}

/// Sends a broker-originated PUBLISH_TEXT to one connection.
pub(crate) fn send_text(registry: &SessionRegistry, conn: ConnectionId, topic: &str, text: &str) {
    registry.send(conn, Packet::text(topic, text));
}
