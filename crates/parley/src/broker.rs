//! The broker core: all shared state and per-request dispatch.
//!
//! [`Broker`] owns the session registry, the transfer table, and the game
//! room. Every method is synchronous and runs to completion; the server
//! serialises calls through one mutex, so each request sees and leaves a
//! consistent snapshot. Replies are queued on the recipients' outbound
//! channels and written by their connection tasks.

use std::time::Duration;

use parley_protocol::{Packet, ProtocolError, topics};
use parley_room::GameRoom;
use parley_session::{PacketSender, PresenceStore, SessionRegistry};
use parley_transport::{ConnectionId, TransportKind};

use crate::request::Request;
use crate::transfer::{FileStore, TransferTable};
use crate::{BrokerError, game, router, signal};

/// Shared broker state.
pub struct Broker {
    registry: SessionRegistry,
    transfers: TransferTable,
    room: GameRoom,
    /// Follow a failed text publish's ERROR with an ACK.
    ack_after_publish_error: bool,
}

impl Broker {
    pub fn new(presence: Box<dyn PresenceStore>, files: Box<dyn FileStore>) -> Self {
        Self {
            registry: SessionRegistry::new(presence),
            transfers: TransferTable::new(files),
            room: GameRoom::new(),
            ack_after_publish_error: true,
        }
    }

    pub fn with_ack_after_publish_error(mut self, enabled: bool) -> Self {
        self.ack_after_publish_error = enabled;
        self
    }

    /// Registers a new connection whose outbound packets go to `outbound`.
    pub fn connect(&mut self, conn: ConnectionId, kind: TransportKind, outbound: PacketSender) {
        self.registry.on_connect(conn, kind, outbound);
    }

    /// Handles one decoded packet from `conn`.
    pub fn handle(&mut self, conn: ConnectionId, packet: Packet) {
        let message_id = packet.message_id;
        let request = match Request::try_from(packet) {
            Ok(request) => request,
            Err(e) => {
                signal::error(&self.registry, conn, message_id, &e);
                return;
            }
        };

        match request {
            Request::Login { username } => {
                let result = self.login(conn, &username);
                signal::reply(&self.registry, conn, message_id, result);
            }
            Request::Logout => {
                let result = self.logout(conn);
                signal::reply(&self.registry, conn, message_id, result);
            }
            Request::Subscribe { topic } => {
                let result = self
                    .registry
                    .subscribe(conn, &topic)
                    .map(drop)
                    .map_err(BrokerError::from);
                signal::reply(&self.registry, conn, message_id, result);
            }
            Request::Unsubscribe { topic } => {
                let result = self
                    .registry
                    .unsubscribe(conn, &topic)
                    .map(drop)
                    .map_err(BrokerError::from);
                signal::reply(&self.registry, conn, message_id, result);
            }
            Request::Publish(packet) => self.publish(conn, packet),
            Request::AnnounceFile(packet) => {
                let result = self.transfers.announce(&self.registry, conn, &packet);
                signal::reply(&self.registry, conn, message_id, result);
            }
            Request::FileData(packet) => {
                let result = self.transfers.write_chunk(&self.registry, conn, &packet);
                signal::reply(&self.registry, conn, message_id, result);
            }
        }
    }

    /// Reports a frame that couldn't be decoded.
    ///
    /// The reply echoes the frame's message ID when the header was
    /// readable, otherwise 0.
    pub fn reject_frame(&mut self, conn: ConnectionId, err: ProtocolError) {
        let message_id = err.message_id().unwrap_or(0);
        tracing::warn!(%conn, message_id, error = %err, "rejected frame");
        let err = match err {
            ProtocolError::InvalidMessageType { raw, .. } => BrokerError::InvalidMessageType(raw),
            other => BrokerError::Protocol(other),
        };
        signal::error(&self.registry, conn, message_id, &err);
    }

    /// Cleans up after a closed connection: game seat, transfers, then the
    /// session itself.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        game::release_seat(&mut self.room, &self.registry, conn);
        let abandoned = self.transfers.discard_from(conn);
        if let Some(departed) = self.registry.on_disconnect(conn) {
            tracing::debug!(
                %conn,
                username = ?departed.username,
                topics = departed.topics.len(),
                abandoned,
                "connection cleaned up"
            );
        }
    }

    /// Drops transfers idle for at least `idle`. Returns how many.
    pub fn sweep_idle_transfers(&mut self, idle: Duration) -> usize {
        self.transfers.expire_idle(idle)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SessionRegistry {
        &mut self.registry
    }

    pub fn transfers(&self) -> &TransferTable {
        &self.transfers
    }

    pub fn room(&self) -> &GameRoom {
        &self.room
    }

    fn login(&mut self, conn: ConnectionId, username: &str) -> Result<(), BrokerError> {
        self.registry.bind_username(conn, username)?;
        Ok(())
    }

    /// Logging out gives up the game seat and every subscription; the
    /// connection itself stays open.
    fn logout(&mut self, conn: ConnectionId) -> Result<(), BrokerError> {
        game::release_seat(&mut self.room, &self.registry, conn);
        self.registry.logout(conn)?;
        Ok(())
    }

    /// PUBLISH_TEXT: user list query, game request, or an ordinary publish.
    ///
    /// An ordinary publish that fails gets its ERROR followed by an ACK
    /// unless `ack_after_publish_error` is off.
    fn publish(&mut self, conn: ConnectionId, packet: Packet) {
        let message_id = packet.message_id;

        if packet.topic == topics::GET_USERS {
            router::send_user_list(&self.registry, conn);
            signal::ack(&self.registry, conn, message_id);
            return;
        }
        if packet.is_game() {
            game::handle_game(&mut self.room, &self.registry, conn, packet);
            signal::ack(&self.registry, conn, message_id);
            return;
        }

        match router::publish_text(&self.registry, conn, &packet) {
            Ok(()) => signal::ack(&self.registry, conn, message_id),
            Err(e) => {
                signal::error(&self.registry, conn, message_id, &e);
                if self.ack_after_publish_error {
                    signal::ack(&self.registry, conn, message_id);
                }
            }
        }
    }
}
