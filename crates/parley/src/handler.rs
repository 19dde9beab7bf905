//! Per-connection handler: framing, dispatch, and the outbound writer.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register the session with an outbound channel
//!   2. Spawn a writer task that encodes and sends queued packets
//!   3. Loop: receive bytes → decode packets → hand each to the broker
//!   4. On exit, the session guard runs disconnect cleanup

use std::sync::Arc;

use parley_protocol::{FrameBuffer, Packet, decode_unit, encode};
use parley_transport::{Connection, ConnectionId, TransportKind};
use tokio::sync::mpsc;

use crate::server::ServerState;

/// Drop guard that disconnects the session when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async lock.
struct SessionGuard {
    conn_id: ConnectionId,
    state: Arc<ServerState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.broker.lock().await.disconnect(conn_id);
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Connection>(conn: C, state: Arc<ServerState>) {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let kind = conn.kind();
    tracing::debug!(%conn_id, %kind, "handling new connection");

    let (tx, rx) = mpsc::unbounded_channel();
    state.broker.lock().await.connect(conn_id, kind, tx);
    let _guard = SessionGuard {
        conn_id,
        state: Arc::clone(&state),
    };

    // The writer stops once the session is removed and its sender dropped.
    tokio::spawn(write_loop(Arc::clone(&conn), rx));

    let mut frames = FrameBuffer::new(state.codec);
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        match kind {
            TransportKind::Stream => {
                frames.extend(&data);
                loop {
                    match frames.next_packet() {
                        Ok(Some(packet)) => dispatch(&state, conn_id, packet).await,
                        Ok(None) => break,
                        Err(e) => state.broker.lock().await.reject_frame(conn_id, e),
                    }
                }
            }
            TransportKind::Message => match decode_unit(&data, &state.codec) {
                Ok(packet) => dispatch(&state, conn_id, packet).await,
                Err(e) => state.broker.lock().await.reject_frame(conn_id, e),
            },
        }
    }

    // _guard drops here → session disconnect fires.
}

async fn dispatch(state: &ServerState, conn_id: ConnectionId, packet: Packet) {
    tracing::trace!(
        %conn_id,
        kind = %packet.kind,
        message_id = packet.message_id,
        topic = %packet.topic,
        len = packet.payload_len(),
        "packet received"
    );
    state.broker.lock().await.handle(conn_id, packet);
}

/// Drains the outbound channel, one contiguous unit per packet.
async fn write_loop<C: Connection>(conn: Arc<C>, mut rx: mpsc::UnboundedReceiver<Packet>) {
    let conn_id = conn.id();
    while let Some(packet) = rx.recv().await {
        let bytes = encode(&packet);
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "send failed, stopping writer");
            break;
        }
    }
    if let Err(e) = conn.close().await {
        tracing::trace!(%conn_id, error = %e, "close failed");
    }
}
