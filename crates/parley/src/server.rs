//! `ParleyServer` builder and server loop.
//!
//! This is the entry point for running a Parley broker. It ties together
//! all the layers: transport → protocol → broker (sessions, transfers,
//! game room).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parley_protocol::{CodecConfig, HEADER_SIZE};
use parley_session::{FlatFileStore, PresenceStore};
use parley_transport::{TcpTransport, Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::broker::Broker;
use crate::config::BrokerConfig;
use crate::handler::handle_connection;
use crate::transfer::{DiskStore, FileStore};
use crate::ParleyError;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The one
/// mutex serialises every request against the registry, the transfer
/// table, and the game room.
pub(crate) struct ServerState {
    pub(crate) broker: Mutex<Broker>,
    pub(crate) codec: CodecConfig,
}

/// Builder for configuring and starting a Parley server.
///
/// # Example
///
/// ```rust,ignore
/// use parley::prelude::*;
///
/// let server = ParleyServer::builder()
///     .config(BrokerConfig::load()?)
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct ParleyServerBuilder {
    config: BrokerConfig,
    presence: Option<Box<dyn PresenceStore>>,
    files: Option<Box<dyn FileStore>>,
}

impl ParleyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: BrokerConfig::default(),
            presence: None,
            files: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address of the raw TCP listener.
    pub fn tcp_addr(mut self, addr: SocketAddr) -> Self {
        self.config.tcp_addr = addr;
        self
    }

    /// Sets the address of the WebSocket listener.
    pub fn ws_addr(mut self, addr: SocketAddr) -> Self {
        self.config.ws_addr = addr;
        self
    }

    /// Uses `store` for presence lists instead of files in `state_dir`.
    pub fn presence_store(mut self, store: impl PresenceStore) -> Self {
        self.presence = Some(Box::new(store));
        self
    }

    /// Uses `store` for relayed files instead of `upload_dir`.
    pub fn file_store(mut self, store: impl FileStore) -> Self {
        self.files = Some(Box::new(store));
        self
    }

    /// Opens the stores, truncates the presence lists, and binds both
    /// listeners.
    pub async fn build(self) -> Result<ParleyServer, ParleyError> {
        let config = self.config;

        let presence = match self.presence {
            Some(store) => store,
            None => Box::new(FlatFileStore::new(&config.state_dir)?),
        };
        let files = match self.files {
            Some(store) => store,
            None => Box::new(DiskStore::new(&config.upload_dir)?),
        };

        let mut broker = Broker::new(presence, files)
            .with_ack_after_publish_error(config.ack_after_publish_error);
        broker.registry_mut().reset_store()?;

        let tcp = TcpTransport::bind(&config.tcp_addr.to_string()).await?;
        let ws = WebSocketTransport::bind(&config.ws_addr.to_string())
            .await?
            .with_max_message_size(HEADER_SIZE.saturating_add(config.max_payload));

        let state = Arc::new(ServerState {
            broker: Mutex::new(broker),
            codec: config.codec(),
        });

        Ok(ParleyServer {
            tcp,
            ws,
            state,
            idle_timeout: config.transfer_idle_timeout(),
        })
    }
}

impl Default for ParleyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Parley broker.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ParleyServer {
    tcp: TcpTransport,
    ws: WebSocketTransport,
    state: Arc<ServerState>,
    idle_timeout: Option<Duration>,
}

impl ParleyServer {
    /// Creates a new builder.
    pub fn builder() -> ParleyServerBuilder {
        ParleyServerBuilder::new()
    }

    /// Returns the address the TCP listener is bound to.
    pub fn tcp_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Returns the address the WebSocket listener is bound to.
    pub fn ws_addr(&self) -> std::io::Result<SocketAddr> {
        self.ws.local_addr()
    }

    /// Runs both accept loops and the idle transfer sweep.
    ///
    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), ParleyError> {
        tracing::info!("Parley broker running");

        if let Some(idle) = self.idle_timeout {
            tokio::spawn(sweep_loop(Arc::clone(&self.state), idle));
        }

        let ws = tokio::spawn(accept_loop(self.ws, Arc::clone(&self.state)));
        let tcp = tokio::spawn(accept_loop(self.tcp, self.state));
        let (ws, tcp) = tokio::join!(ws, tcp);
        for result in [ws, tcp] {
            if let Err(e) = result {
                tracing::error!(error = %e, "accept loop stopped");
            }
        }
        Ok(())
    }
}

/// Accepts connections and spawns a handler task for each.
async fn accept_loop<T: Transport>(mut transport: T, state: Arc<ServerState>) {
    loop {
        match transport.accept().await {
            Ok(conn) => {
                let state = Arc::clone(&state);
                tokio::spawn(handle_connection(conn, state));
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}

/// Periodically discards transfers that stopped receiving chunks.
async fn sweep_loop(state: Arc<ServerState>, idle: Duration) {
    let mut ticker = tokio::time::interval((idle / 2).max(Duration::from_secs(1)));
    loop {
        ticker.tick().await;
        let expired = state.broker.lock().await.sweep_idle_transfers(idle);
        if expired > 0 {
            tracing::info!(expired, "idle file transfers discarded");
        }
    }
}
