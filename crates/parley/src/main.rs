//! # parley-server
//!
//! Runs the Parley broker: raw TCP on one port, WebSocket on another,
//! configured from `PARLEY_CONFIG` and `PARLEY_*` environment variables.

use parley::{BrokerConfig, ParleyServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley=debug")),
        )
        .init();

    info!("Starting Parley broker v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = BrokerConfig::load()?;
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Bind listeners and serve
    // -----------------------------------------------------------------------
    let server = ParleyServer::builder().config(config).build().await?;
    info!(
        tcp = %server.tcp_addr()?,
        ws = %server.ws_addr()?,
        "Listening"
    );

    server.run().await?;
    Ok(())
}
