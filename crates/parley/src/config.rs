//! Broker configuration.
//!
//! Every field has a default so the server starts with zero configuration
//! for local development. Settings come from an optional JSON file named by
//! `PARLEY_CONFIG`, then individual environment variables override it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use parley_protocol::{ChecksumPolicy, CodecConfig, DEFAULT_MAX_PAYLOAD};
use serde::Deserialize;

use crate::ParleyError;

/// Broker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    /// Raw TCP listener (stream transport).
    /// Env: `PARLEY_TCP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub tcp_addr: SocketAddr,

    /// WebSocket listener (message transport).
    /// Env: `PARLEY_WS_ADDR`
    /// Default: `0.0.0.0:8000`
    pub ws_addr: SocketAddr,

    /// Where relayed files are written.
    /// Env: `PARLEY_UPLOAD_DIR`
    /// Default: `./upload`
    pub upload_dir: PathBuf,

    /// Where the online, topic, and user-topic lists live.
    /// Env: `PARLEY_STATE_DIR`
    /// Default: `.`
    pub state_dir: PathBuf,

    /// Largest payload accepted in one packet.
    /// Env: `PARLEY_MAX_PAYLOAD`
    /// Default: 1 MiB
    pub max_payload: usize,

    /// Env: `PARLEY_CHECKSUM` (`warn` / `reject`)
    /// Default: `warn`
    pub checksum_policy: ChecksumPolicy,

    /// Send an ACK after the ERROR for a failed text publish.
    /// Env: `PARLEY_ACK_AFTER_ERROR` (true/false)
    /// Default: `true`
    pub ack_after_publish_error: bool,

    /// Seconds without a chunk before a transfer is discarded (0 = never).
    /// Env: `PARLEY_TRANSFER_IDLE_SECS`
    /// Default: `120`
    pub transfer_idle_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            tcp_addr: ([0, 0, 0, 0], 8080).into(),
            ws_addr: ([0, 0, 0, 0], 8000).into(),
            upload_dir: PathBuf::from("./upload"),
            state_dir: PathBuf::from("."),
            max_payload: DEFAULT_MAX_PAYLOAD,
            checksum_policy: ChecksumPolicy::Warn,
            ack_after_publish_error: true,
            transfer_idle_timeout_secs: 120,
        }
    }
}

impl BrokerConfig {
    /// Loads the file named by `PARLEY_CONFIG` (if set), then applies
    /// environment overrides.
    pub fn load() -> Result<Self, ParleyError> {
        let mut config = match std::env::var("PARLEY_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)?;
                let config = Self::from_json(&raw)?;
                tracing::info!(%path, "loaded configuration file");
                config
            }
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, ParleyError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Overrides fields from `lookup`. Unparseable values are logged and
    /// the previous value kept.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("PARLEY_TCP_ADDR") {
            match addr.parse() {
                Ok(parsed) => self.tcp_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "invalid PARLEY_TCP_ADDR, ignoring"),
            }
        }

        if let Some(addr) = lookup("PARLEY_WS_ADDR") {
            match addr.parse() {
                Ok(parsed) => self.ws_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "invalid PARLEY_WS_ADDR, ignoring"),
            }
        }

        if let Some(path) = lookup("PARLEY_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(path);
        }

        if let Some(path) = lookup("PARLEY_STATE_DIR") {
            self.state_dir = PathBuf::from(path);
        }

        if let Some(val) = lookup("PARLEY_MAX_PAYLOAD") {
            match val.parse() {
                Ok(n) => self.max_payload = n,
                Err(_) => tracing::warn!(value = %val, "invalid PARLEY_MAX_PAYLOAD, ignoring"),
            }
        }

        if let Some(val) = lookup("PARLEY_CHECKSUM") {
            match val.to_ascii_lowercase().as_str() {
                "warn" => self.checksum_policy = ChecksumPolicy::Warn,
                "reject" => self.checksum_policy = ChecksumPolicy::Reject,
                _ => tracing::warn!(value = %val, "invalid PARLEY_CHECKSUM, ignoring"),
            }
        }

        if let Some(val) = lookup("PARLEY_ACK_AFTER_ERROR") {
            self.ack_after_publish_error = val != "false" && val != "0";
        }

        if let Some(val) = lookup("PARLEY_TRANSFER_IDLE_SECS") {
            match val.parse() {
                Ok(n) => self.transfer_idle_timeout_secs = n,
                Err(_) => {
                    tracing::warn!(value = %val, "invalid PARLEY_TRANSFER_IDLE_SECS, ignoring")
                }
            }
        }
    }

    pub fn codec(&self) -> CodecConfig {
        CodecConfig {
            max_payload: self.max_payload,
            checksum_policy: self.checksum_policy,
        }
    }

    /// `None` when the idle sweep is disabled.
    pub fn transfer_idle_timeout(&self) -> Option<Duration> {
        (self.transfer_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.transfer_idle_timeout_secs))
    }
}
