//! TOML configuration for the relay server.
//!
//! Every field has a serde default, so an empty file (or a missing section)
//! yields the same settings as running with no file at all:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 3000
//! socket_path = "/socket"
//! log_level = "info"
//!
//! [relay]
//! liveness_timeout_secs = 60
//! # probe_period_secs = 54      # defaults to 9/10 of the liveness timeout
//! max_frame_size = 10000
//! outbound_queue_capacity = 256
//! write_deadline_secs = 10
//! ```
//!
//! # Serde default values (for beginners)
//!
//! `#[serde(default = "some_fn")]` makes serde call `some_fn()` when the field
//! is absent from the file, and `#[serde(default)]` on a whole section uses
//! that section's `Default` impl.  Operators therefore only write the lines
//! they want to change.

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::domain::config::{
    probe_period_for, DEFAULT_LIVENESS_TIMEOUT, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_OUTBOUND_QUEUE_CAPACITY, DEFAULT_WRITE_DEADLINE,
};
use relay_core::domain::{ConfigError, RelayConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for loading and interpreting the configuration file.
#[derive(Debug, Error)]
pub enum ServerConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `server.bind_address` is not an IP address.
    #[error("invalid bind address '{address}': {source}")]
    BindAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },

    /// The `[relay]` values violate a relay invariant.
    #[error("invalid relay settings: {0}")]
    Invalid(#[from] ConfigError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub relay: RelaySection,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSection {
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port for the WebSocket listener.
    #[serde(default = "default_port")]
    pub port: u16,
    /// HTTP path that accepts the WebSocket upgrade.  Every other path is
    /// answered with 404.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Peer tunables, in operator-friendly units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelaySection {
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,
    /// Absent means 9/10 of `liveness_timeout_secs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_period_secs: Option<u64>,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    #[serde(default = "default_write_deadline_secs")]
    pub write_deadline_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_socket_path() -> String {
    "/socket".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_liveness_timeout_secs() -> u64 {
    DEFAULT_LIVENESS_TIMEOUT.as_secs()
}
fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}
fn default_outbound_queue_capacity() -> usize {
    DEFAULT_OUTBOUND_QUEUE_CAPACITY
}
fn default_write_deadline_secs() -> u64 {
    DEFAULT_WRITE_DEADLINE.as_secs()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            socket_path: default_socket_path(),
            log_level: default_log_level(),
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            liveness_timeout_secs: default_liveness_timeout_secs(),
            probe_period_secs: None,
            max_frame_size: default_max_frame_size(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            write_deadline_secs: default_write_deadline_secs(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl ServerConfig {
    /// Converts the `[relay]` section into a validated [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ServerConfigError::Invalid`] if the values break a relay
    /// invariant (for example a probe period not shorter than the timeout).
    pub fn relay_config(&self) -> Result<RelayConfig, ServerConfigError> {
        let relay = &self.relay;
        let liveness_timeout = Duration::from_secs(relay.liveness_timeout_secs);
        let probe_period = relay
            .probe_period_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| probe_period_for(liveness_timeout));

        let config = RelayConfig {
            liveness_timeout,
            probe_period,
            max_frame_size: relay.max_frame_size,
            outbound_queue_capacity: relay.outbound_queue_capacity,
            write_deadline: Duration::from_secs(relay.write_deadline_secs),
        };
        config.validate()?;
        Ok(config)
    }

    /// Socket address the listener binds to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerConfigError::BindAddress`] if `bind_address` is not an
    /// IPv4 or IPv6 address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ServerConfigError> {
        let ip: IpAddr =
            self.server
                .bind_address
                .parse()
                .map_err(|source| ServerConfigError::BindAddress {
                    address: self.server.bind_address.clone(),
                    source,
                })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}

/// Reads and parses the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ServerConfigError::Io`] if the file cannot be read and
/// [`ServerConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ServerConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ServerConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ServerConfig = toml::from_str(&content)?;
    Ok(config)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
