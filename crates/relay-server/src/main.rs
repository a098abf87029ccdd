//! Fan-out relay server: entry point.
//!
//! Accepts WebSocket connections on one path and relays every message a
//! client sends to every other connected client.
//!
//! # Usage
//!
//! ```text
//! relay-server [OPTIONS]
//!
//! Options:
//!   --config <FILE>       TOML configuration file
//!   --bind <ADDR>         IP address to bind to       [file default: 0.0.0.0]
//!   --port <PORT>         WebSocket listener port      [file default: 3000]
//!   --path <PATH>         WebSocket endpoint path      [file default: /socket]
//!   --log-level <FILTER>  Log filter when RUST_LOG is unset [file default: info]
//! ```
//!
//! # Precedence
//!
//! Command-line flags beat environment variables, which beat the config file,
//! which beats the built-in defaults.
//!
//! | Variable            | Flag          |
//! |---------------------|---------------|
//! | `RELAY_CONFIG`      | `--config`    |
//! | `RELAY_BIND`        | `--bind`      |
//! | `RELAY_PORT`        | `--port`      |
//! | `RELAY_SOCKET_PATH` | `--path`      |
//! | `RELAY_LOG`         | `--log-level` |

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_server::domain::{load_config, ServerConfig};
use relay_server::infrastructure::RelayServer;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Fan-out relay over WebSockets.
#[derive(Debug, Parser)]
#[command(
    name = "relay-server",
    about = "Relays every WebSocket message to all other connected clients",
    version
)]
struct Cli {
    /// TOML configuration file.  Without it, built-in defaults apply.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the listener to.
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// TCP port for the WebSocket listener.
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// HTTP path that accepts the WebSocket upgrade.
    #[arg(long, env = "RELAY_SOCKET_PATH")]
    path: Option<String>,

    /// `tracing` filter used when `RUST_LOG` is not set (e.g. `debug`).
    #[arg(long, env = "RELAY_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file (if any) and applies the flag overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if `--config` names a file that cannot be read or
    /// parsed.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = self.path {
            config.server.socket_path = path;
        }
        if let Some(level) = self.log_level {
            config.server.log_level = level;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_server_config()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let server = RelayServer::bind(&config).await?;
    info!(
        "fan-out relay starting: addr={}, path={}",
        server.local_addr()?,
        config.server.socket_path
    );

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    server.run(running).await?;

    info!("fan-out relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
