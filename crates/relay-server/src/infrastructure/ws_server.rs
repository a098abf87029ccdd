//! WebSocket server: accept loop and per-connection peer startup.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections.
//! 3. Upgrading each connection to a WebSocket, but only on the configured
//!    path; every other path is answered with `404 Not Found`.
//! 4. Handing the upgraded connection to [`spawn_peer`], which registers it
//!    with the hub and starts its two pumps.
//! 5. Shutting down when the `running` flag is cleared: the accept loop
//!    stops and the hub releases every peer, each of which then receives a
//!    close frame.
//!
//! # Scalability
//!
//! Each connection runs in its own Tokio task, so one slow handshake never
//! delays the next accept.  Everything after the handshake is owned by the
//! peer's pumps in `relay-core`.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use relay_core::{spawn_hub, spawn_peer, HubHandle, RelayConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::domain::ServerConfig;
use crate::infrastructure::ws_transport::{split_websocket, websocket_config};

/// How long one `accept()` may block before the shutdown flag is re-checked.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long [`RelayServer::run`] waits for the hub to stop after shutdown.
const HUB_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection settings shared by every connection task.
#[derive(Debug)]
struct ConnectionSettings {
    socket_path: String,
    relay: RelayConfig,
}

/// A bound listener plus the hub its connections feed into.
pub struct RelayServer {
    listener: TcpListener,
    hub: HubHandle,
    hub_task: JoinHandle<()>,
    settings: Arc<ConnectionSettings>,
}

impl RelayServer {
    /// Validates `config`, binds the listener and starts the hub.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay settings are invalid, the bind address
    /// does not parse, or the port cannot be bound (already in use, missing
    /// permission).
    pub async fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let relay = config.relay_config().context("invalid [relay] configuration")?;
        let addr = config.bind_addr().context("invalid [server] configuration")?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {addr}"))?;

        let (hub, hub_task) = spawn_hub();

        Ok(Self {
            listener,
            hub,
            hub_task,
            settings: Arc::new(ConnectionSettings {
                socket_path: config.server.socket_path.clone(),
                relay,
            }),
        })
    }

    /// The address actually bound (useful when the configured port is 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the OS cannot report the socket's local address.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("failed to read listener address")
    }

    /// A handle to the hub, e.g. for status checks.
    pub fn hub(&self) -> HubHandle {
        self.hub.clone()
    }

    /// Accepts connections until `running` is set to `false`, then shuts the
    /// hub down.
    ///
    /// Accept errors are logged and the loop keeps serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub task ended abnormally or did not stop
    /// within five seconds of the shutdown request.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let Self {
            listener,
            hub,
            hub_task,
            settings,
        } = self;

        match listener.local_addr() {
            Ok(addr) => info!("relay listening on ws://{addr}{}", settings.socket_path),
            Err(e) => warn!("relay listening (address unavailable: {e})"),
        }

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    debug!("new TCP connection from {peer_addr}");
                    let hub = hub.clone();
                    let settings = Arc::clone(&settings);
                    tokio::spawn(async move {
                        handle_connection(stream, peer_addr, hub, settings).await;
                    });
                }
                Ok(Err(e)) => {
                    // Transient (e.g. too many open files); keep serving.
                    error!("accept error: {e}");
                }
                Err(_) => {}
            }
        }

        drop(listener);
        if hub.shutdown().is_err() {
            debug!("hub already stopped");
        }
        match timeout(HUB_STOP_TIMEOUT, hub_task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e).context("hub task ended abnormally"),
            Err(_) => anyhow::bail!("hub did not stop within {HUB_STOP_TIMEOUT:?}"),
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Logs the outcome of [`run_connection`].  Entry point of each connection
/// task.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: HubHandle,
    settings: Arc<ConnectionSettings>,
) {
    if let Err(e) = run_connection(stream, peer_addr, hub, settings).await {
        debug!("connection {peer_addr} ended before joining the relay: {e:#}");
    }
}

/// Completes the handshake, starts the peer and waits for it to finish.
async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: HubHandle,
    settings: Arc<ConnectionSettings>,
) -> anyhow::Result<()> {
    let socket_path = settings.socket_path.clone();
    let check_path = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let path = request.uri().path();
        if path == socket_path {
            Ok(response)
        } else {
            Err(not_found(path))
        }
    };

    let ws_stream = accept_hdr_async_with_config(
        stream,
        check_path,
        Some(websocket_config(settings.relay.max_frame_size)),
    )
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (source, sink) = split_websocket(ws_stream);
    let tasks = spawn_peer(&hub, source, sink, &settings.relay)
        .with_context(|| format!("cannot admit {peer_addr}"))?;
    let peer = tasks.peer();
    info!("{peer} joined from {peer_addr}");

    let exit = tasks.join().await;
    info!(
        "{peer} ({peer_addr}) left: inbound={:?}, outbound={:?}",
        exit.inbound, exit.outbound
    );
    Ok(())
}

fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("no WebSocket endpoint at {path}")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_response_has_404_status() {
        let response = not_found("/elsewhere");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.body().as_deref(),
            Some("no WebSocket endpoint at /elsewhere")
        );
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_relay_settings() {
        let mut config = ServerConfig::default();
        config.relay.outbound_queue_capacity = 0;

        let result = RelayServer::bind(&config).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_bind_on_port_zero_reports_real_port() {
        // Arrange
        let mut config = ServerConfig::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 0;

        // Act
        let server = RelayServer::bind(&config).await.expect("bind");

        // Assert
        assert_ne!(server.local_addr().expect("addr").port(), 0);
    }

    #[tokio::test]
    async fn test_run_returns_and_stops_hub_when_flag_cleared() {
        // Arrange
        let mut config = ServerConfig::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 0;
        let server = RelayServer::bind(&config).await.expect("bind");
        let hub = server.hub();
        let running = Arc::new(AtomicBool::new(false));

        // Act
        server.run(running).await.expect("run");

        // Assert
        assert!(hub.snapshot().await.is_err(), "hub must be stopped");
    }

    #[tokio::test]
    async fn test_run_reports_a_hub_that_ended_abnormally() {
        // Arrange
        let mut config = ServerConfig::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 0;
        let server = RelayServer::bind(&config).await.expect("bind");
        server.hub_task.abort();
        let running = Arc::new(AtomicBool::new(false));

        // Act
        let result = server.run(running).await;

        // Assert
        let err = result.expect_err("aborted hub must surface");
        assert!(err.to_string().contains("hub task ended abnormally"));
    }
}
