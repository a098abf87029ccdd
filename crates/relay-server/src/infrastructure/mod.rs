//! Infrastructure layer for relay-server.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener and running the accept loop
//! - Performing the WebSocket upgrade handshake on the configured path
//! - Adapting tungstenite streams to the relay's transport contract
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Fan-out, backpressure and liveness (that is `relay-core`)
//! - Configuration parsing (that is the domain layer)

pub mod ws_server;
pub mod ws_transport;

pub use ws_server::RelayServer;
