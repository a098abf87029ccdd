//! relay-server library crate.
//!
//! Puts the fan-out relay from `relay-core` behind a WebSocket endpoint.
//!
//! # Architecture
//!
//! ```text
//! Browser / client (WebSocket, ws://host:3000/socket)
//!         ↕
//! [relay-server]
//!   ├── domain/           ServerConfig (TOML) → RelayConfig
//!   └── infrastructure/
//!         ├── ws_server/    accept loop, handshake path check, shutdown
//!         └── ws_transport/ tungstenite ↔ FrameSource / FrameSink
//!         ↕
//! [relay-core]  Hub + per-peer pumps
//! ```
//!
//! # Layer rules
//!
//! - `domain` performs no network I/O.
//! - `infrastructure` depends on `domain`, `relay-core`, `tokio` and
//!   `tokio-tungstenite`.

pub mod domain;
pub mod infrastructure;
