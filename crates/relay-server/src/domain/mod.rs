//! Domain layer for relay-server: configuration only.
//!
//! Relay semantics live in `relay-core`; this layer just describes how an
//! operator spells them in a file.

pub mod config;

pub use config::{load_config, ServerConfig, ServerConfigError};
