//! Domain layer: plain data types shared by the hub and the peer pumps.
//!
//! Nothing in here performs I/O or depends on the async runtime, so every type
//! can be built and tested in isolation.

pub mod config;
pub mod frame;
pub mod peer_id;

pub use config::{ConfigError, RelayConfig};
pub use frame::{Frame, FrameKind};
pub use peer_id::PeerId;
