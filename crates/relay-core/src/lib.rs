//! # relay-core
//!
//! The fan-out core of the relay: every frame a connected peer sends is
//! delivered to every other connected peer.
//!
//! This crate has no sockets.  It is driven through the [`transport`]
//! contract, which the server crate implements over WebSockets and which
//! [`transport::mock`] implements in memory for tests.
//!
//! # Architecture overview
//!
//! ```text
//!   accept layer ──spawn_peer──► Peer ─┬─ inbound pump ──broadcast/unregister──► Hub
//!                                      └─ outbound pump ◄──── bounded queue ──── Hub
//! ```
//!
//! - **`hub`** – one task owns the live peer set and applies register,
//!   unregister and broadcast commands strictly one at a time.  A peer whose
//!   queue is full when a broadcast arrives is evicted immediately.
//! - **`peer`** – two tasks per connection: the inbound pump reads frames and
//!   enforces the liveness deadline and size limit; the outbound pump batches
//!   queued frames onto the wire and sends keepalive probes.
//! - **`domain`** – plain types: [`RelayConfig`], [`Frame`], [`PeerId`].
//! - **`transport`** – the connection contract ([`FrameSource`],
//!   [`FrameSink`]).
//!
//! No lock guards any shared state: the live set belongs to the hub task and
//! each outbound queue has exactly one producer (the hub) and one consumer
//! (the peer's outbound pump).

pub mod domain;
pub mod hub;
pub mod peer;
pub mod transport;

pub use domain::{Frame, FrameKind, PeerId, RelayConfig};
pub use hub::{spawn_hub, Hub, HubError, HubHandle, HubSnapshot, HubStats};
pub use peer::{spawn_peer, InboundExit, OutboundExit, PeerExit, PeerTasks};
pub use transport::{CloseCode, ControlFrame, FrameSink, FrameSource, Incoming, TransportError};
