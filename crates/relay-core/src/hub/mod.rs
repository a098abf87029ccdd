//! The broadcast hub: single owner of the live peer set.
//!
//! ```text
//!  accept layer ── register ──┐
//!  inbound pumps ─ broadcast ─┼──► [unbounded channel] ──► Hub loop ──► per-peer bounded queues
//!  inbound pumps ─ unregister ┘                             (one command at a time)
//! ```
//!
//! [`Hub`] is the actor, [`HubHandle`] the cloneable way in.

pub mod actor;
pub mod command;
pub mod handle;

pub use actor::Hub;
pub use command::{HubCommand, HubSnapshot, HubStats};
pub use handle::{HubError, HubHandle};

use tokio::task::JoinHandle;

/// Creates a hub and runs it on a new tokio task.
///
/// The task ends after [`HubHandle::shutdown`] or once every handle is
/// dropped.
pub fn spawn_hub() -> (HubHandle, JoinHandle<()>) {
    let (hub, handle) = Hub::new();
    let task = tokio::spawn(hub.run());
    (handle, task)
}
