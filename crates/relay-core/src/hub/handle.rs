//! Cloneable submission handle for the hub.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::command::{HubCommand, HubSnapshot, HubStats};
use crate::domain::{Frame, PeerId};

/// Returned when a command is submitted after the hub has stopped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    #[error("hub is no longer running")]
    Closed,
}

/// Handle used by the accept layer and by peer pumps to talk to the hub.
///
/// Submissions never wait for delivery: the hub's ingress channel is
/// unbounded, so `register`, `unregister` and `broadcast` return as soon as
/// the command is queued.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
    next_peer_id: Arc<AtomicU64>,
}

impl HubHandle {
    pub(super) fn new(commands: mpsc::UnboundedSender<HubCommand>) -> Self {
        Self {
            commands,
            next_peer_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Returns an id no other peer of this hub has been given.
    pub fn allocate_peer_id(&self) -> PeerId {
        PeerId::new(self.next_peer_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Adds `peer` to the live set.  `queue` must be the only sender of the
    /// peer's outbound queue.
    pub fn register(&self, peer: PeerId, queue: mpsc::Sender<Frame>) -> Result<(), HubError> {
        self.submit(HubCommand::Register { peer, queue })
    }

    /// Removes `peer` and closes its queue.  Safe to call more than once.
    pub fn unregister(&self, peer: PeerId) -> Result<(), HubError> {
        self.submit(HubCommand::Unregister { peer })
    }

    /// Fans `frame` out to every live peer except `sender`.
    pub fn broadcast(&self, sender: PeerId, frame: Frame) -> Result<(), HubError> {
        self.submit(HubCommand::Broadcast { sender, frame })
    }

    /// Closes every peer's queue and stops the hub.
    pub fn shutdown(&self) -> Result<(), HubError> {
        self.submit(HubCommand::Shutdown)
    }

    /// Asks the hub for its live set and counters.
    ///
    /// The answer reflects every command submitted through any handle before
    /// this call was queued.
    pub async fn snapshot(&self) -> Result<HubSnapshot, HubError> {
        let (reply, answer) = oneshot::channel();
        self.submit(HubCommand::Snapshot { reply })?;
        answer.await.map_err(|_| HubError::Closed)
    }

    /// Live peers, sorted by id.
    pub async fn live_peers(&self) -> Result<Vec<PeerId>, HubError> {
        Ok(self.snapshot().await?.live)
    }

    /// The hub's lifetime counters; see [`HubStats`].
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        Ok(self.snapshot().await?.stats)
    }

    /// `true` once the hub loop has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn submit(&self, command: HubCommand) -> Result<(), HubError> {
        self.commands.send(command).map_err(|_| HubError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::spawn_hub;

    #[test]
    fn test_peer_ids_are_unique_across_clones() {
        let (_hub, handle) = crate::hub::Hub::new();
        let clone = handle.clone();

        let a = handle.allocate_peer_id();
        let b = clone.allocate_peer_id();

        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_snapshot_sees_commands_submitted_before_it() {
        // Arrange
        let (handle, _task) = spawn_hub();
        let peer = handle.allocate_peer_id();
        let (tx, _rx) = mpsc::channel(4);

        // Act
        handle.register(peer, tx).expect("register");
        let live = handle.live_peers().await.expect("snapshot");

        // Assert
        assert_eq!(live, vec![peer]);
    }

    #[tokio::test]
    async fn test_submissions_fail_after_shutdown() {
        // Arrange
        let (handle, task) = spawn_hub();

        // Act
        handle.shutdown().expect("shutdown");
        task.await.expect("hub task");

        // Assert
        assert!(handle.is_closed());
        assert_eq!(handle.unregister(PeerId::new(1)), Err(HubError::Closed));
        assert_eq!(handle.snapshot().await, Err(HubError::Closed));
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_live_queue() {
        let (handle, task) = spawn_hub();
        let peer = handle.allocate_peer_id();
        let (tx, mut rx) = mpsc::channel(4);
        handle.register(peer, tx).expect("register");

        handle.shutdown().expect("shutdown");
        task.await.expect("hub task");

        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_snapshot_waits_for_the_hub_and_fails_if_it_goes_away() {
        // Arrange: a hub that is never driven.
        let (hub, handle) = crate::hub::Hub::new();
        let mut snapshot = tokio_test::task::spawn(handle.snapshot());

        // Act / Assert: queued but unanswered.
        tokio_test::assert_pending!(snapshot.poll());

        // Dropping the hub drops the queued reply sender.
        drop(hub);
        assert!(snapshot.is_woken());
        assert_eq!(
            tokio_test::assert_ready!(snapshot.poll()),
            Err(HubError::Closed)
        );
    }
}
