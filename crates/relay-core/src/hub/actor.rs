//! The hub's serialization loop.
//!
//! # Why an actor? (for beginners)
//!
//! Many tasks want to touch the set of connected peers at once: new
//! connections register, departing ones unregister, and every inbound frame
//! must be fanned out to everybody.  Instead of guarding a shared map with a
//! lock, the map is owned by exactly one task, the [`Hub`], and everybody else
//! sends it commands over a channel.  The hub applies one command at a time,
//! so no two mutations can ever interleave and no lock is needed.
//!
//! # Backpressure
//!
//! Each peer's outbound queue is bounded.  The hub never waits for space:
//! it uses `try_send`, and a peer whose queue is full is evicted on the spot.
//! A slow consumer therefore costs the broadcaster nothing and cannot make the
//! hub buffer unbounded memory on its behalf.

use std::collections::HashMap;
use std::ops::ControlFlow;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::command::{HubCommand, HubSnapshot, HubStats};
use super::handle::HubHandle;
use crate::domain::{Frame, PeerId};

/// Owner of the live peer set.
///
/// Build one with [`Hub::new`] and drive it with [`Hub::run`] (or use
/// [`spawn_hub`](super::spawn_hub), which does both).
pub struct Hub {
    commands: mpsc::UnboundedReceiver<HubCommand>,
    /// Live set: a peer is in here iff its outbound queue is open.  Dropping
    /// the stored sender is what closes the queue.
    live: HashMap<PeerId, mpsc::Sender<Frame>>,
    stats: HubStats,
}

impl Hub {
    /// Creates a hub and the handle used to submit commands to it.
    pub fn new() -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            commands: rx,
            live: HashMap::new(),
            stats: HubStats::default(),
        };
        (hub, HubHandle::new(tx))
    }

    /// Processes commands until [`HubCommand::Shutdown`] arrives or every
    /// handle has been dropped.
    ///
    /// Nothing a peer can do ends this loop: full queues, unknown peers and
    /// duplicate unregisters are all ordinary branches of [`Hub::apply`].
    pub async fn run(mut self) {
        info!("hub started");

        while let Some(command) = self.commands.recv().await {
            if self.apply(command).is_break() {
                break;
            }
        }

        self.release_all();
        info!(
            registered = self.stats.registered,
            evicted = self.stats.evicted,
            broadcasts = self.stats.broadcasts,
            "hub stopped"
        );
    }

    /// Applies one command.  Returns `Break` only for `Shutdown`.
    pub fn apply(&mut self, command: HubCommand) -> ControlFlow<()> {
        match command {
            HubCommand::Register { peer, queue } => self.register(peer, queue),
            HubCommand::Unregister { peer } => self.unregister(peer),
            HubCommand::Broadcast { sender, frame } => self.broadcast(sender, frame),
            HubCommand::Snapshot { reply } => {
                // The asker may have given up waiting; nothing to do then.
                let _ = reply.send(self.snapshot());
            }
            HubCommand::Shutdown => {
                info!(live = self.live.len(), "hub shutting down");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Current live set (sorted) and counters.
    pub fn snapshot(&self) -> HubSnapshot {
        let mut live: Vec<PeerId> = self.live.keys().copied().collect();
        live.sort_unstable();
        HubSnapshot {
            live,
            stats: self.stats,
        }
    }

    fn register(&mut self, peer: PeerId, queue: mpsc::Sender<Frame>) {
        self.stats.registered += 1;
        if self.live.insert(peer, queue).is_some() {
            // The replaced sender is dropped, which closes the old queue.
            warn!(%peer, "peer registered twice; previous queue closed");
        } else {
            debug!(%peer, live = self.live.len(), "peer registered");
        }
    }

    fn unregister(&mut self, peer: PeerId) {
        match self.live.remove(&peer) {
            Some(_queue) => {
                self.stats.unregistered += 1;
                debug!(%peer, live = self.live.len(), "peer unregistered");
            }
            None => debug!(%peer, "unregister for peer that is not live (ignored)"),
        }
    }

    fn broadcast(&mut self, sender: PeerId, frame: Frame) {
        self.stats.broadcasts += 1;

        let mut enqueued = 0u64;
        let mut evicted = 0u64;

        self.live.retain(|&peer, queue| {
            if peer == sender {
                return true;
            }
            match queue.try_send(frame.clone()) {
                Ok(()) => {
                    enqueued += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(%peer, "outbound queue full; evicting slow peer");
                    evicted += 1;
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    // The peer's outbound pump already exited (write failure).
                    debug!(%peer, "outbound queue has no reader; dropping peer");
                    evicted += 1;
                    false
                }
            }
        });

        self.stats.frames_enqueued += enqueued;
        self.stats.evicted += evicted;
        debug!(%sender, len = frame.len(), enqueued, evicted, "broadcast");
    }

    fn release_all(&mut self) {
        // Dropping every sender closes every queue; each outbound pump then
        // sends a close frame and exits.
        self.live.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Registers a fresh peer with a queue of `capacity` and returns its id
    /// plus the receiving half the peer's outbound pump would own.
    fn add_peer(hub: &mut Hub, handle: &HubHandle, capacity: usize) -> (PeerId, mpsc::Receiver<Frame>) {
        let peer = handle.allocate_peer_id();
        let (tx, rx) = mpsc::channel(capacity);
        let _ = hub.apply(HubCommand::Register { peer, queue: tx });
        (peer, rx)
    }

    fn broadcast(hub: &mut Hub, sender: PeerId, frame: Frame) {
        let _ = hub.apply(HubCommand::Broadcast { sender, frame });
    }

    #[test]
    fn test_broadcast_reaches_every_peer_except_sender() {
        // Arrange
        let (mut hub, handle) = Hub::new();
        let (a, mut a_rx) = add_peer(&mut hub, &handle, 4);
        let (_b, mut b_rx) = add_peer(&mut hub, &handle, 4);
        let (_c, mut c_rx) = add_peer(&mut hub, &handle, 4);

        // Act
        broadcast(&mut hub, a, Frame::text("hi"));

        // Assert
        assert_eq!(b_rx.try_recv().ok(), Some(Frame::text("hi")));
        assert_eq!(c_rx.try_recv().ok(), Some(Frame::text("hi")));
        assert!(b_rx.try_recv().is_err(), "exactly one copy");
        assert!(a_rx.try_recv().is_err(), "sender must not hear its own frame");
    }

    #[test]
    fn test_empty_payload_is_not_echoed() {
        let (mut hub, handle) = Hub::new();
        let (a, mut a_rx) = add_peer(&mut hub, &handle, 4);
        let (_b, mut b_rx) = add_peer(&mut hub, &handle, 4);

        broadcast(&mut hub, a, Frame::binary(Vec::new()));

        assert!(a_rx.try_recv().is_err());
        assert_eq!(b_rx.try_recv().ok(), Some(Frame::binary(Vec::new())));
    }

    #[test]
    fn test_frames_from_one_sender_keep_their_order() {
        let (mut hub, handle) = Hub::new();
        let (a, _a_rx) = add_peer(&mut hub, &handle, 8);
        let (_b, mut b_rx) = add_peer(&mut hub, &handle, 8);

        for text in ["1", "2", "3"] {
            broadcast(&mut hub, a, Frame::text(text));
        }

        let received: Vec<Frame> = std::iter::from_fn(|| b_rx.try_recv().ok()).collect();
        assert_eq!(
            received,
            vec![Frame::text("1"), Frame::text("2"), Frame::text("3")]
        );
    }

    #[test]
    fn test_unregister_closes_queue_and_removes_peer() {
        // Arrange
        let (mut hub, handle) = Hub::new();
        let (a, mut a_rx) = add_peer(&mut hub, &handle, 4);

        // Act
        let _ = hub.apply(HubCommand::Unregister { peer: a });

        // Assert
        assert!(hub.snapshot().live.is_empty());
        assert!(matches!(
            a_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(hub.snapshot().stats.unregistered, 1);
    }

    #[test]
    fn test_duplicate_and_unknown_unregister_are_noops() {
        // Arrange
        let (mut hub, handle) = Hub::new();
        let (a, _a_rx) = add_peer(&mut hub, &handle, 4);
        let (b, mut b_rx) = add_peer(&mut hub, &handle, 4);
        let stranger = handle.allocate_peer_id();

        // Act
        let _ = hub.apply(HubCommand::Unregister { peer: a });
        let _ = hub.apply(HubCommand::Unregister { peer: a });
        let _ = hub.apply(HubCommand::Unregister { peer: stranger });

        // Assert: b is untouched and still receives broadcasts.
        let snapshot = hub.snapshot();
        assert_eq!(snapshot.live, vec![b]);
        assert_eq!(snapshot.stats.unregistered, 1);
        broadcast(&mut hub, stranger, Frame::text("still here"));
        assert_eq!(b_rx.try_recv().ok(), Some(Frame::text("still here")));
    }

    #[test]
    fn test_full_queue_evicts_peer_and_drops_only_that_copy() {
        // Arrange: b has room for exactly one frame and never reads.
        let (mut hub, handle) = Hub::new();
        let (a, _a_rx) = add_peer(&mut hub, &handle, 4);
        let (b, mut b_rx) = add_peer(&mut hub, &handle, 1);
        let (c, mut c_rx) = add_peer(&mut hub, &handle, 4);
        broadcast(&mut hub, a, Frame::text("first"));

        // Act: second broadcast finds b's queue full.
        broadcast(&mut hub, a, Frame::text("second"));

        // Assert
        let snapshot = hub.snapshot();
        assert_eq!(snapshot.live, vec![a, c]);
        assert_eq!(snapshot.stats.evicted, 1);
        assert!(!snapshot.live.contains(&b));

        // b keeps what was already queued, then sees the queue closed.
        assert_eq!(b_rx.try_recv().ok(), Some(Frame::text("first")));
        assert!(matches!(
            b_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        // c got both frames.
        assert_eq!(c_rx.try_recv().ok(), Some(Frame::text("first")));
        assert_eq!(c_rx.try_recv().ok(), Some(Frame::text("second")));
    }

    #[test]
    fn test_unregister_after_eviction_is_noop() {
        let (mut hub, handle) = Hub::new();
        let (a, _a_rx) = add_peer(&mut hub, &handle, 4);
        let (b, _b_rx) = add_peer(&mut hub, &handle, 1);
        broadcast(&mut hub, a, Frame::text("fill"));
        broadcast(&mut hub, a, Frame::text("overflow"));

        // The inbound pump of b now reports its own departure.
        let _ = hub.apply(HubCommand::Unregister { peer: b });

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.live, vec![a]);
        assert_eq!(snapshot.stats.evicted, 1);
        assert_eq!(snapshot.stats.unregistered, 0);
    }

    #[test]
    fn test_peer_whose_reader_is_gone_is_dropped_on_broadcast() {
        let (mut hub, handle) = Hub::new();
        let (a, _a_rx) = add_peer(&mut hub, &handle, 4);
        let (_b, b_rx) = add_peer(&mut hub, &handle, 4);
        drop(b_rx);

        broadcast(&mut hub, a, Frame::text("anyone?"));

        assert_eq!(hub.snapshot().live, vec![a]);
    }

    #[test]
    fn test_register_same_id_twice_closes_previous_queue() {
        let (mut hub, handle) = Hub::new();
        let peer = handle.allocate_peer_id();
        let (old_tx, mut old_rx) = mpsc::channel(1);
        let (new_tx, _new_rx) = mpsc::channel(1);

        let _ = hub.apply(HubCommand::Register { peer, queue: old_tx });
        let _ = hub.apply(HubCommand::Register { peer, queue: new_tx });

        assert_eq!(hub.snapshot().live, vec![peer]);
        assert!(matches!(
            old_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_shutdown_breaks_the_loop() {
        let (mut hub, _handle) = Hub::new();
        assert!(hub.apply(HubCommand::Shutdown).is_break());
    }

    #[test]
    fn test_stats_count_broadcasts_and_enqueued_frames() {
        let (mut hub, handle) = Hub::new();
        let (a, _a_rx) = add_peer(&mut hub, &handle, 4);
        let (_b, _b_rx) = add_peer(&mut hub, &handle, 4);
        let (_c, _c_rx) = add_peer(&mut hub, &handle, 4);

        broadcast(&mut hub, a, Frame::text("x"));
        broadcast(&mut hub, a, Frame::text("y"));

        let stats = hub.snapshot().stats;
        assert_eq!(stats.registered, 3);
        assert_eq!(stats.broadcasts, 2);
        assert_eq!(stats.frames_enqueued, 4);
    }
}
