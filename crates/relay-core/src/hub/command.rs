//! Messages accepted by the hub's serialization loop.

use tokio::sync::{mpsc, oneshot};

use crate::domain::{Frame, PeerId};

/// One operation submitted to the hub.
///
/// Commands are processed strictly one at a time, in the order the hub
/// receives them.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a peer to the live set.  `queue` is the only sending half of the
    /// peer's outbound queue; the hub closes the queue by dropping it.
    Register {
        peer: PeerId,
        queue: mpsc::Sender<Frame>,
    },
    /// Remove a peer and close its queue.  No-op if the peer is not live.
    Unregister { peer: PeerId },
    /// Fan `frame` out to every live peer except `sender`.
    Broadcast { sender: PeerId, frame: Frame },
    /// Report the live set and counters.
    Snapshot { reply: oneshot::Sender<HubSnapshot> },
    /// Close every queue and stop the loop.
    Shutdown,
}

/// Counters kept by the hub loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Register commands applied.
    pub registered: u64,
    /// Peers removed by an Unregister (duplicates are not counted).
    pub unregistered: u64,
    /// Peers removed because a broadcast found their queue full or gone.
    pub evicted: u64,
    /// Broadcast commands processed.
    pub broadcasts: u64,
    /// Frames successfully placed on outbound queues.
    pub frames_enqueued: u64,
}

/// Point-in-time view of the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSnapshot {
    /// Live peers, sorted by id.
    pub live: Vec<PeerId>,
    pub stats: HubStats,
}
