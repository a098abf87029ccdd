//! Per-connection wiring.
//!
//! A peer is two tokio tasks sharing the outbound queue and a done-signal
//! from the outbound task to the inbound one:
//!
//! ```text
//!              ┌──────────── inbound pump ────────────┐
//!  FrameSource ┤ recv → broadcast / refresh deadline  ├──► Hub
//!              └──────────────────────────────────────┘
//!              ┌──────────── outbound pump ───────────┐
//!  FrameSink  ◄┤ queue → batch write | keepalive tick ├◄── Hub (bounded queue)
//!              └──────────────────────────────────────┘
//! ```
//!
//! Lifecycle: `Connected` (both pumps running) → `Draining` (the hub closed
//! the queue; the outbound pump sends a close frame) → `Closed` (both pumps
//! returned, both transport halves dropped).
//!
//! Either pump ending takes the other with it.  The inbound pump unregisters,
//! so the hub closes the queue and the outbound pump drains.  The outbound
//! pump drops its done-signal, so the inbound pump abandons its read.

pub mod inbound;
pub mod outbound;

pub use inbound::{run_inbound, InboundExit};
pub use outbound::{run_outbound, OutboundExit};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{PeerId, RelayConfig};
use crate::hub::{HubError, HubHandle};
use crate::transport::{FrameSink, FrameSource};

/// How both halves of a peer ended.
#[derive(Debug)]
pub struct PeerExit {
    pub peer: PeerId,
    pub inbound: InboundExit,
    pub outbound: OutboundExit,
}

/// Join handles for a running peer.
#[derive(Debug)]
pub struct PeerTasks {
    peer: PeerId,
    inbound: JoinHandle<InboundExit>,
    outbound: JoinHandle<OutboundExit>,
}

impl PeerTasks {
    /// The id the hub knows this peer by.
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Waits for both pumps to finish.
    pub async fn join(self) -> PeerExit {
        let peer = self.peer;
        let inbound = self.inbound.await.unwrap_or_else(|e| {
            warn!(%peer, "inbound pump aborted: {e}");
            InboundExit::Aborted
        });
        let outbound = self.outbound.await.unwrap_or_else(|e| {
            warn!(%peer, "outbound pump aborted: {e}");
            OutboundExit::Aborted
        });
        PeerExit {
            peer,
            inbound,
            outbound,
        }
    }
}

/// Registers a new peer with the hub and starts its two pumps.
///
/// Registration is submitted before either pump starts, so the hub has the
/// peer in its live set before the peer's first frame can arrive.
///
/// # Errors
///
/// Returns [`HubError::Closed`] if the hub has stopped; the transport halves
/// are dropped in that case.
pub fn spawn_peer<S, W>(
    hub: &HubHandle,
    source: S,
    sink: W,
    config: &RelayConfig,
) -> Result<PeerTasks, HubError>
where
    S: FrameSource + 'static,
    W: FrameSink + 'static,
{
    let peer = hub.allocate_peer_id();
    // `mpsc::channel` panics on zero; validated configs never get here with 0.
    let (queue_tx, queue_rx) = mpsc::channel(config.outbound_queue_capacity.max(1));
    hub.register(peer, queue_tx)?;
    debug!(%peer, "peer connected");

    // Dropped with the outbound future, whether it returns or panics.
    let (outbound_alive, outbound_done) = oneshot::channel::<()>();

    let outbound = tokio::spawn({
        let config = config.clone();
        async move {
            let _alive = outbound_alive;
            run_outbound(peer, queue_rx, sink, &config).await
        }
    });
    let inbound = tokio::spawn({
        let hub = hub.clone();
        let config = config.clone();
        async move { run_inbound(peer, source, hub, outbound_done, &config).await }
    });

    Ok(PeerTasks {
        peer,
        inbound,
        outbound,
    })
}
