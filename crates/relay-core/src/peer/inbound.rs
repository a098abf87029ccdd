//! Inbound pump: transport → hub.
//!
//! Reads frames off the connection and submits each one to the hub as a
//! broadcast.  This is the one place a peer's departure is reported: every
//! exit path, clean or not, ends with an Unregister.
//!
//! The pump also stops as soon as the outbound pump does.  A connection whose
//! write side has failed, timed out or been released is finished, and
//! reading from it further would only relay frames from a peer nobody can
//! answer.

use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::domain::{PeerId, RelayConfig};
use crate::hub::HubHandle;
use crate::transport::{FrameSource, Incoming, TransportError};

/// Why an inbound pump stopped.
#[derive(Debug)]
pub enum InboundExit {
    /// The transport closed or failed.
    Disconnected(TransportError),
    /// No probe-response arrived within the liveness timeout.
    LivenessTimeout,
    /// The peer sent a frame above the size limit.
    FrameTooLarge { size: usize, limit: usize },
    /// The hub has stopped; there is nobody left to relay to.
    HubUnavailable,
    /// The outbound pump stopped, taking the connection with it.
    OutboundClosed,
    /// The pump task panicked or was cancelled.
    Aborted,
}

/// Runs the inbound pump for `peer` until the connection ends.
///
/// The read deadline starts at `liveness_timeout` and is pushed forward by
/// every probe-response.  `outbound_done` resolves (its sender is dropped)
/// when the peer's outbound pump has finished; the read is abandoned then.
/// On return the peer has been unregistered and the source half released.
pub async fn run_inbound<S>(
    peer: PeerId,
    mut source: S,
    hub: HubHandle,
    outbound_done: oneshot::Receiver<()>,
    config: &RelayConfig,
) -> InboundExit
where
    S: FrameSource,
{
    let exit = pump_frames(peer, &mut source, &hub, outbound_done, config).await;

    match &exit {
        InboundExit::Disconnected(e) if e.is_expected_disconnect() => {
            debug!(%peer, "peer disconnected: {e}");
        }
        InboundExit::Disconnected(e) => warn!(%peer, "read error: {e}"),
        InboundExit::LivenessTimeout => info!(
            %peer,
            "no probe response within {:?}; dropping peer",
            config.liveness_timeout
        ),
        InboundExit::FrameTooLarge { size, limit } => {
            warn!(%peer, "inbound frame of {size} bytes exceeds {limit}; closing");
        }
        InboundExit::HubUnavailable => debug!(%peer, "hub stopped; inbound pump exiting"),
        InboundExit::OutboundClosed => debug!(%peer, "outbound pump finished; inbound pump exiting"),
        InboundExit::Aborted => {}
    }

    if hub.unregister(peer).is_err() {
        debug!(%peer, "hub already stopped; nothing to unregister");
    }
    drop(source);

    exit
}

async fn pump_frames<S>(
    peer: PeerId,
    source: &mut S,
    hub: &HubHandle,
    mut outbound_done: oneshot::Receiver<()>,
    config: &RelayConfig,
) -> InboundExit
where
    S: FrameSource,
{
    let mut deadline = Instant::now() + config.liveness_timeout;

    loop {
        let incoming = tokio::select! {
            read = timeout_at(deadline, source.recv()) => match read {
                Ok(result) => result,
                Err(_elapsed) => return InboundExit::LivenessTimeout,
            },
            // Resolves with `Err` once the sender is dropped.
            _ = &mut outbound_done => return InboundExit::OutboundClosed,
        };

        match incoming {
            Ok(Incoming::Frame(frame)) => {
                if frame.len() > config.max_frame_size {
                    return InboundExit::FrameTooLarge {
                        size: frame.len(),
                        limit: config.max_frame_size,
                    };
                }
                if hub.broadcast(peer, frame).is_err() {
                    return InboundExit::HubUnavailable;
                }
            }
            Ok(Incoming::ProbeResponse) => {
                deadline = Instant::now() + config.liveness_timeout;
            }
            // The adapter already answered it.
            Ok(Incoming::Probe) => {}
            Err(TransportError::FrameTooLarge { size, limit }) => {
                return InboundExit::FrameTooLarge { size, limit };
            }
            Err(e) => return InboundExit::Disconnected(e),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
