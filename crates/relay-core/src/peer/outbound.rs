//! Outbound pump: hub queue → transport, plus keepalive probes.
//!
//! Two event sources race in a `select!`:
//!
//! - the peer's outbound queue (a frame, or the queue being closed by the hub)
//! - the keepalive interval
//!
//! Whichever is ready first is handled first.  The pump never tells the hub
//! anything: when it exits because a write failed, the hub finds out on its
//! next broadcast (the queue has no reader).  The inbound pump finds out when
//! this task ends; see [`spawn_peer`](super::spawn_peer).

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::domain::{Frame, PeerId, RelayConfig};
use crate::transport::{ControlFrame, FrameSink, TransportError};

/// Why an outbound pump stopped.
#[derive(Debug)]
pub enum OutboundExit {
    /// The hub closed the queue (unregister, eviction or shutdown); a close
    /// frame was sent.
    Released,
    /// Writing frames failed.
    WriteFailed(TransportError),
    /// Writing a keepalive probe failed.
    ProbeFailed(TransportError),
    /// A write did not finish within the write deadline.
    WriteTimedOut,
    /// The pump task panicked or was cancelled.
    Aborted,
}

/// Runs the outbound pump for `peer` until the queue closes or a write fails.
///
/// On return the keepalive timer has been dropped and the sink closed or
/// abandoned: the close itself is bounded by `write_deadline`, so a remote
/// that stopped reading cannot hold the pump open.
pub async fn run_outbound<W>(
    peer: PeerId,
    mut queue: mpsc::Receiver<Frame>,
    mut sink: W,
    config: &RelayConfig,
) -> OutboundExit
where
    W: FrameSink,
{
    let exit = pump_queue(peer, &mut queue, &mut sink, config).await;

    match &exit {
        OutboundExit::Released => debug!(%peer, "queue closed by hub; connection released"),
        OutboundExit::WriteFailed(e) => debug!(%peer, "write failed: {e}"),
        OutboundExit::ProbeFailed(e) => debug!(%peer, "keepalive probe failed: {e}"),
        OutboundExit::WriteTimedOut => warn!(
            %peer,
            "write did not complete within {:?}",
            config.write_deadline
        ),
        OutboundExit::Aborted => {}
    }

    if timeout(config.write_deadline, sink.close()).await.is_err() {
        debug!(%peer, "sink close did not finish within {:?}; dropping it", config.write_deadline);
    }
    drop(sink);
    exit
}

async fn pump_queue<W>(
    peer: PeerId,
    queue: &mut mpsc::Receiver<Frame>,
    sink: &mut W,
    config: &RelayConfig,
) -> OutboundExit
where
    W: FrameSink,
{
    // First probe one full period after connecting, not immediately.
    let mut keepalive = interval_at(Instant::now() + config.probe_period, config.probe_period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = queue.recv() => {
                let Some(first) = next else {
                    let close = sink.send_control(ControlFrame::Close);
                    if let Err(e) = with_deadline(config.write_deadline, close).await {
                        debug!(%peer, "close frame not delivered: {e:?}");
                    }
                    return OutboundExit::Released;
                };

                let batch = drain_buffered(first, queue, config.outbound_queue_capacity);
                trace!(%peer, frames = batch.len(), "writing batch");
                match with_deadline(config.write_deadline, sink.send_batch(batch)).await {
                    Ok(()) => {}
                    Err(WriteError::Transport(e)) => return OutboundExit::WriteFailed(e),
                    Err(WriteError::TimedOut) => return OutboundExit::WriteTimedOut,
                }
            }
            _ = keepalive.tick() => {
                match with_deadline(config.write_deadline, sink.send_control(ControlFrame::Probe)).await {
                    Ok(()) => trace!(%peer, "keepalive probe sent"),
                    Err(WriteError::Transport(e)) => return OutboundExit::ProbeFailed(e),
                    Err(WriteError::TimedOut) => return OutboundExit::WriteTimedOut,
                }
            }
        }
    }
}

/// Collects `first` plus whatever is already waiting in the queue, up to
/// `limit` frames.  Never waits for more to arrive.
fn drain_buffered(first: Frame, queue: &mut mpsc::Receiver<Frame>, limit: usize) -> Vec<Frame> {
    let mut batch = vec![first];
    while batch.len() < limit {
        match queue.try_recv() {
            Ok(frame) => batch.push(frame),
            Err(_) => break,
        }
    }
    batch
}

#[derive(Debug)]
enum WriteError {
    Transport(TransportError),
    TimedOut,
}

async fn with_deadline<F>(deadline: Duration, write: F) -> Result<(), WriteError>
where
    F: Future<Output = Result<(), TransportError>>,
{
    match timeout(deadline, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteError::Transport(e)),
        Err(_elapsed) => Err(WriteError::TimedOut),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
