//! In-memory transport for tests and benchmarks.
//!
//! [`mock_transport`] returns the two halves a peer needs plus a
//! [`MockRemote`] that plays the other end of the wire: it injects inbound
//! events and observes everything the outbound pump writes.  The remote can
//! also make writes fail or hang, which is how tests reach the write-failure
//! and write-deadline paths without a real socket.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CloseCode, ControlFrame, FrameSink, FrameSource, Incoming, TransportError};
use crate::domain::Frame;

/// Something the outbound half did, as seen from the remote end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// One flushed batch of frames.
    Frames(Vec<Frame>),
    /// A control frame.
    Control(ControlFrame),
    /// The outbound half was closed.
    Closed,
}

/// Creates a connected source/sink pair and the remote end controlling it.
pub fn mock_transport() -> (MockSource, MockSink, MockRemote) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let fail_writes = Arc::new(AtomicBool::new(false));
    let stall_writes = Arc::new(AtomicBool::new(false));

    let source = MockSource { inbound: inbound_rx };
    let sink = MockSink {
        outbound: outbound_tx,
        fail_writes: Arc::clone(&fail_writes),
        stall_writes: Arc::clone(&stall_writes),
    };
    let remote = MockRemote {
        inbound: inbound_tx,
        outbound: outbound_rx,
        fail_writes,
        stall_writes,
    };
    (source, sink, remote)
}

// ── Source ────────────────────────────────────────────────────────────────────

/// Inbound half fed by a [`MockRemote`].
pub struct MockSource {
    inbound: mpsc::UnboundedReceiver<Result<Incoming, TransportError>>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn recv(&mut self) -> Result<Incoming, TransportError> {
        match self.inbound.recv().await {
            Some(event) => event,
            // Remote dropped without closing: the wire just went away.
            None => Err(TransportError::Closed {
                code: Some(CloseCode::ABNORMAL),
            }),
        }
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

/// Outbound half observed by a [`MockRemote`].
pub struct MockSink {
    outbound: mpsc::UnboundedSender<SinkEvent>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
}

impl MockSink {
    async fn write(&mut self, event: SinkEvent) -> Result<(), TransportError> {
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        self.outbound
            .send(event)
            .map_err(|_| TransportError::Closed {
                code: Some(CloseCode::ABNORMAL),
            })
    }
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_batch(&mut self, frames: Vec<Frame>) -> Result<(), TransportError> {
        self.write(SinkEvent::Frames(frames)).await
    }

    async fn send_control(&mut self, control: ControlFrame) -> Result<(), TransportError> {
        self.write(SinkEvent::Control(control)).await
    }

    async fn close(&mut self) {
        // A remote that stopped reading never lets the close through either.
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let _ = self.outbound.send(SinkEvent::Closed);
    }
}

// ── Remote end ────────────────────────────────────────────────────────────────

/// The far end of a mock connection.
///
/// Dropping the remote makes the source report an abnormal closure and makes
/// further writes fail.
pub struct MockRemote {
    inbound: mpsc::UnboundedSender<Result<Incoming, TransportError>>,
    outbound: mpsc::UnboundedReceiver<SinkEvent>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
}

impl MockRemote {
    /// Delivers an application frame to the source.
    pub fn send_frame(&self, frame: Frame) {
        self.push(Ok(Incoming::Frame(frame)));
    }

    /// Delivers a probe-response (pong) to the source.
    pub fn send_probe_response(&self) {
        self.push(Ok(Incoming::ProbeResponse));
    }

    /// Delivers a probe (ping) to the source.
    pub fn send_probe(&self) {
        self.push(Ok(Incoming::Probe));
    }

    /// Makes the source report a close with `code`.
    pub fn close(&self, code: Option<CloseCode>) {
        self.push(Err(TransportError::Closed { code }));
    }

    /// Makes the source report an arbitrary error.
    pub fn send_error(&self, error: TransportError) {
        self.push(Err(error));
    }

    /// Every subsequent write fails with a broken-pipe I/O error.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Every subsequent write, close included, hangs forever (until its
    /// deadline cancels it).
    pub fn stall_writes(&self) {
        self.stall_writes.store(true, Ordering::SeqCst);
    }

    /// Waits for the next thing the sink does.  `None` once the sink has been
    /// dropped and every event consumed.
    pub async fn next_event(&mut self) -> Option<SinkEvent> {
        self.outbound.recv().await
    }

    /// Returns every event already written, without waiting.
    pub fn drain_events(&mut self) -> Vec<SinkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.outbound.try_recv() {
            events.push(event);
        }
        events
    }

    fn push(&self, event: Result<Incoming, TransportError>) {
        // The source may already be gone if its pump exited; that is fine.
        let _ = self.inbound.send(event);
    }
}
