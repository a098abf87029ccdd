//! The connection contract the peer pumps are written against.
//!
//! A connection is split into two halves so that each pump owns exactly one
//! of them and no lock is ever needed between them:
//!
//! ```text
//!                 ┌──────────────┐
//!   transport ──► │ FrameSource  │ ──► inbound pump  ──► Hub (broadcast)
//!                 └──────────────┘
//!                 ┌──────────────┐
//!   transport ◄── │  FrameSink   │ ◄── outbound pump ◄── Hub (bounded queue)
//!                 └──────────────┘
//! ```
//!
//! Deadlines are not part of the contract: the pumps wrap every call in
//! `tokio::time::timeout`, which cancels the in-flight future when it
//! expires.  Implementations therefore only need to be cancel-safe at
//! `.await` points, which is true of tokio channels and of
//! `futures_util` streams and sinks.
//!
//! The production implementation lives in the server crate (WebSocket via
//! tokio-tungstenite); [`mock`] provides an in-memory pair for tests.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Frame;

pub mod mock;

/// A WebSocket-style close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// 1000: the peer finished normally.
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// 1001: the peer is going away (tab closed, server restart).
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// 1006: the connection dropped without a close handshake.
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    /// Codes that describe an ordinary departure rather than a fault.
    pub fn is_expected(self) -> bool {
        matches!(self, Self::NORMAL | Self::GOING_AWAY | Self::ABNORMAL)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failure of a transport read or write.
///
/// Every variant is terminal for the connection it came from.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote side closed the connection, or the stream ended.
    #[error("connection closed{}", code_suffix(.code))]
    Closed { code: Option<CloseCode> },

    /// An inbound frame exceeded the configured size limit.
    #[error("frame of {size} bytes exceeds the {limit}-byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    /// The underlying socket failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side violated the framing protocol.
    #[error("transport protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// `true` for the ways a peer normally leaves: a close with an expected
    /// code, or a stream that simply ended.  These are not worth a warning.
    pub fn is_expected_disconnect(&self) -> bool {
        match self {
            TransportError::Closed { code: None } => true,
            TransportError::Closed { code: Some(code) } => code.is_expected(),
            _ => false,
        }
    }
}

/// What the inbound side of a connection can yield.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// An application frame to relay.
    Frame(Frame),
    /// The remote side probed us.  Adapters answer probes themselves; the
    /// pump only ignores this.
    Probe,
    /// The remote side answered one of our probes.  Refreshes the read
    /// deadline.
    ProbeResponse,
}

/// Control frames the outbound pump may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    /// Liveness probe (WebSocket ping).
    Probe,
    /// Close notification sent when the hub releases the peer.
    Close,
}

fn code_suffix(code: &Option<CloseCode>) -> String {
    match code {
        Some(code) => format!(" (code {code})"),
        None => String::new(),
    }
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next inbound event.
    ///
    /// A close frame or end of stream is reported as
    /// [`TransportError::Closed`].
    async fn recv(&mut self) -> Result<Incoming, TransportError>;
}

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes a batch of frames and flushes once.
    ///
    /// Frame boundaries are preserved; batching only saves flushes.
    async fn send_batch(&mut self, frames: Vec<Frame>) -> Result<(), TransportError>;

    /// Writes a control frame and flushes.
    async fn send_control(&mut self, control: ControlFrame) -> Result<(), TransportError>;

    /// Closes the outbound half.  Errors are not interesting at this point.
    async fn close(&mut self);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
