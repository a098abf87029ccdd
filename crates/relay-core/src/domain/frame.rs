//! The unit of relayed data.

use std::fmt;
use std::sync::Arc;

/// How the transport framed a payload.
///
/// The hub never looks at this; it only lets a WebSocket peer receive a frame
/// with the same message type the sender used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// UTF-8 text (WebSocket text message).
    Text,
    /// Arbitrary bytes (WebSocket binary message).
    Binary,
}

/// One opaque message, shared between all recipients of a broadcast.
///
/// The payload sits behind an `Arc`, so fanning a frame out to N peers costs
/// N reference-count increments rather than N copies.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    kind: FrameKind,
    payload: Arc<[u8]>,
}

impl Frame {
    /// Creates a frame of the given kind.
    pub fn new(kind: FrameKind, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Creates a text frame.
    pub fn text(payload: impl Into<String>) -> Self {
        let payload: String = payload.into();
        Self::new(FrameKind::Text, payload.into_bytes())
    }

    /// Creates a binary frame.
    pub fn binary(payload: impl Into<Arc<[u8]>>) -> Self {
        Self::new(FrameKind::Binary, payload)
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Debug for Frame {
    // Payloads can be large; log the shape, not the bytes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind)
            .field("len", &self.payload.len())
            .finish()
    }
}
