//! WebSocket implementation of the relay's transport contract.
//!
//! An upgraded [`WebSocketStream`] is split into its read half
//! ([`WsFrameSource`]) and write half ([`WsFrameSink`]) so the inbound and
//! outbound pumps each own one of them and never contend for a lock.
//!
//! # Message mapping
//!
//! | WebSocket message | Relay event                                   |
//! |-------------------|-----------------------------------------------|
//! | Text / Binary     | `Incoming::Frame` (kind preserved)            |
//! | Ping              | `Incoming::Probe` (pong is queued by tungstenite) |
//! | Pong              | `Incoming::ProbeResponse`                     |
//! | Close             | `TransportError::Closed` with the close code  |
//!
//! Outbound, `FrameKind::Text` frames go out as text messages and
//! `FrameKind::Binary` frames as binary messages, so a browser receives the
//! same message type its sender used.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use relay_core::transport::{CloseCode, ControlFrame, FrameSink, FrameSource, Incoming, TransportError};
use relay_core::{Frame, FrameKind};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::error::{CapacityError, ProtocolError};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::trace;

/// Handshake settings that make tungstenite enforce the relay's frame limit
/// while reading, before a too-large payload is buffered.
pub fn websocket_config(max_frame_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_frame_size);
    config.max_frame_size = Some(max_frame_size);
    config
}

/// Splits an upgraded connection into the two transport halves.
pub fn split_websocket<S>(ws: WebSocketStream<S>) -> (WsFrameSource<S>, WsFrameSink<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sink, stream) = ws.split();
    (WsFrameSource { stream }, WsFrameSink { sink })
}

// ── Read half ─────────────────────────────────────────────────────────────────

/// Inbound half of a WebSocket connection.
pub struct WsFrameSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameSource for WsFrameSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Incoming, TransportError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => return Err(TransportError::Closed { code: None }),
            };

            match message {
                WsMessage::Text(text) => return Ok(Incoming::Frame(Frame::text(text))),
                WsMessage::Binary(data) => return Ok(Incoming::Frame(Frame::binary(data))),
                WsMessage::Ping(_) => return Ok(Incoming::Probe),
                WsMessage::Pong(_) => return Ok(Incoming::ProbeResponse),
                WsMessage::Close(frame) => {
                    return Err(TransportError::Closed {
                        code: frame.map(|f| CloseCode(u16::from(f.code))),
                    });
                }
                // Raw frames are only surfaced while writing; never on read.
                WsMessage::Frame(_) => trace!("skipping raw WebSocket frame"),
            }
        }
    }
}

// ── Write half ────────────────────────────────────────────────────────────────

/// Outbound half of a WebSocket connection.
pub struct WsFrameSink<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

#[async_trait]
impl<S> FrameSink for WsFrameSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_batch(&mut self, frames: Vec<Frame>) -> Result<(), TransportError> {
        // `feed` queues without flushing; one flush puts the whole batch on
        // the wire.
        for frame in &frames {
            self.sink.feed(to_message(frame)).await.map_err(map_ws_error)?;
        }
        self.sink.flush().await.map_err(map_ws_error)
    }

    async fn send_control(&mut self, control: ControlFrame) -> Result<(), TransportError> {
        let message = match control {
            ControlFrame::Probe => WsMessage::Ping(Vec::new()),
            ControlFrame::Close => WsMessage::Close(None),
        };
        self.sink.send(message).await.map_err(map_ws_error)
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            trace!("closing WebSocket sink: {e}");
        }
    }
}

/// Converts a relay frame into the WebSocket message of the matching type.
///
/// A text frame whose payload is not UTF-8 cannot be sent as a text message
/// and goes out as binary instead.
fn to_message(frame: &Frame) -> WsMessage {
    match frame.kind() {
        FrameKind::Text => match String::from_utf8(frame.payload().to_vec()) {
            Ok(text) => WsMessage::Text(text),
            Err(e) => WsMessage::Binary(e.into_bytes()),
        },
        FrameKind::Binary => WsMessage::Binary(frame.payload().to_vec()),
    }
}

/// Maps tungstenite errors onto the transport taxonomy.
fn map_ws_error(error: WsError) -> TransportError {
    match error {
        WsError::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
            TransportError::FrameTooLarge {
                size,
                limit: max_size,
            }
        }
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => TransportError::Closed {
            code: Some(CloseCode::ABNORMAL),
        },
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed { code: None },
        WsError::Io(e) => TransportError::Io(e),
        other => TransportError::Protocol(other.to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
