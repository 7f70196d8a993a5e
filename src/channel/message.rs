//! Transport-agnostic duplex message channel.
//!
//! # Responsibilities
//! - Track the channel state (`connecting -> open -> closing -> closed`)
//! - Queue outbound frames for the transport and read inbound frames from it
//! - Hand received messages out in caller-sized fragments
//!
//! # Design Decisions
//! - State lives in an `AtomicU8` and only moves forward via compare-and-swap
//! - The transport side is a [`ChannelPeer`]: two tokio `mpsc` queues
//! - A local close sends the close frame and settles in `closed` without waiting
//!   for the peer's answer

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::PoisonError;

use axum::body::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Normal closure status code.
pub const CLOSE_NORMAL: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("operation not valid while the channel is {0}")]
    InvalidState(ChannelState),

    #[error("channel is closed")]
    Closed,

    #[error("text payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("receive buffer is empty")]
    EmptyBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Binary,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

/// Unit exchanged with the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Close(Option<CloseFrame>),
}

/// Outcome of one [`MessageChannel::receive`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveResult {
    /// Bytes copied into the caller's buffer.
    pub count: usize,
    /// False while more of the current message is waiting.
    pub end_of_message: bool,
    pub message_type: MessageType,
    pub close_status: Option<u16>,
    pub close_description: Option<String>,
}

impl ReceiveResult {
    fn data(count: usize, end_of_message: bool, message_type: MessageType) -> Self {
        Self {
            count,
            end_of_message,
            message_type,
            close_status: None,
            close_description: None,
        }
    }

    fn close(frame: Option<CloseFrame>) -> Self {
        let (close_status, close_description) = match frame {
            Some(frame) => (Some(frame.code), Some(frame.reason)),
            None => (None, None),
        };
        Self {
            count: 0,
            end_of_message: true,
            message_type: MessageType::Close,
            close_status,
            close_description,
        }
    }
}

/// Transport end of a [`MessageChannel`].
#[derive(Debug)]
pub struct ChannelPeer {
    /// Frames the channel wants written to the wire.
    pub outbound: mpsc::Receiver<Frame>,
    /// Frames read from the wire. Dropping it tells the channel the peer is gone.
    pub inbound: mpsc::Sender<Frame>,
}

struct Pending {
    message_type: MessageType,
    data: Bytes,
}

struct Inbound {
    rx: mpsc::Receiver<Frame>,
    pending: Option<Pending>,
}

/// A promoted duplex connection.
pub struct MessageChannel {
    id: String,
    state: AtomicU8,
    outbound: mpsc::Sender<Frame>,
    /// Held while a data frame is enqueued and while leaving `open`, so no data
    /// frame can follow a close frame.
    gate: std::sync::Mutex<()>,
    inbound: Mutex<Inbound>,
}

impl MessageChannel {
    /// Create a channel in `connecting` and the peer end its transport drives.
    pub fn pair(id: impl Into<String>, capacity: usize) -> (Self, ChannelPeer) {
        let capacity = capacity.max(1);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let channel = Self {
            id: id.into(),
            state: AtomicU8::new(ChannelState::Connecting as u8),
            outbound: out_tx,
            gate: std::sync::Mutex::new(()),
            inbound: Mutex::new(Inbound {
                rx: in_rx,
                pending: None,
            }),
        };
        let peer = ChannelPeer {
            outbound: out_rx,
            inbound: in_tx,
        };
        (channel, peer)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: ChannelState, to: ChannelState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `open -> closing`, ordered against [`send`](Self::send).
    fn begin_closing(&self) -> bool {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.transition(ChannelState::Open, ChannelState::Closing)
    }

    /// Finish the handshake.
    pub fn open(&self) -> Result<(), ChannelError> {
        if self.transition(ChannelState::Connecting, ChannelState::Open) {
            tracing::debug!(channel_id = %self.id, "Channel open");
            Ok(())
        } else {
            Err(ChannelError::InvalidState(self.state()))
        }
    }

    /// Drop to `closed` without a close handshake.
    pub fn abort(&self) {
        let previous = self.state.swap(ChannelState::Closed as u8, Ordering::AcqRel);
        if previous != ChannelState::Closed as u8 {
            tracing::debug!(channel_id = %self.id, "Channel aborted");
        }
    }

    /// Queue one message. Only valid while open.
    ///
    /// Waits for queue space, then checks the state again: a send that loses the race
    /// against [`close`](Self::close) fails instead of queueing after the close frame.
    pub async fn send(&self, payload: impl Into<Bytes>, is_text: bool) -> Result<(), ChannelError> {
        let state = self.state();
        if state != ChannelState::Open {
            return Err(ChannelError::InvalidState(state));
        }

        let payload = payload.into();
        let frame = if is_text {
            let text = String::from_utf8(payload.to_vec()).map_err(|_| ChannelError::InvalidUtf8)?;
            Frame::Text(text)
        } else {
            Frame::Binary(payload)
        };

        let Ok(permit) = self.outbound.reserve().await else {
            self.abort();
            return Err(ChannelError::Closed);
        };

        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self.state();
        if state != ChannelState::Open {
            return Err(ChannelError::InvalidState(state));
        }
        permit.send(frame);
        Ok(())
    }

    /// Close the channel. A no-op once closing or closed.
    pub async fn close(&self, code: Option<u16>, comment: Option<&str>) -> Result<(), ChannelError> {
        if self.transition(ChannelState::Connecting, ChannelState::Closed) {
            tracing::debug!(channel_id = %self.id, "Channel closed before opening");
            return Ok(());
        }
        if !self.begin_closing() {
            return Ok(());
        }

        let frame = CloseFrame {
            code: code.unwrap_or(CLOSE_NORMAL),
            reason: comment.unwrap_or_default().to_string(),
        };
        if self.outbound.send(Frame::Close(Some(frame))).await.is_err() {
            tracing::debug!(channel_id = %self.id, "Transport gone before close frame was sent");
        }
        self.transition(ChannelState::Closing, ChannelState::Closed);
        tracing::debug!(channel_id = %self.id, "Channel closed");
        Ok(())
    }

    /// Copy the next piece of the current message into `buf`.
    ///
    /// Messages larger than `buf` come out over several calls; the last one has
    /// `end_of_message` set. A close from the peer is answered and reported with
    /// [`MessageType::Close`]; so is the transport going away.
    pub async fn receive(&self, buf: &mut [u8]) -> Result<ReceiveResult, ChannelError> {
        if buf.is_empty() {
            return Err(ChannelError::EmptyBuffer);
        }

        let mut inbound = self.inbound.lock().await;

        if let Some(current) = inbound.pending.take() {
            return Ok(fragment(&mut inbound.pending, current, buf));
        }

        match self.state() {
            ChannelState::Open | ChannelState::Closing => {}
            ChannelState::Closed => return Err(ChannelError::Closed),
            state => return Err(ChannelError::InvalidState(state)),
        }

        let Some(frame) = inbound.rx.recv().await else {
            self.abort();
            return Ok(ReceiveResult::close(None));
        };

        let current = match frame {
            Frame::Text(text) => Pending {
                message_type: MessageType::Text,
                data: Bytes::from(text),
            },
            Frame::Binary(data) => Pending {
                message_type: MessageType::Binary,
                data,
            },
            Frame::Close(frame) => {
                if self.begin_closing() {
                    // Echo the peer's close to complete the handshake.
                    if self.outbound.send(Frame::Close(frame.clone())).await.is_err() {
                        tracing::debug!(channel_id = %self.id, "Transport gone before close echo was sent");
                    }
                }
                self.transition(ChannelState::Closing, ChannelState::Closed);
                tracing::debug!(channel_id = %self.id, "Peer closed channel");
                return Ok(ReceiveResult::close(frame));
            }
        };

        Ok(fragment(&mut inbound.pending, current, buf))
    }
}

/// Copy as much of `current` as fits into `buf`, parking the rest in `slot`.
fn fragment(slot: &mut Option<Pending>, mut current: Pending, buf: &mut [u8]) -> ReceiveResult {
    let count = current.data.len().min(buf.len());
    let head = current.data.split_to(count);
    buf[..count].copy_from_slice(&head);

    let end_of_message = current.data.is_empty();
    let message_type = current.message_type;
    if !end_of_message {
        *slot = Some(current);
    }
    ReceiveResult::data(count, end_of_message, message_type)
}

impl fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageChannel")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
