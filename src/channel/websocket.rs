//! WebSocket transport for [`MessageChannel`].
//!
//! # Data Flow
//! ```text
//! client ◀── ws frames ──▶ writer/reader tasks ◀── mpsc ──▶ MessageChannel ◀──▶ ChannelHandler
//! ```
//!
//! # Design Decisions
//! - Ping/pong is answered by the socket layer and never reaches the channel
//! - Close frames are forwarded in both directions
//! - The writer gets a short grace period to flush the final close frame

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{self, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::channel::{ChannelHandler, ChannelPeer, CloseFrame, Frame, MessageChannel};
use crate::http::RequestContext;

const WRITER_GRACE: Duration = Duration::from_secs(5);

/// Promote `ctx` to a channel driven by `handler`.
///
/// Returns false, leaving the context untouched, if the request cannot be upgraded.
pub fn upgrade(ctx: &mut RequestContext, handler: Arc<dyn ChannelHandler>, capacity: usize) -> bool {
    let Some(upgrade) = ctx.take_upgrade() else {
        return false;
    };

    let id = ctx.id().to_string();
    tracing::info!(request_id = %id, path = %ctx.path(), "Upgrading request to message channel");

    let response = upgrade.on_upgrade(move |socket| serve(socket, id, handler, capacity));
    ctx.respond_upgraded(response);
    true
}

async fn serve(socket: WebSocket, id: String, handler: Arc<dyn ChannelHandler>, capacity: usize) {
    let (channel, peer) = MessageChannel::pair(id.clone(), capacity);
    let channel = Arc::new(channel);
    let ChannelPeer { outbound, inbound } = peer;
    let (sink, stream) = socket.split();

    let mut writer = tokio::spawn(write_frames(sink, outbound));
    let reader = tokio::spawn(read_frames(stream, inbound));

    if let Err(e) = channel.open() {
        tracing::warn!(channel_id = %id, error = %e, "Channel could not be opened");
        reader.abort();
        writer.abort();
        return;
    }

    handler.on_open(channel.clone()).await;

    if let Err(e) = channel.close(None, None).await {
        tracing::debug!(channel_id = %id, error = %e, "Close after handler failed");
    }
    drop(channel);
    reader.abort();

    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        tracing::debug!(channel_id = %id, "Writer did not finish in time; aborting");
        writer.abort();
    }
    tracing::debug!(channel_id = %id, "Message channel finished");
}

async fn write_frames(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Frame>,
) {
    while let Some(frame) = outbound.recv().await {
        let is_close = matches!(frame, Frame::Close(_));
        if let Err(e) = sink.send(to_message(frame)).await {
            tracing::debug!(error = %e, "WebSocket write failed");
            break;
        }
        if is_close {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_frames(mut stream: futures_util::stream::SplitStream<WebSocket>, inbound: mpsc::Sender<Frame>) {
    while let Some(message) = stream.next().await {
        let frame = match message {
            Ok(Message::Text(text)) => Frame::Text(text.to_string()),
            Ok(Message::Binary(data)) => Frame::Binary(data),
            Ok(Message::Close(close)) => Frame::Close(close.map(|c| CloseFrame {
                code: c.code,
                reason: c.reason.to_string(),
            })),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket read failed");
                break;
            }
        };

        let is_close = matches!(frame, Frame::Close(_));
        if inbound.send(frame).await.is_err() || is_close {
            break;
        }
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
        Frame::Close(close) => Message::Close(close.map(|c| ws::CloseFrame {
            code: c.code,
            reason: c.reason.into(),
        })),
    }
}
