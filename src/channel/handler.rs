//! Application side of a message channel.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::channel::{ChannelError, MessageChannel, MessageType};

/// Drives a channel once it is open. The channel is closed when the future ends.
pub trait ChannelHandler: Send + Sync {
    fn on_open(&self, channel: Arc<MessageChannel>) -> BoxFuture<'static, ()>;
}

/// Sends every complete message back to the peer.
#[derive(Debug, Clone)]
pub struct EchoHandler {
    buffer_size: usize,
}

impl EchoHandler {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl ChannelHandler for EchoHandler {
    fn on_open(&self, channel: Arc<MessageChannel>) -> BoxFuture<'static, ()> {
        let buffer_size = self.buffer_size;
        Box::pin(async move {
            if let Err(e) = echo(&channel, buffer_size).await {
                tracing::debug!(channel_id = %channel.id(), error = %e, "Echo loop ended");
            }
        })
    }
}

async fn echo(channel: &MessageChannel, buffer_size: usize) -> Result<(), ChannelError> {
    let mut buf = vec![0u8; buffer_size];
    let mut message = Vec::new();

    loop {
        let result = channel.receive(&mut buf).await?;
        if result.message_type == MessageType::Close {
            return Ok(());
        }

        message.extend_from_slice(&buf[..result.count]);
        if result.end_of_message {
            let is_text = result.message_type == MessageType::Text;
            channel.send(std::mem::take(&mut message), is_text).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelState, Frame};

    #[tokio::test]
    async fn echoes_messages_larger_than_its_buffer() {
        let (channel, mut peer) = MessageChannel::pair("echo", 8);
        channel.open().unwrap();
        let channel = Arc::new(channel);

        let task = tokio::spawn(EchoHandler::new(3).on_open(channel.clone()));

        peer.inbound.send(Frame::Text("hello world".into())).await.unwrap();
        assert_eq!(peer.outbound.recv().await, Some(Frame::Text("hello world".into())));

        peer.inbound
            .send(Frame::Binary(axum::body::Bytes::from_static(&[1, 2, 3, 4])))
            .await
            .unwrap();
        assert_eq!(
            peer.outbound.recv().await,
            Some(Frame::Binary(axum::body::Bytes::from_static(&[1, 2, 3, 4])))
        );

        peer.inbound.send(Frame::Close(None)).await.unwrap();
        task.await.unwrap();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(peer.outbound.recv().await, Some(Frame::Close(None)));
    }
}
