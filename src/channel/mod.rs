//! Duplex message channels for upgraded connections.

pub mod handler;
pub mod message;
pub mod module;
pub mod websocket;

pub use message::{
    ChannelError, ChannelPeer, ChannelState, CloseFrame, Frame, MessageChannel, MessageType,
    ReceiveResult, CLOSE_NORMAL,
};
pub use handler::{ChannelHandler, EchoHandler};
pub use module::ChannelModule;
