//! Module promoting matching requests to message channels.

use std::sync::Arc;

use axum::http::StatusCode;
use futures_util::future;

use crate::channel::{websocket, ChannelHandler};
use crate::http::RequestContext;
use crate::pipeline::{ContainerLink, HandlerFuture, Module};

/// Default per-direction frame queue length.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Upgrades requests under its base route and hands the channel to a handler.
///
/// A final handler: nothing after it sees a matching request, upgraded or not.
pub struct ChannelModule {
    base_route: String,
    handler: Arc<dyn ChannelHandler>,
    capacity: usize,
    link: ContainerLink,
}

impl ChannelModule {
    pub fn new(base_route: impl Into<String>, handler: Arc<dyn ChannelHandler>) -> Self {
        Self {
            base_route: base_route.into(),
            handler,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            link: ContainerLink::new(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

impl Module for ChannelModule {
    fn base_route(&self) -> &str {
        &self.base_route
    }

    fn is_final_handler(&self) -> bool {
        true
    }

    fn link(&self) -> &ContainerLink {
        &self.link
    }

    fn handle<'a>(&'a self, ctx: &'a mut RequestContext) -> HandlerFuture<'a> {
        if !websocket::upgrade(ctx, self.handler.clone(), self.capacity) {
            ctx.respond(StatusCode::UPGRADE_REQUIRED, "WebSocket upgrade required");
        }
        Box::pin(future::ready(Ok(())))
    }
}
