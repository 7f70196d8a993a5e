//! The `Module` trait and the container back-reference every module carries.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures_util::future::BoxFuture;

use crate::http::RequestContext;
use crate::lifecycle::ShutdownSignal;
use crate::pipeline::{ModuleError, ModuleRegistry};

/// Future returned by module hooks.
pub type HandlerFuture<'a> = BoxFuture<'a, Result<(), ModuleError>>;

/// A unit of request processing attached to a [`ModuleRegistry`].
///
/// Modules are shared by every in-flight request, so all per-request state lives in
/// the [`RequestContext`] and any shared state must be internally synchronized.
pub trait Module: Send + Sync {
    /// Path prefix this module answers to. `/` matches every request.
    fn base_route(&self) -> &str;

    /// When true, a matching module ends the chain even if it left the request unhandled.
    fn is_final_handler(&self) -> bool {
        false
    }

    /// Back-reference to the owning registry.
    fn link(&self) -> &ContainerLink;

    /// Called once by [`ModuleRegistry::start_all`], in registration order.
    fn start(&self, _shutdown: ShutdownSignal) -> HandlerFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    /// Handle one request. Set the context handled to stop the chain.
    fn handle<'a>(&'a self, ctx: &'a mut RequestContext) -> HandlerFuture<'a>;

    /// Called when the owning registry is disposed.
    fn dispose(&self) {}
}

#[derive(Debug, Default)]
enum LinkState {
    #[default]
    Unbound,
    Bound(Weak<ModuleRegistry>),
    Released,
}

/// Link from a module to the registry that owns it.
///
/// Bound exactly once at registration and released when the registry is disposed.
/// A released link never binds again.
#[derive(Debug, Default)]
pub struct ContainerLink {
    state: Mutex<LinkState>,
}

impl ContainerLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind(&self, registry: Weak<ModuleRegistry>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            LinkState::Unbound => {
                *state = LinkState::Bound(registry);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = LinkState::Released;
    }

    /// The owning registry, if the module is attached and the registry is alive.
    pub fn container(&self) -> Option<Arc<ModuleRegistry>> {
        match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            LinkState::Bound(registry) => registry.upgrade(),
            _ => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            LinkState::Bound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_binds_once() {
        let registry = ModuleRegistry::new();
        let link = ContainerLink::new();
        assert!(!link.is_bound());

        assert!(link.bind(Arc::downgrade(&registry)));
        assert!(link.is_bound());
        assert!(link.container().is_some());

        assert!(!link.bind(Arc::downgrade(&registry)));
    }

    #[test]
    fn released_link_stays_released() {
        let registry = ModuleRegistry::new();
        let link = ContainerLink::new();
        link.bind(Arc::downgrade(&registry));
        link.release();

        assert!(!link.is_bound());
        assert!(link.container().is_none());
        assert!(!link.bind(Arc::downgrade(&registry)));
    }
}
