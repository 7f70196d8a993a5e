//! The CORS policy as a participant of the module chain.

use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::future;

use crate::config::CorsConfig;
use crate::cors::{CorsConfigError, CorsOutcome, CorsPolicy};
use crate::http::RequestContext;
use crate::observability::metrics;
use crate::pipeline::{ContainerLink, HandlerFuture, Module};

/// Applies a [`CorsPolicy`] to every request under its base route.
///
/// Only answered preflights mark the request handled. The policy can be swapped at
/// runtime; requests already being evaluated keep the policy they started with.
pub struct CorsModule {
    base_route: String,
    policy: ArcSwap<CorsPolicy>,
    link: ContainerLink,
}

impl CorsModule {
    pub fn new(base_route: impl Into<String>, policy: CorsPolicy) -> Self {
        Self {
            base_route: base_route.into(),
            policy: ArcSwap::from_pointee(policy),
            link: ContainerLink::new(),
        }
    }

    pub fn from_config(config: &CorsConfig) -> Result<Self, CorsConfigError> {
        Ok(Self::new(
            config.base_route.clone(),
            CorsPolicy::from_config(config)?,
        ))
    }

    pub fn policy(&self) -> Arc<CorsPolicy> {
        self.policy.load_full()
    }

    pub fn replace_policy(&self, policy: CorsPolicy) {
        tracing::info!(
            origins = policy.origins(),
            methods = policy.methods(),
            "CORS policy replaced"
        );
        self.policy.store(Arc::new(policy));
    }
}

impl Module for CorsModule {
    fn base_route(&self) -> &str {
        &self.base_route
    }

    fn link(&self) -> &ContainerLink {
        &self.link
    }

    fn handle<'a>(&'a self, ctx: &'a mut RequestContext) -> HandlerFuture<'a> {
        let policy = self.policy.load();
        let result = match policy.apply(ctx) {
            Ok(CorsOutcome::Preflight) => {
                metrics::record_preflight("accepted");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                metrics::record_preflight("rejected");
                Err(e)
            }
        };
        Box::pin(future::ready(result))
    }
}
