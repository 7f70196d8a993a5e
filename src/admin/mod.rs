//! Admin API: module and banning administration over HTTP.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::{middleware, Router};

use crate::banning::BanningRegistry;
use crate::pipeline::ModuleRegistry;
use crate::session::LocalSessionManager;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state of the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<ModuleRegistry>,
    pub banning: Arc<BanningRegistry>,
    pub sessions: Option<Arc<LocalSessionManager>>,
    api_key: Arc<str>,
    started_at: Instant,
}

impl AdminState {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        banning: Arc<BanningRegistry>,
        sessions: Option<Arc<LocalSessionManager>>,
        api_key: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            registry,
            banning,
            sessions,
            api_key: api_key.into(),
            started_at: Instant::now(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/modules", get(get_modules))
        .route("/admin/banning", get(get_banning_routes))
        .route(
            "/admin/banning/{route}",
            get(get_banning_route).delete(delete_banning_route),
        )
        .route("/admin/banning/{route}/{client}", axum::routing::delete(delete_ban))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
