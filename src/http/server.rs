//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router whose fallback feeds every request to the module chain
//! - Wire up middleware (tracing, limits, request ID)
//! - Own the lifetime of the module registry and the purge schedulers
//! - Apply configuration reloads
//! - Serve the admin API next to the main listener

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin::{self, AdminState};
use crate::banning::{BanningModule, BanningRegistry};
use crate::config::{validate_config, ServerConfig, ValidationError};
use crate::cors::{CorsConfigError, CorsModule, CorsPolicy};
use crate::http::{request, response, RequestContext};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::pipeline::{ModuleRegistry, RegistryError};
use crate::scheduler::{PurgeScheduler, Purgeable};
use crate::session::{DummySessionProxy, LocalSessionManager, SessionProxy};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0:?}")]
    Config(Vec<ValidationError>),

    #[error(transparent)]
    Cors(#[from] CorsConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into the fallback handler.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<ModuleRegistry>,
    sessions: Option<Arc<LocalSessionManager>>,
    max_body_bytes: usize,
}

/// HTTP server running requests through a [`ModuleRegistry`].
///
/// Banning and CORS modules are attached first, per configuration. Application
/// modules are added through [`HttpServer::registry`] before [`HttpServer::run`].
pub struct HttpServer {
    config: ServerConfig,
    registry: Arc<ModuleRegistry>,
    banning: Arc<BanningRegistry>,
    sessions: Option<Arc<LocalSessionManager>>,
    cors: Option<Arc<CorsModule>>,
    schedulers: Vec<PurgeScheduler>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        validate_config(&config).map_err(ServerError::Config)?;

        let registry = ModuleRegistry::new();
        let banning = Arc::new(BanningRegistry::new());
        let mut schedulers = Vec::new();

        if config.banning.enabled {
            let module = BanningModule::from_config(&config.banning, banning.clone());
            registry.add("banning", Arc::new(module))?;
            schedulers.push(PurgeScheduler::new(
                Duration::from_secs(config.banning.purge_interval_secs),
                vec![banning.clone() as Arc<dyn Purgeable>],
            ));
        }

        let cors = if config.cors.enabled {
            let module = Arc::new(CorsModule::from_config(&config.cors)?);
            registry.add("cors", module.clone())?;
            Some(module)
        } else {
            None
        };

        let sessions = if config.sessions.enabled {
            let manager = Arc::new(LocalSessionManager::from_config(&config.sessions));
            schedulers.push(PurgeScheduler::new(
                Duration::from_secs(config.sessions.purge_interval_secs),
                vec![manager.clone() as Arc<dyn Purgeable>],
            ));
            Some(manager)
        } else {
            None
        };

        tracing::info!(
            modules = ?registry.names(),
            sessions = sessions.is_some(),
            "HTTP server configured"
        );

        Ok(Self {
            config,
            registry,
            banning,
            sessions,
            cors,
            schedulers,
        })
    }

    /// The module chain. Add application modules here before running.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn banning(&self) -> &Arc<BanningRegistry> {
        &self.banning
    }

    pub fn sessions(&self) -> Option<&Arc<LocalSessionManager>> {
        self.sessions.as_ref()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            sessions: self.sessions.clone(),
            max_body_bytes: self.config.listener.max_body_bytes,
        };

        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(GlobalConcurrencyLimitLayer::new(self.config.listener.max_concurrent_requests))
            .layer(request::propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(request::set_request_id_layer())
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Starts every module before accepting traffic, runs the purge schedulers and
    /// the admin API while serving, and disposes the registry once drained.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let admin_listener = if self.config.admin.enabled {
            Some(TcpListener::bind(&self.config.admin.bind_address).await?)
        } else {
            None
        };

        self.registry.start_all(&shutdown).await?;
        for scheduler in &self.schedulers {
            scheduler.start();
        }

        let reload_task = {
            let cors = self.cors.clone();
            let current = self.config.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut current = current;
                loop {
                    tokio::select! {
                        update = config_updates.recv() => match update {
                            Some(next) => {
                                apply_reload(cors.as_deref(), &current, &next);
                                current = next;
                            }
                            None => break,
                        },
                        _ = shutdown.cancelled() => break,
                    }
                }
            })
        };

        let admin_task = if let Some(admin_listener) = admin_listener {
            if let Ok(admin_addr) = admin_listener.local_addr() {
                tracing::info!(address = %admin_addr, "Admin API listening");
            }
            let state = AdminState::new(
                self.registry.clone(),
                self.banning.clone(),
                self.sessions.clone(),
                self.config.admin.api_key.clone(),
            );
            let app = admin::setup_admin_router(state);
            let mut shutdown = shutdown.clone();
            Some(tokio::spawn(async move {
                let result = axum::serve(admin_listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await;
                if let Err(e) = result {
                    tracing::error!(error = %e, "Admin API failed");
                }
            }))
        } else {
            None
        };

        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        let mut signal = shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await;

        for scheduler in &self.schedulers {
            scheduler.stop().await;
        }
        reload_task.abort();
        if let Some(admin_task) = admin_task {
            if let Err(e) = admin_task.await {
                tracing::error!(error = %e, "Admin API task failed");
            }
        }
        self.registry.dispose();

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn apply_reload(cors: Option<&CorsModule>, current: &ServerConfig, next: &ServerConfig) {
    if let Some(cors) = cors {
        if next.cors != current.cors {
            match CorsPolicy::from_config(&next.cors) {
                Ok(policy) => cors.replace_policy(policy),
                Err(e) => tracing::error!(error = %e, "Reloaded CORS settings rejected"),
            }
        }
    }

    let restart_needed = next.listener != current.listener
        || next.timeouts != current.timeouts
        || next.banning != current.banning
        || next.sessions != current.sessions
        || next.websocket != current.websocket
        || next.observability != current.observability
        || next.admin != current.admin
        || next.cors.enabled != current.cors.enabled
        || next.cors.base_route != current.cors.base_route;
    if restart_needed {
        tracing::warn!("Configuration changes outside the CORS policy take effect after a restart");
    }
}

/// Fallback handler: every request becomes a [`RequestContext`] and runs
/// through the module chain.
async fn dispatch_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));

    let (mut parts, body) = request.into_parts();
    let upgrade = if wants_upgrade(&parts.headers) {
        WebSocketUpgrade::from_request_parts(&mut parts, &state).await.ok()
    } else {
        None
    };

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(error = %e, "Request body rejected");
            metrics::record_request(parts.method.as_str(), 413, start);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
        }
    };

    let session: Arc<dyn SessionProxy> = match &state.sessions {
        Some(manager) => manager.proxy_for(&parts.headers),
        None => DummySessionProxy::shared(),
    };

    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let method = parts.method.clone();

    let mut builder = RequestContext::builder(method.clone(), uri)
        .remote_addr(remote_addr)
        .body(body)
        .session(session);
    if let Some(id) = request::request_id(&parts.headers) {
        builder = builder.id(id);
    }
    builder = builder.headers(parts.headers);
    if let Some(upgrade) = upgrade {
        builder = builder.upgrade(upgrade);
    }
    let mut ctx = builder.build();

    tracing::debug!(
        request_id = %ctx.id(),
        method = %method,
        path = %ctx.path(),
        client = %remote_addr,
        "Dispatching request"
    );

    let response = match state.registry.dispatch_request(&mut ctx).await {
        Ok(()) => response::from_context(&mut ctx),
        Err(e) => response::from_error(&mut ctx, &e),
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

fn wants_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}
