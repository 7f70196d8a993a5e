//! Module server
//!
//! Runs the module chain behind an Axum listener.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ listener ──▶ RequestContext ──▶ banning ──▶ cors ──▶ app modules
//!                                                                              │
//!     Client Response                                                          ▼
//!     ◀─────────────── response ◀── status / headers / body ◀─── handled context
//!
//!     Background: purge schedulers (bans, sessions), config watcher, admin API
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use module_server::channel::{ChannelModule, EchoHandler};
use module_server::config::{load_config, ConfigWatcher, ServerConfig};
use module_server::lifecycle::{signals, Shutdown};
use module_server::observability::{logging, metrics};
use module_server::routing::RouteTable;
use module_server::HttpServer;

#[derive(Parser)]
#[command(name = "module-server")]
#[command(about = "HTTP server running requests through a module chain", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("module-server v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_concurrent_requests = config.listener.max_concurrent_requests,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config.clone())?;
    if config.websocket.enabled {
        let module = ChannelModule::new(
            config.websocket.base_route.clone(),
            Arc::new(EchoHandler::default()),
        )
        .with_capacity(config.websocket.channel_capacity);
        server.registry().add("websocket", Arc::new(module))?;
    }
    server.registry().add("app", Arc::new(app_routes()?))?;

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, config.clone());
            (Some(watcher.spawn()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Arc::new(Shutdown::new());
    let signal = shutdown.signal();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { signals::wait_for_termination(&shutdown).await }
    });

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    server.run(listener, updates, signal).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Built-in routes: a liveness check and a per-session visit counter.
fn app_routes() -> Result<RouteTable, module_server::routing::PatternError> {
    RouteTable::new("/")
        .route(Method::GET, "/health", |ctx| {
            ctx.respond(StatusCode::OK, "OK");
            Ok(())
        })?
        .route(Method::GET, "/visits", |ctx| {
            let session = ctx.session();
            let visits = session.value("visits")?.as_u64().unwrap_or(0) + 1;
            session.set("visits", Value::from(visits))?;
            ctx.respond_json(StatusCode::OK, &json!({ "visits": visits }))
        })
}
