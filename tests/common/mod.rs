//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use module_server::config::ServerConfig;
use module_server::lifecycle::Shutdown;
use module_server::routing::RouteTable;
use module_server::HttpServer;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::ServiceExt;

/// Default configuration with the metrics exporter and admin API off.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.observability.metrics_enabled = false;
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config
}

/// Routes used by the integration tests.
pub fn app_routes() -> RouteTable {
    RouteTable::new("/")
        .route(Method::GET, "/hello", |ctx| {
            ctx.respond(StatusCode::OK, "hello");
            Ok(())
        })
        .unwrap()
        .route(Method::GET, "/visits", |ctx| {
            let session = ctx.session();
            let visits = session.value("visits")?.as_u64().unwrap_or(0) + 1;
            session.set("visits", Value::from(visits))?;
            ctx.respond_json(StatusCode::OK, &json!({ "visits": visits }))
        })
        .unwrap()
}

/// Server with the test routes attached after the built-in modules.
pub fn build_server(config: ServerConfig) -> HttpServer {
    let server = HttpServer::new(config).unwrap();
    server
        .registry()
        .add("app", Arc::new(app_routes()))
        .unwrap();
    server
}

/// Send one request through the router without a socket.
pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A server running on an ephemeral loopback port.
pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server should stop")
            .expect("server task should not panic");
    }
}

/// Start `server` on 127.0.0.1 with an ephemeral port.
pub async fn start(server: HttpServer) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let signal = shutdown.signal();
    let (_tx, updates) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        server.run(listener, updates, signal).await.unwrap();
    });

    RunningServer {
        addr,
        shutdown,
        handle,
    }
}
