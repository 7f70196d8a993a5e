//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (requests, latency, module outcomes, bans, sessions)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `server_requests_total` (counter): requests by method, status
//! - `server_request_duration_seconds` (histogram): latency distribution
//! - `server_module_handled_total` (counter): requests answered, by module
//! - `server_cors_preflight_total` (counter): preflights by outcome
//! - `server_bans_total` (counter): clients banned, by route
//! - `server_purged_total` (counter): entries purged, by target
//! - `server_active_sessions` (gauge): live sessions in the store
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed recorder
//!   every call is a no-op, so library code records unconditionally

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "server_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("server_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_module_handled(module: &str) {
    counter!("server_module_handled_total", "module" => module.to_string()).increment(1);
}

pub fn record_preflight(outcome: &'static str) {
    counter!("server_cors_preflight_total", "outcome" => outcome).increment(1);
}

pub fn record_ban(route: &str) {
    counter!("server_bans_total", "route" => route.to_string()).increment(1);
}

pub fn record_purged(target: &str, removed: usize) {
    counter!("server_purged_total", "target" => target.to_string()).increment(removed as u64);
}

pub fn record_active_sessions(count: usize) {
    gauge!("server_active_sessions").set(count as f64);
}
