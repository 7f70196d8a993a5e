//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Cross-origin policy.
    pub cors: CorsConfig,

    /// Client banning.
    pub banning: BanningConfig,

    /// Session store.
    pub sessions: SessionConfig,

    /// WebSocket message channels.
    pub websocket: WebSocketConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum requests processed at once (backpressure).
    pub max_concurrent_requests: usize,

    /// Largest request body buffered for modules, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_concurrent_requests: 10_000,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Cross-origin policy. Each list is `*` or comma-separated.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,

    /// Path prefix the policy applies to.
    pub base_route: String,

    pub origins: String,
    pub headers: String,
    pub methods: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_route: "/".to_string(),
            origins: "*".to_string(),
            headers: "*".to_string(),
            methods: "*".to_string(),
        }
    }
}

/// Client banning configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BanningConfig {
    pub enabled: bool,

    /// Path prefix the banning module guards.
    pub base_route: String,

    /// Key of the banning configuration in the registry.
    pub route_id: String,

    /// How long a ban lasts, in minutes.
    pub ban_minutes: u64,

    /// Requests per second above which a client is banned (0 disables).
    pub max_requests_per_second: u32,

    /// Client addresses that are never banned.
    pub whitelist: Vec<String>,

    /// Interval between purge cycles in seconds.
    pub purge_interval_secs: u64,
}

impl Default for BanningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_route: "/".to_string(),
            route_id: "default".to_string(),
            ban_minutes: 30,
            max_requests_per_second: 50,
            whitelist: vec!["127.0.0.1".to_string(), "::1".to_string()],
            purge_interval_secs: 60,
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// When false, modules see the no-op session proxy.
    pub enabled: bool,

    pub cookie_name: String,

    /// Idle time before a session expires, in seconds.
    pub duration_secs: u64,

    /// Interval between expiry sweeps in seconds.
    pub purge_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cookie_name: "__session".to_string(),
            duration_secs: 30 * 60,
            purge_interval_secs: 60,
        }
    }
}

/// WebSocket message channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WebSocketConfig {
    pub enabled: bool,

    /// Path prefix promoted to message channels.
    pub base_route: String,

    /// Frames queued per direction before senders wait.
    pub channel_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_route: "/ws".to_string(),
            channel_capacity: 32,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
