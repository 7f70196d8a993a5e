//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, addresses parseable)
//! - Check CORS origins are absolute URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Disabled sections are not checked

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use url::Url;

use crate::config::schema::ServerConfig;
use crate::cors::ALL;

/// One problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check `config`, collecting every problem.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_positive(&mut errors, "listener.max_concurrent_requests", config.listener.max_concurrent_requests as u64);
    check_positive(&mut errors, "listener.max_body_bytes", config.listener.max_body_bytes as u64);
    check_positive(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);

    let cors = &config.cors;
    if cors.enabled {
        check_base_route(&mut errors, "cors.base_route", &cors.base_route);
        check_not_blank(&mut errors, "cors.headers", &cors.headers);
        check_not_blank(&mut errors, "cors.methods", &cors.methods);
        if check_not_blank(&mut errors, "cors.origins", &cors.origins) && cors.origins.trim() != ALL {
            for origin in cors.origins.split(',').map(str::trim).filter(|o| !o.is_empty()) {
                if !is_valid_origin(origin) {
                    errors.push(ValidationError::new(
                        "cors.origins",
                        format!("'{origin}' is not an absolute http(s) origin"),
                    ));
                }
            }
        }
    }

    let banning = &config.banning;
    if banning.enabled {
        check_base_route(&mut errors, "banning.base_route", &banning.base_route);
        check_not_blank(&mut errors, "banning.route_id", &banning.route_id);
        check_positive(&mut errors, "banning.ban_minutes", banning.ban_minutes);
        check_positive(&mut errors, "banning.purge_interval_secs", banning.purge_interval_secs);
        for client in &banning.whitelist {
            if client.parse::<IpAddr>().is_err() {
                errors.push(ValidationError::new(
                    "banning.whitelist",
                    format!("'{client}' is not an IP address"),
                ));
            }
        }
    }

    let sessions = &config.sessions;
    if sessions.enabled {
        if !is_cookie_name(&sessions.cookie_name) {
            errors.push(ValidationError::new(
                "sessions.cookie_name",
                format!("'{}' is not a valid cookie name", sessions.cookie_name),
            ));
        }
        check_positive(&mut errors, "sessions.duration_secs", sessions.duration_secs);
        check_positive(&mut errors, "sessions.purge_interval_secs", sessions.purge_interval_secs);
    }

    if config.websocket.enabled {
        check_base_route(&mut errors, "websocket.base_route", &config.websocket.base_route);
        check_positive(&mut errors, "websocket.channel_capacity", config.websocket.channel_capacity as u64);
    }

    if config.observability.metrics_enabled {
        check_socket_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if config.admin.enabled {
        check_socket_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        check_not_blank(&mut errors, "admin.api_key", &config.admin.api_key);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{value}' is not a socket address")));
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be greater than zero"));
    }
}

fn check_not_blank(errors: &mut Vec<ValidationError>, field: &str, value: &str) -> bool {
    if value.trim().is_empty() {
        errors.push(ValidationError::new(field, "must not be empty"));
        return false;
    }
    true
}

fn check_base_route(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if !value.starts_with('/') {
        errors.push(ValidationError::new(field, format!("'{value}' must start with '/'")));
    }
}

fn is_valid_origin(origin: &str) -> bool {
    Url::parse(origin)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

/// RFC 6265 token: visible ASCII without separators.
fn is_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn all_problems_are_reported() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.cors.origins = "https://ok.example, not a url".into();
        config.cors.base_route = "api".into();
        config.banning.whitelist = vec!["10.0.0.300".into()];
        config.sessions.cookie_name = "bad name".into();
        config.sessions.purge_interval_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "cors.base_route",
                "cors.origins",
                "banning.whitelist",
                "sessions.cookie_name",
                "sessions.purge_interval_secs",
            ]
        );
    }

    #[test]
    fn disabled_sections_are_skipped() {
        let mut config = ServerConfig::default();
        config.cors.enabled = false;
        config.cors.origins = String::new();
        config.admin.enabled = false;
        config.admin.bind_address = "bad".into();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn origins_must_be_http_urls() {
        assert!(is_valid_origin("https://a.example"));
        assert!(is_valid_origin("http://localhost:3000"));
        assert!(!is_valid_origin("ftp://a.example"));
        assert!(!is_valid_origin("a.example"));
    }
}
