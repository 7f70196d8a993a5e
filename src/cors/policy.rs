//! Cross-origin policy evaluation.
//!
//! # Design Decisions
//! - Origins and methods are split, trimmed and lowercased once, at construction
//! - Allowed headers are not pre-split: a preflight gets back what it asked for
//! - Origin-less local requests bypass the policy entirely, unless every setting
//!   is the wildcard (then even they get `*`)

use axum::body::Bytes;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN,
};
use axum::http::{HeaderValue, Method, StatusCode};
use thiserror::Error;

use crate::config::CorsConfig;
use crate::http::RequestContext;
use crate::pipeline::ModuleError;

/// Wildcard accepted for origins, headers and methods.
pub const ALL: &str = "*";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorsConfigError {
    #[error("CORS {0} must not be empty")]
    Empty(&'static str),
}

/// What the policy did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsOutcome {
    /// Local or wildcard-origin request; no CORS headers written.
    Bypassed,
    /// Allow-origin header written; the chain continues.
    Allowed,
    /// Preflight answered and the request marked handled.
    Preflight,
    /// Origin not in the allow-list; no CORS headers written.
    Denied,
}

/// Immutable allow-list built from the configured origins, headers and methods.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: String,
    headers: String,
    methods: String,
    valid_origins: Vec<String>,
    valid_methods: Vec<String>,
}

impl CorsPolicy {
    /// Build a policy. Each argument is [`ALL`] or a comma-separated list.
    pub fn new(
        origins: impl Into<String>,
        headers: impl Into<String>,
        methods: impl Into<String>,
    ) -> Result<Self, CorsConfigError> {
        let origins = required(origins.into(), "origins")?;
        let headers = required(headers.into(), "headers")?;
        let methods = required(methods.into(), "methods")?;

        let valid_origins = split_lowercase(&origins);
        let valid_methods = split_lowercase(&methods);

        Ok(Self {
            origins,
            headers,
            methods,
            valid_origins,
            valid_methods,
        })
    }

    /// Policy allowing every origin, header and method.
    pub fn permissive() -> Self {
        Self {
            origins: ALL.to_string(),
            headers: ALL.to_string(),
            methods: ALL.to_string(),
            valid_origins: vec![ALL.to_string()],
            valid_methods: vec![ALL.to_string()],
        }
    }

    pub fn from_config(config: &CorsConfig) -> Result<Self, CorsConfigError> {
        Self::new(
            config.origins.clone(),
            config.headers.clone(),
            config.methods.clone(),
        )
    }

    pub fn origins(&self) -> &str {
        &self.origins
    }

    pub fn headers(&self) -> &str {
        &self.headers
    }

    pub fn methods(&self) -> &str {
        &self.methods
    }

    /// True when origins, headers and methods are all the wildcard.
    pub fn allows_everything(&self) -> bool {
        self.origins == ALL && self.headers == ALL && self.methods == ALL
    }

    /// Evaluate the policy against `ctx`, writing response headers and answering
    /// preflights. A preflight asking for a disallowed method is a bad request.
    pub fn apply(&self, ctx: &mut RequestContext) -> Result<CorsOutcome, ModuleError> {
        let is_options = *ctx.method() == Method::OPTIONS;

        if self.allows_everything() {
            ctx.set_response_header(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(ALL));
            if is_options {
                self.validate_preflight(ctx)?;
                answer_preflight(ctx);
                return Ok(CorsOutcome::Preflight);
            }
            return Ok(CorsOutcome::Allowed);
        }

        let origin = ctx.headers().get(ORIGIN).cloned();
        let origin_text = origin
            .as_ref()
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        if origin_text.is_empty() && ctx.is_local() {
            return Ok(CorsOutcome::Bypassed);
        }

        if self.origins == ALL {
            return Ok(CorsOutcome::Bypassed);
        }

        let lowered = origin_text.to_lowercase();
        if lowered.is_empty() || !self.valid_origins.contains(&lowered) {
            tracing::debug!(
                request_id = %ctx.id(),
                origin = origin_text,
                "Origin not in CORS allow-list"
            );
            return Ok(CorsOutcome::Denied);
        }
        let Some(origin) = origin else {
            return Ok(CorsOutcome::Denied);
        };

        ctx.set_response_header(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        if is_options {
            self.validate_preflight(ctx)?;
            answer_preflight(ctx);
            return Ok(CorsOutcome::Preflight);
        }
        Ok(CorsOutcome::Allowed)
    }

    fn validate_preflight(&self, ctx: &mut RequestContext) -> Result<(), ModuleError> {
        if let Some(requested) = ctx.headers().get(ACCESS_CONTROL_REQUEST_HEADERS).cloned() {
            if !is_blank(&requested) {
                ctx.set_response_header(ACCESS_CONTROL_ALLOW_HEADERS, requested);
            }
        }

        let Some(requested) = ctx.headers().get(ACCESS_CONTROL_REQUEST_METHOD).cloned() else {
            return Ok(());
        };
        if is_blank(&requested) {
            return Ok(());
        }

        if self.methods != ALL {
            let text = requested.to_str().unwrap_or_default();
            let overlaps = split_lowercase(text)
                .iter()
                .any(|method| self.valid_methods.contains(method));
            if !overlaps {
                tracing::debug!(
                    request_id = %ctx.id(),
                    requested_method = text,
                    "Preflight requested a disallowed method"
                );
                return Err(ModuleError::bad_request(format!(
                    "method '{text}' is not allowed by the CORS policy"
                )));
            }
        }

        ctx.set_response_header(ACCESS_CONTROL_ALLOW_METHODS, requested);
        Ok(())
    }
}

fn answer_preflight(ctx: &mut RequestContext) {
    ctx.respond(StatusCode::NO_CONTENT, Bytes::new());
}

fn required(value: String, field: &'static str) -> Result<String, CorsConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CorsConfigError::Empty(field));
    }
    Ok(trimmed.to_string())
}

fn is_blank(value: &HeaderValue) -> bool {
    value.to_str().map(|s| s.trim().is_empty()).unwrap_or(false)
}

/// Comma-separated list, trimmed, lowercased, empty items and duplicates dropped.
fn split_lowercase(list: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in list.split(',') {
        let item = item.trim().to_lowercase();
        if !item.is_empty() && !items.contains(&item) {
            items.push(item);
        }
    }
    items
}
