//! Verb + path pattern registration table.
//!
//! A [`RouteTable`] is a module whose handlers are registered explicitly at startup and
//! resolved against the path left over after the module's base route.
//!
//! Pattern syntax: literal segments, `{name}` for one segment, and a trailing
//! `{*name}` for everything that follows.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use thiserror::Error;

use crate::http::RequestContext;
use crate::pipeline::{ContainerLink, HandlerFuture, Module, ModuleError};
use crate::routing::matcher::normalize_base_route;

/// Error raised while compiling a route pattern.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("catch-all segment must be last in '{0}'")]
    CatchAllNotLast(String),

    #[error("empty parameter name in '{0}'")]
    EmptyParameter(String),

    #[error("parameter '{name}' appears twice in '{pattern}'")]
    DuplicateParameter { pattern: String, name: String },
}

/// Handler invoked for a resolved route.
pub trait RouteHandler: Send + Sync {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> HandlerFuture<'a>;
}

struct SyncHandler<F>(F);

impl<F> RouteHandler for SyncHandler<F>
where
    F: Fn(&mut RequestContext) -> Result<(), ModuleError> + Send + Sync,
{
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> HandlerFuture<'a> {
        Box::pin(futures_util::future::ready((self.0)(ctx)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let raw = pattern.to_string();
        let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut names: Vec<&str> = Vec::new();

        for (i, part) in parts.iter().enumerate() {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(inner) => {
                    let (catch_all, name) = match inner.strip_prefix('*') {
                        Some(name) => (true, name),
                        None => (false, inner),
                    };
                    if name.is_empty() {
                        return Err(PatternError::EmptyParameter(raw));
                    }
                    if names.contains(&name) {
                        return Err(PatternError::DuplicateParameter {
                            pattern: raw,
                            name: name.to_string(),
                        });
                    }
                    names.push(name);
                    if catch_all {
                        if i + 1 != parts.len() {
                            return Err(PatternError::CatchAllNotLast(raw));
                        }
                        Segment::CatchAll(name.to_string())
                    } else {
                        Segment::Param(name.to_string())
                    }
                }
                None => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self { raw, segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match `path`, returning captured parameters on success.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Vec::new();
        let mut index = 0;

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => {
                    if parts.get(index) != Some(&literal.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(index)?;
                    params.push((name.clone(), (*value).to_string()));
                }
                Segment::CatchAll(name) => {
                    params.push((name.clone(), parts[index..].join("/")));
                    return Some(params);
                }
            }
            index += 1;
        }

        (index == parts.len()).then_some(params)
    }
}

struct RouteEntry {
    method: Method,
    pattern: RoutePattern,
    handler: Arc<dyn RouteHandler>,
}

/// Module dispatching to handlers registered by verb and path pattern.
pub struct RouteTable {
    base_route: String,
    routes: Vec<RouteEntry>,
    link: ContainerLink,
}

impl RouteTable {
    pub fn new(base_route: &str) -> Self {
        Self {
            base_route: normalize_base_route(base_route),
            routes: Vec::new(),
            link: ContainerLink::new(),
        }
    }

    /// Register a synchronous handler. Earlier registrations win on overlapping patterns.
    pub fn route<F>(self, method: Method, pattern: &str, handler: F) -> Result<Self, PatternError>
    where
        F: Fn(&mut RequestContext) -> Result<(), ModuleError> + Send + Sync + 'static,
    {
        self.route_handler(method, pattern, SyncHandler(handler))
    }

    /// Register a handler that may suspend.
    pub fn route_handler(
        mut self,
        method: Method,
        pattern: &str,
        handler: impl RouteHandler + 'static,
    ) -> Result<Self, PatternError> {
        let pattern = RoutePattern::parse(pattern)?;
        tracing::debug!(
            base_route = %self.base_route,
            method = %method,
            pattern = pattern.as_str(),
            "Route registered"
        );
        self.routes.push(RouteEntry {
            method,
            pattern,
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Module for RouteTable {
    fn base_route(&self) -> &str {
        &self.base_route
    }

    fn link(&self) -> &ContainerLink {
        &self.link
    }

    fn handle<'a>(&'a self, ctx: &'a mut RequestContext) -> HandlerFuture<'a> {
        Box::pin(async move {
            let path = ctx.route().remainder().to_string();
            let mut allowed: Vec<&Method> = Vec::new();

            for entry in &self.routes {
                let Some(params) = entry.pattern.matches(&path) else {
                    continue;
                };
                if entry.method != *ctx.method() {
                    allowed.push(&entry.method);
                    continue;
                }

                ctx.set_route_params(params);
                entry.handler.call(ctx).await?;
                ctx.set_handled();
                return Ok(());
            }

            if !allowed.is_empty() {
                let allow = allowed
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    ctx.response_headers_mut().insert(header::ALLOW, value);
                }
                return Err(ModuleError::status(
                    StatusCode::METHOD_NOT_ALLOWED,
                    format!("{} not allowed for {}", ctx.method(), path),
                ));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ModuleRegistry;

    fn table() -> RouteTable {
        RouteTable::new("/api")
            .route(Method::GET, "/users/{id}", |ctx| {
                let id = ctx.route_param("id").unwrap_or_default().to_string();
                ctx.respond(StatusCode::OK, format!("user {id}"));
                Ok(())
            })
            .unwrap()
            .route(Method::GET, "/files/{*rest}", |ctx| {
                let rest = ctx.route_param("rest").unwrap_or_default().to_string();
                ctx.respond(StatusCode::OK, rest);
                Ok(())
            })
            .unwrap()
            .route(Method::DELETE, "/users/{id}", |ctx| {
                ctx.set_status(StatusCode::NO_CONTENT);
                Ok(())
            })
            .unwrap()
    }

    async fn dispatch(method: Method, path: &str) -> (RequestContext, Result<(), ModuleError>) {
        let registry = ModuleRegistry::new();
        registry.add("api", Arc::new(table())).unwrap();
        let mut ctx = RequestContext::builder(method, path).build();
        let result = registry.dispatch_request(&mut ctx).await;
        (ctx, result)
    }

    #[test]
    fn pattern_parsing() {
        assert!(RoutePattern::parse("/a/{id}/b").is_ok());
        assert_eq!(
            RoutePattern::parse("/a/{*rest}/b").unwrap_err(),
            PatternError::CatchAllNotLast("/a/{*rest}/b".into())
        );
        assert_eq!(
            RoutePattern::parse("/a/{}").unwrap_err(),
            PatternError::EmptyParameter("/a/{}".into())
        );
        assert!(matches!(
            RoutePattern::parse("/{id}/{id}").unwrap_err(),
            PatternError::DuplicateParameter { .. }
        ));
    }

    #[test]
    fn pattern_matching() {
        let pattern = RoutePattern::parse("/users/{id}").unwrap();
        assert_eq!(
            pattern.matches("/users/7"),
            Some(vec![("id".to_string(), "7".to_string())])
        );
        assert_eq!(pattern.matches("/users"), None);
        assert_eq!(pattern.matches("/users/7/posts"), None);

        let root = RoutePattern::parse("/").unwrap();
        assert_eq!(root.matches("/"), Some(vec![]));
    }

    #[tokio::test]
    async fn resolves_parameters() {
        let (ctx, result) = dispatch(Method::GET, "/api/users/42").await;
        result.unwrap();
        assert!(ctx.is_handled());
        assert_eq!(ctx.response_body(), b"user 42".as_slice());
    }

    #[tokio::test]
    async fn catch_all_takes_the_rest() {
        let (ctx, result) = dispatch(Method::GET, "/api/files/a/b/c.txt").await;
        result.unwrap();
        assert_eq!(ctx.response_body(), b"a/b/c.txt".as_slice());
    }

    #[tokio::test]
    async fn handler_without_body_still_handles() {
        let (ctx, result) = dispatch(Method::DELETE, "/api/users/42").await;
        result.unwrap();
        assert!(ctx.is_handled());
        assert_eq!(ctx.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn wrong_verb_is_method_not_allowed() {
        let (ctx, result) = dispatch(Method::POST, "/api/users/42").await;
        let err = result.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(ctx.response_headers().get(header::ALLOW).unwrap(), "GET, DELETE");
    }

    #[tokio::test]
    async fn unknown_path_passes_through() {
        let (ctx, result) = dispatch(Method::GET, "/api/nothing").await;
        result.unwrap();
        assert!(!ctx.is_handled());
    }
}
