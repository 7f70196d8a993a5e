//! Per-request context handed to every module in the chain.
//!
//! # Responsibilities
//! - Carry the request view (verb, path, headers, client address, body)
//! - Collect the response (status, headers, body) written by modules
//! - Hold the one-way handled flag that stops the module chain
//! - Expose the session proxy and, for upgradable requests, the WebSocket upgrade
//!
//! # Design Decisions
//! - The requested path is derived once, at construction
//! - There is no way to clear the handled flag once set

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use serde::Serialize;

use crate::pipeline::ModuleError;
use crate::routing::RouteMatch;
use crate::session::{DummySessionProxy, SessionProxy};

/// State of one request as it travels through the module chain.
pub struct RequestContext {
    id: String,
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    remote_addr: SocketAddr,
    body: Bytes,
    requested_path: String,
    route: RouteMatch,
    route_params: HashMap<String, String>,
    handled: bool,
    status: StatusCode,
    response_headers: HeaderMap,
    response_body: Bytes,
    session: Arc<dyn SessionProxy>,
    upgrade: Option<WebSocketUpgrade>,
    upgraded: Option<Response>,
}

impl RequestContext {
    /// Start building a context for `method` on `uri` (path plus optional query).
    pub fn builder(method: Method, uri: impl Into<String>) -> RequestContextBuilder {
        RequestContextBuilder::new(method, uri.into())
    }

    /// Unique id of this request.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request header as text; `None` if missing or not visible ASCII.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers.get(name.as_ref()).and_then(|v| v.to_str().ok())
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// True when the client connected from the loopback interface.
    pub fn is_local(&self) -> bool {
        self.remote_addr.ip().is_loopback()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Normalized path used for module matching.
    pub fn requested_path(&self) -> &str {
        &self.requested_path
    }

    /// Match of the module currently handling the request.
    pub fn route(&self) -> &RouteMatch {
        &self.route
    }

    pub(crate) fn set_route(&mut self, route: RouteMatch) {
        self.route = route;
    }

    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.route_params.get(name).map(String::as_str)
    }

    pub(crate) fn set_route_params(&mut self, params: Vec<(String, String)>) {
        self.route_params = params.into_iter().collect();
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Mark the request handled. No module after the current one will see it.
    pub fn set_handled(&mut self) {
        self.handled = true;
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    /// Replace a response header.
    pub fn set_response_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response_headers.insert(name, value);
    }

    pub fn response_body(&self) -> &[u8] {
        &self.response_body
    }

    /// Write a complete response and mark the request handled.
    pub fn respond(&mut self, status: StatusCode, body: impl Into<Bytes>) {
        self.status = status;
        self.response_body = body.into();
        self.handled = true;
    }

    /// Write a JSON response and mark the request handled.
    pub fn respond_json<T: Serialize>(&mut self, status: StatusCode, value: &T) -> Result<(), ModuleError> {
        let body = serde_json::to_vec(value).map_err(|e| ModuleError::Internal(e.to_string()))?;
        self.response_headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.respond(status, body);
        Ok(())
    }

    pub fn session(&self) -> &dyn SessionProxy {
        self.session.as_ref()
    }

    /// True if the listener offered a WebSocket upgrade for this request.
    pub fn is_upgradable(&self) -> bool {
        self.upgrade.is_some()
    }

    pub(crate) fn take_upgrade(&mut self) -> Option<WebSocketUpgrade> {
        self.upgrade.take()
    }

    /// Hand the connection over to an upgrade response. The chain ends here.
    pub(crate) fn respond_upgraded(&mut self, response: Response) {
        self.upgraded = Some(response);
        self.handled = true;
    }

    pub(crate) fn take_upgraded(&mut self) -> Option<Response> {
        self.upgraded.take()
    }

    pub(crate) fn take_response_body(&mut self) -> Bytes {
        std::mem::take(&mut self.response_body)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("remote_addr", &self.remote_addr)
            .field("handled", &self.handled)
            .field("status", &self.status)
            .finish()
    }
}

/// Builder for [`RequestContext`], used by the listener adapter and by tests.
pub struct RequestContextBuilder {
    id: Option<String>,
    method: Method,
    uri: String,
    headers: HeaderMap,
    remote_addr: SocketAddr,
    body: Bytes,
    session: Option<Arc<dyn SessionProxy>>,
    upgrade: Option<WebSocketUpgrade>,
}

impl RequestContextBuilder {
    fn new(method: Method, uri: String) -> Self {
        Self {
            id: None,
            method,
            uri,
            headers: HeaderMap::new(),
            remote_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            body: Bytes::new(),
            session: None,
            upgrade: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = addr;
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Append one header; invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn session(mut self, session: Arc<dyn SessionProxy>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn upgrade(mut self, upgrade: WebSocketUpgrade) -> Self {
        self.upgrade = Some(upgrade);
        self
    }

    pub fn build(self) -> RequestContext {
        let (path, query) = match self.uri.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (self.uri, None),
        };
        let requested_path = requested_path(&path);

        RequestContext {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            method: self.method,
            path,
            query,
            headers: self.headers,
            remote_addr: self.remote_addr,
            body: self.body,
            requested_path,
            route: RouteMatch::none(),
            route_params: HashMap::new(),
            handled: false,
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: Bytes::new(),
            session: self.session.unwrap_or_else(DummySessionProxy::shared),
            upgrade: self.upgrade,
            upgraded: None,
        }
    }
}

/// Leading `/`, empty segments collapsed.
fn requested_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() || path.ends_with('/') {
        normalized.push('/');
    }
    normalized
}
