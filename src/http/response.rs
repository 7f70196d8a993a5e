//! Turning a dispatched context into an HTTP response.
//!
//! # Responsibilities
//! - Copy status, headers and body written by modules
//! - Answer requests no module handled with `404 Not Found`
//! - Map module errors to their status (client errors) or `500`
//! - Write pending session cookie changes as `Set-Cookie`
//!
//! # Design Decisions
//! - Response headers written by modules survive fallback and error responses
//! - Server error details stay in the logs, never in the body

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

use crate::http::RequestContext;
use crate::pipeline::ModuleError;

/// Response for a context the module chain finished with.
pub fn from_context(ctx: &mut RequestContext) -> Response {
    if let Some(mut upgraded) = ctx.take_upgraded() {
        append_session_cookie(ctx, &mut upgraded);
        return upgraded;
    }

    if !ctx.is_handled() {
        tracing::debug!(request_id = %ctx.id(), path = %ctx.path(), "No module handled request");
        return build(ctx, StatusCode::NOT_FOUND, Body::from("Not Found"));
    }

    let status = ctx.status();
    let body = Body::from(ctx.take_response_body());
    build(ctx, status, body)
}

/// Response for a context whose dispatch failed with `err`.
pub fn from_error(ctx: &mut RequestContext, err: &ModuleError) -> Response {
    let status = err.status_code();
    let body = if err.is_client_error() {
        tracing::debug!(request_id = %ctx.id(), status = %status, error = %err, "Request rejected");
        Body::from(err.to_string())
    } else {
        tracing::error!(request_id = %ctx.id(), error = %err, "Module failed while handling request");
        Body::from(
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error"),
        )
    };
    build(ctx, status, body)
}

fn build(ctx: &mut RequestContext, status: StatusCode, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = std::mem::take(ctx.response_headers_mut());
    append_session_cookie(ctx, &mut response);
    response
}

fn append_session_cookie(ctx: &RequestContext, response: &mut Response) {
    let Some(cookie) = ctx.session().pending_cookie() else {
        return;
    };
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => {
            tracing::warn!(request_id = %ctx.id(), error = %e, "Session cookie is not a valid header value");
        }
    }
}
