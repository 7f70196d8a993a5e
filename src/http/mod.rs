//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, fallback handler)
//!     → request.rs (request ID)
//!     → context.rs (RequestContext built once per request)
//!     → ModuleRegistry::dispatch_request
//!     → response.rs (context or error → response, Set-Cookie)
//!     → Send to client
//! ```

pub mod context;
pub mod request;
pub mod response;
pub mod server;

pub use context::{RequestContext, RequestContextBuilder};
pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ServerError};
