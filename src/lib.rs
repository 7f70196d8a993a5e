//! Embeddable HTTP server core.
//!
//! Requests coming from the listener are turned into a [`RequestContext`] and run
//! through an ordered chain of modules held by a [`ModuleRegistry`]. Cross-origin
//! enforcement, client banning, sessions and duplex message channels are built as
//! participants of that chain.

pub mod admin;
pub mod banning;
pub mod channel;
pub mod config;
pub mod cors;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod routing;
pub mod scheduler;
pub mod session;

pub use config::schema::ServerConfig;
pub use http::{HttpServer, RequestContext};
pub use lifecycle::{Shutdown, ShutdownSignal};
pub use pipeline::{Module, ModuleError, ModuleRegistry};
