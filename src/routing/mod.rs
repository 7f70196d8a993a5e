//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Requested path
//!     → matcher.rs (module base route → match + remaining path)
//!     → table.rs (verb + pattern → handler, inside a module)
//!     → Return: handled context, or unhandled for the next module
//! ```
//!
//! # Design Decisions
//! - Route tables compiled at startup, immutable at runtime
//! - No regex in hot path (segment comparison only)
//! - First match wins (registration order)

pub mod matcher;
pub mod table;

pub use matcher::{match_base_route, RouteMatch};
pub use table::{PatternError, RouteHandler, RouteTable};
