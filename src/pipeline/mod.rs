//! Module dispatch pipeline.
//!
//! # Data Flow
//! ```text
//! RequestContext (from listener)
//!     → registry.rs (iterate modules in registration order)
//!     → routing::matcher (base route vs requested path)
//!     → module.rs (Module::handle)
//!     → stop when handled or when a final handler matched
//! ```
//!
//! # Design Decisions
//! - Registration order is dispatch order; there is no priority or reordering API
//! - The module list is swapped atomically on registration, readers never lock
//! - Handler failures propagate to the caller unchanged

pub mod error;
pub mod module;
pub mod registry;

pub use error::{ModuleError, RegistryError};
pub use module::{ContainerLink, HandlerFuture, Module};
pub use registry::{ModuleEntry, ModuleRegistry};
