//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (http::server):
//!     Load config → Build modules → start_all → Start purge scheduler → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests → Stop scheduler → Dispose modules
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: modules start before the listener accepts traffic
//! - One shutdown coordinator; every background task holds a signal

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
