//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! Request cookie (session id)
//!     → local.rs (LocalSessionProxy bound to the request)
//!     → manager.rs (SessionManager store, lazy creation, idle expiry)
//!     → Set-Cookie written by the listener adapter on create/regenerate/delete
//!
//! No session manager configured:
//!     → dummy.rs (shared DummySessionProxy)
//! ```
//!
//! # Design Decisions
//! - Modules only ever see the `SessionProxy` trait
//! - Sessions are created on first write, never by `exists`
//! - Each store operation locks one session entry; single-key writes are last-writer-wins
//! - Without a manager, lifecycle calls are no-ops and data calls fail loudly

pub mod dummy;
pub mod entry;
pub mod local;
pub mod manager;
pub mod proxy;

pub use dummy::DummySessionProxy;
pub use entry::Session;
pub use local::LocalSessionProxy;
pub use manager::{LocalSessionManager, SessionManager};
pub use proxy::{SessionError, SessionProxy};
