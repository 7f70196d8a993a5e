//! Adaptive client banning.
//!
//! # Data Flow
//! ```text
//! request ──▶ BanningModule ──▶ BanningRegistry::get_or_create(route_id)
//!                                       │
//!                                       ▼
//!                              BanningConfiguration (client -> offense state)
//!                                       ▲
//! PurgeScheduler (every interval) ──────┘ purge expired entries
//! ```

pub mod configuration;
pub mod module;
pub mod registry;

pub use configuration::{BanInfo, BanningConfiguration, Verdict};
pub use module::BanningModule;
pub use registry::BanningRegistry;
