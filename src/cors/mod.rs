//! Cross-origin resource sharing.
//!
//! # Data Flow
//! ```text
//! config.cors ──▶ CorsPolicy (split + normalized once)
//!                     │
//! request ──▶ CorsModule ──▶ allow-origin header / preflight answer / 400
//! ```

pub mod module;
pub mod policy;

pub use module::CorsModule;
pub use policy::{CorsConfigError, CorsOutcome, CorsPolicy, ALL};
