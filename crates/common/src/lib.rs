//! MediaMerge Common Utilities
//!
//! Shared infrastructure for all MediaMerge crates:
//! - Error taxonomy and result aliases
//! - Render clock and frame pacing
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
