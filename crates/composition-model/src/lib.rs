//! MediaMerge Composition Model
//!
//! Defines the core data contracts for a composition run:
//! - **Config:** The immutable per-run visual and audio options
//! - **Assets:** Raw input files, their kinds, and asset-set validation
//! - **Timeline:** Phases of the output video and the duration policies
//! - **Result:** The finished blob, thumbnail, and metadata handed to callers
//!
//! All timeline offsets are integer nanoseconds so phase durations add up
//! to the plan total exactly.

pub mod asset;
pub mod config;
pub mod format;
pub mod result;
pub mod timeline;

pub use asset::*;
pub use config::*;
pub use format::*;
pub use result::*;
pub use timeline::*;
