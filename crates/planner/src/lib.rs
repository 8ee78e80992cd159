//! MediaMerge Timeline Planner
//!
//! Turns the number of cover images, the natural length of the screen
//! recording, and a [`DurationPolicy`](mediamerge_composition_model::DurationPolicy)
//! into a [`TimelinePlan`](mediamerge_composition_model::TimelinePlan).
//!
//! ```text
//! | banner 0 |x| banner 1 |x| main content ............ | end card |
//!            ^ crossfade window overlapping into the next phase
//! ```

pub mod plan;

pub use plan::*;
