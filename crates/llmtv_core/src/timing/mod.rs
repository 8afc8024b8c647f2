//! Timing alignment: segment partition and per-segment content.
//!
//! The partition is duration driven. The transcript is only used to decide
//! what each segment's clip should show.

mod aligner;
mod planner;

pub use aligner::{align, is_partition};
pub use planner::plan_segments;
