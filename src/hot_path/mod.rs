//! Hot path: coalescing between the transport and presentation
//!
//! - schedule: schedule-once primitive (frame or microtask)
//! - render_batcher: one delivery per aggregation key per frame
//! - marker_batcher: deduplicated, time-sorted marker updates per microtask

pub mod marker_batcher;
pub mod render_batcher;
pub mod schedule;

pub use marker_batcher::{dedupe_markers, MarkerBatcher, MarkerCallback};
pub use render_batcher::{coalesce, AggregationKey, RenderBatcher};
pub use schedule::{ScheduleOnce, SchedulePolicy};
