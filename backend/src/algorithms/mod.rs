//! Pure, synchronous algorithms: window algebra, target grouping and timing
//! constraints. Nothing here owns shared state, so every function is safe to
//! call from any task without locking.

pub mod clustering;
pub mod geometry;
pub mod timing;
pub mod windows;

pub use clustering::TargetGrouping;
pub use timing::passes_time_constraints;
pub use windows::{
    clearance_windows, merge_with_closures, shuttering_gaps, shuttering_windows,
    subtract_closures,
};
