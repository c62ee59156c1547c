//! Garbage collection of tombstones and their log entries

pub mod engine;
pub mod safe_vector;

pub use engine::{GcEngine, GcPhase, GcStats, GcStep};
pub use safe_vector::{SafePoint, SafeVectorCalculator};
