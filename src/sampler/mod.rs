//! Sampling: the polling loop and capture-failure bookkeeping.

pub mod failures;
pub mod scheduler;

pub use failures::{FailureSummary, FailureTracker};
pub use scheduler::{CaptureSource, Sampler};
