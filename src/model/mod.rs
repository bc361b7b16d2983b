//! Core data types exchanged with the capture and name sources.
//!
//! This module defines:
//! - Opaque function and thread identifiers
//! - Per-thread capture results handed over by the capture source
//! - Resolved class/method name pairs

pub mod snapshot;

// Re-export main types
pub use snapshot::{ClassMethodNames, FunctionId, StackSnapshot, ThreadId, ThreadStackResult};
