//! Stackprof Core
//!
//! Aggregation core of an in-process call-stack sampling profiler.
//!
//! A capture source hands over per-thread stack snapshots on every sampling
//! tick. They are merged into a single call tree per session; when the
//! session ends the tree is named, reclassified, pruned to a node budget and
//! serialized for a transport to deliver.
//!
//! ## Getting Started
//!
//! ```ignore
//! let controller = SessionController::new(capture, names, transport, ProfilerConfig::default());
//! controller.start(4444, Duration::from_millis(100), Duration::from_secs(120));
//! // ...
//! controller.stop(4444, true);
//! ```

pub mod aggregator;
pub mod model;
pub mod names;
pub mod output;
pub mod sampler;
pub mod session;
pub mod utils;

pub use model::{ClassMethodNames, FunctionId, StackSnapshot, ThreadId, ThreadStackResult};
pub use session::SessionController;
pub use utils::config::ProfilerConfig;
