//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod run;
pub mod utils;

// Re-export main command functions
pub use run::{execute_run, validate_args, RunArgs};
pub use utils::{display_schema, display_version, validate_profile_file};
