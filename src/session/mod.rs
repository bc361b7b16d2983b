//! Session lifecycle: controller, shared core and collector commands.

pub mod command;
pub mod controller;
pub mod state;

pub use command::{process_start_command, process_stop_command, StartCommandArgs, StopCommandArgs};
pub use controller::SessionController;
pub use state::{ProfilingCore, SessionMetadata};
