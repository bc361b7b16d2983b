//! Serialization and delivery of finished profiles.
//!
//! This module handles:
//! - Building the positional wire form of a session's call tree
//! - Writing/reading profiles as JSON files
//! - The transport hand-off used at the end of a session

pub mod json;
pub mod profile;
pub mod transport;

// Re-export main functions
pub use json::{profiles_to_string, read_profiles, write_profiles};
pub use profile::{serialize_profile, ReportedNode, ThreadProfile};
pub use transport::{FileTransport, MemoryTransport, ProfileTransport};
