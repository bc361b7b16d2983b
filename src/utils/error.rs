//! Error types for the entire crate.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs.

use crate::aggregator::NodeId;
use thiserror::Error;

/// Errors that can occur while starting or stopping a profiling session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A profiling session is already active")]
    AlreadyActive,

    #[error("Session id must be non-zero")]
    InvalidSessionId,

    #[error("No sampler has been created yet")]
    NoSampler,

    #[error("Session id mismatch: requested {requested}, active {active}")]
    SessionMismatch { requested: i32, active: i32 },

    #[error("Failed to spawn sampler worker: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

/// Errors reported by a capture source for a whole polling round
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture source is unavailable: {0}")]
    Unavailable(String),

    #[error("Capture request aborted")]
    Aborted,
}

/// Errors that can occur during the post-session aggregation pipeline
#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("Tree node {0:?} does not exist")]
    MissingNode(NodeId),

    #[error("Transport failed to accept profile: {0}")]
    Transport(String),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors raised while decoding collector command arguments
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("A valid profile_id must be supplied to start a thread profiling session.")]
    MissingProfileId,

    #[error("Invalid value for argument '{0}'")]
    InvalidArgument(&'static str),
}

/// Errors raised while loading profiler configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFailed(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
