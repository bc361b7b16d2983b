//! Configuration and constants for the profiler core.

use super::error::ConfigError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Current output schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Session id meaning "no active session"
pub const INVALID_SESSION_ID: i32 = 0;

/// Default upper bound on reported tree nodes
pub const DEFAULT_MAX_AGGREGATED_NODES: usize = 20_000;

/// Key under which the aggregated tree is reported
pub const PROFILE_SAMPLE_KEY: &str = "OTHER";

// Placeholder names handed out by the name resolver
pub const NATIVE_CLASS_NAME: &str = "Native";
pub const NATIVE_METHOD_NAME: &str = "Unknown Native Function";
pub const UNKNOWN_CLASS_NAME: &str = "Unknown class";
pub const EMPTY_CLASS_NAME: &str = "No_class_name";
pub const EMPTY_METHOD_NAME: &str = "No_method_name";

// Clamping bounds for collector start commands (seconds)
pub const MINIMUM_SAMPLING_FREQUENCY_SECONDS: f64 = 0.1;
pub const MAXIMUM_SAMPLING_FREQUENCY_SECONDS: f64 = 100.0;
pub const DEFAULT_SAMPLING_FREQUENCY_SECONDS: f64 = 0.1;
pub const MINIMUM_SAMPLING_DURATION_SECONDS: f64 = 120.0;
pub const MAXIMUM_SAMPLING_DURATION_SECONDS: f64 = 86_400.0;
pub const DEFAULT_SAMPLING_DURATION_SECONDS: f64 = 120.0;

/// Profiler settings supplied by the host's configuration layer.
///
/// A controller only reads these at `start`; edits made while a session
/// runs take effect on the next session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Interval between polling rounds, in milliseconds
    pub sampling_frequency_ms: u64,

    /// Total session length, in milliseconds
    pub session_duration_ms: u64,

    /// Node budget applied by the pruning pass
    pub max_aggregated_nodes: usize,

    /// Exact `"Class:Method"` leaf signatures treated as blocked/idle
    pub non_runnable_signatures: HashSet<String>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            sampling_frequency_ms: (DEFAULT_SAMPLING_FREQUENCY_SECONDS * 1000.0) as u64,
            session_duration_ms: (DEFAULT_SAMPLING_DURATION_SECONDS * 1000.0) as u64,
            max_aggregated_nodes: DEFAULT_MAX_AGGREGATED_NODES,
            non_runnable_signatures: HashSet::new(),
        }
    }
}

impl ProfilerConfig {
    /// Load a config from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading profiler config from: {}", path.display());

        let raw = std::fs::read_to_string(path)?;
        let config: ProfilerConfig = serde_json::from_str(&raw)?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the sampler cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_frequency_ms == 0 {
            return Err(ConfigError::Invalid(
                "sampling_frequency_ms must be greater than 0".to_string(),
            ));
        }
        if self.session_duration_ms == 0 {
            return Err(ConfigError::Invalid(
                "session_duration_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(bad) = self.non_runnable_signatures.iter().find(|s| !s.contains(':')) {
            return Err(ConfigError::Invalid(format!(
                "non-runnable signature '{}' is not of the form Class:Method",
                bad
            )));
        }
        Ok(())
    }

    pub fn sampling_frequency(&self) -> Duration {
        Duration::from_millis(self.sampling_frequency_ms)
    }

    pub fn session_duration(&self) -> Duration {
        Duration::from_millis(self.session_duration_ms)
    }
}
