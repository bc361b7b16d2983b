//! Hand-off of finished profiles to whoever delivers them.
//!
//! Delivery, retries and backoff belong to the transport; the core calls
//! `send_profiles` once per session and only logs a failure.

use super::json::write_profiles;
use super::profile::ThreadProfile;
use crate::utils::error::AggregationError;
use log::info;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Receiver of serialized profiles
pub trait ProfileTransport: Send + Sync {
    fn send_profiles(&self, profiles: &[ThreadProfile]) -> Result<(), AggregationError>;
}

/// Writes each delivered profile batch to a JSON file
#[derive(Debug, Clone)]
pub struct FileTransport {
    path: PathBuf,
}

impl FileTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ProfileTransport for FileTransport {
    fn send_profiles(&self, profiles: &[ThreadProfile]) -> Result<(), AggregationError> {
        write_profiles(profiles, &self.path).map_err(|e| AggregationError::Transport(e.to_string()))?;
        info!("✓ Profile delivered to: {}", self.path.display());
        Ok(())
    }
}

/// Keeps delivered profiles in memory
#[derive(Debug, Default)]
pub struct MemoryTransport {
    delivered: Mutex<Vec<ThreadProfile>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, oldest first
    pub fn delivered(&self) -> Vec<ThreadProfile> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProfileTransport for MemoryTransport {
    fn send_profiles(&self, profiles: &[ThreadProfile]) -> Result<(), AggregationError> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(profiles);
        Ok(())
    }
}
