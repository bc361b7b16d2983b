//! Session start/stop entry points.
//!
//! Only one session may run at a time. Starting while a loop is active is
//! refused by the sampler; stopping with another session's id is a no-op.

use super::state::ProfilingCore;
use crate::names::NameSource;
use crate::output::ProfileTransport;
use crate::sampler::{CaptureSource, Sampler};
use crate::utils::config::{ProfilerConfig, INVALID_SESSION_ID};
use crate::utils::error::SessionError;
use log::{error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Owner of the sampler and all per-session state
///
/// **Public** - the entry point hosts embed
pub struct SessionController {
    core: Arc<ProfilingCore>,
    capture: Arc<dyn CaptureSource>,
    sampler: Mutex<Option<Sampler>>,
    config: Mutex<ProfilerConfig>,
}

impl SessionController {
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        name_source: Arc<dyn NameSource>,
        transport: Arc<dyn ProfileTransport>,
        config: ProfilerConfig,
    ) -> Self {
        Self {
            core: Arc::new(ProfilingCore::new(name_source, transport)),
            capture,
            sampler: Mutex::new(None),
            config: Mutex::new(config),
        }
    }

    fn sampler(&self) -> MutexGuard<'_, Option<Sampler>> {
        self.sampler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the configuration; applied at the next `start`
    pub fn update_config(&self, config: ProfilerConfig) {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub fn config(&self) -> ProfilerConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn core(&self) -> &ProfilingCore {
        &self.core
    }

    /// Id of the running session, 0 when none is active
    pub fn active_session_id(&self) -> i32 {
        self.core.active_session_id()
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler().as_ref().is_some_and(Sampler::is_running)
    }

    /// Start a session with explicit frequency and duration
    ///
    /// # Errors
    /// * `SessionError::InvalidSessionId` - `session_id` is 0
    /// * `SessionError::AlreadyActive` - a session is already sampling
    /// * `SessionError::SpawnFailed` - the sampler worker could not start
    pub fn try_start(
        &self,
        session_id: i32,
        frequency: Duration,
        duration: Duration,
    ) -> Result<(), SessionError> {
        if session_id == INVALID_SESSION_ID {
            return Err(SessionError::InvalidSessionId);
        }

        let mut config = self.config();
        config.sampling_frequency_ms = u64::try_from(frequency.as_millis()).unwrap_or(u64::MAX).max(1);
        config.session_duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1);

        let mut sampler = self.sampler();
        let sampler =
            sampler.get_or_insert_with(|| Sampler::new(Arc::clone(&self.capture), Arc::clone(&self.core)));

        sampler.start(session_id, config)?;

        info!(
            "Started thread profiling session {} ({:?} every {:?})",
            session_id, duration, frequency
        );
        Ok(())
    }

    /// Start a session; `false` if it could not be started
    pub fn start(&self, session_id: i32, frequency: Duration, duration: Duration) -> bool {
        match self.try_start(session_id, frequency, duration) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to start thread profiler session {}: {}", session_id, e);
                false
            }
        }
    }

    /// Stop the active session
    ///
    /// `session_id` 0 stops whichever session is active. When
    /// `report_data` is set the profile is built and sent before state is
    /// reset.
    ///
    /// # Errors
    /// * `SessionError::NoSampler` - no session was ever started
    /// * `SessionError::SessionMismatch` - another session is active; nothing changes
    pub fn try_stop(&self, session_id: i32, report_data: bool) -> Result<(), SessionError> {
        let sampler = self.sampler();
        let sampler = sampler.as_ref().ok_or(SessionError::NoSampler)?;

        let active = self.core.active_session_id();
        if session_id != INVALID_SESSION_ID && active != INVALID_SESSION_ID && active != session_id {
            return Err(SessionError::SessionMismatch {
                requested: session_id,
                active,
            });
        }

        sampler.stop(report_data);
        Ok(())
    }

    /// Stop the active session; `false` if nothing was stopped
    pub fn stop(&self, session_id: i32, report_data: bool) -> bool {
        match self.try_stop(session_id, report_data) {
            Ok(()) => true,
            Err(SessionError::NoSampler) => false,
            Err(e) => {
                warn!("Request to stop thread profiling session ignored: {}", e);
                false
            }
        }
    }

    /// Service shutdown: stop and report whatever is running
    pub fn shutdown(&self) {
        let active = self.active_session_id();
        self.stop(active, true);
    }
}
