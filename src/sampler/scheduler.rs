//! Periodic polling of the capture source.
//!
//! A single worker thread waits on a shutdown channel with a timeout equal
//! to the sampling frequency. Every timeout is a tick: one synchronous
//! capture request whose results are dispatched to the core. The worker
//! ends on a shutdown signal or once the session duration has elapsed, and
//! finishes the session (reporting it if asked) before it exits.

use crate::model::ThreadStackResult;
use crate::session::ProfilingCore;
use crate::utils::config::ProfilerConfig;
use crate::utils::error::{CaptureError, SessionError};
use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// External source of per-thread stack captures
///
/// Called once per tick from the sampler worker; may block.
pub trait CaptureSource: Send + Sync {
    fn request_snapshot(&self) -> Result<Vec<ThreadStackResult>, CaptureError>;
}

impl<F> CaptureSource for F
where
    F: Fn() -> Result<Vec<ThreadStackResult>, CaptureError> + Send + Sync,
{
    fn request_snapshot(&self) -> Result<Vec<ThreadStackResult>, CaptureError> {
        self()
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Stop { report_data: bool },
}

struct Worker {
    shutdown: Sender<Signal>,
    handle: JoinHandle<()>,
}

/// Drives one polling loop at a time
pub struct Sampler {
    capture: Arc<dyn CaptureSource>,
    core: Arc<ProfilingCore>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl Sampler {
    pub fn new(capture: Arc<dyn CaptureSource>, core: Arc<ProfilingCore>) -> Self {
        Self {
            capture,
            core,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Whether a polling loop is currently active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Begin `session_id` and start polling
    ///
    /// **Public** - called by the session controller
    ///
    /// Session state is only touched once the sampler has agreed to start.
    ///
    /// # Errors
    /// * `SessionError::AlreadyActive` - a polling loop is already running
    /// * `SessionError::SpawnFailed` - the worker thread could not be created
    pub fn start(&self, session_id: i32, config: ProfilerConfig) -> Result<(), SessionError> {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        if self.is_running() {
            return Err(SessionError::AlreadyActive);
        }

        // A loop that ended on its own still has to be joined
        if let Some(stale) = slot.take() {
            join_worker(stale.handle);
        }

        let frequency = config.sampling_frequency();
        let duration = config.session_duration();

        self.core.begin_session(session_id, config);
        self.running.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel();
        let context = LoopContext {
            capture: Arc::clone(&self.capture),
            core: Arc::clone(&self.core),
            running: Arc::clone(&self.running),
            frequency,
            duration,
        };

        let spawned = thread::Builder::new()
            .name("stackprof-sampler".to_string())
            .spawn(move || context.run(rx));

        match spawned {
            Ok(handle) => {
                debug!(
                    "Sampler started: every {:?} for {:?}",
                    frequency, duration
                );
                *slot = Some(Worker {
                    shutdown: tx,
                    handle,
                });
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.core.abandon_session();
                Err(SessionError::SpawnFailed(e))
            }
        }
    }

    /// Signal the loop to stop and wait for it to finish the session
    ///
    /// Wakes the polling wait immediately; a capture request already in
    /// flight is allowed to complete first.
    pub fn stop(&self, report_data: bool) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(worker) = worker else {
            debug!("Sampler stop requested with no worker");
            return;
        };

        // A closed channel means the loop already ended on its own
        if worker.shutdown.send(Signal::Stop { report_data }).is_err() {
            debug!("Sampler loop had already exited");
        }
        join_worker(worker.handle);
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop(false);
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("Sampler worker thread panicked");
    }
}

struct LoopContext {
    capture: Arc<dyn CaptureSource>,
    core: Arc<ProfilingCore>,
    running: Arc<AtomicBool>,
    frequency: Duration,
    duration: Duration,
}

impl LoopContext {
    fn run(self, shutdown: mpsc::Receiver<Signal>) {
        let started = Instant::now();

        let report_data = loop {
            match shutdown.recv_timeout(self.frequency) {
                Ok(Signal::Stop { report_data }) => break report_data,
                Err(RecvTimeoutError::Disconnected) => break false,
                Err(RecvTimeoutError::Timeout) => {}
            }

            self.tick();

            if started.elapsed() >= self.duration {
                info!(
                    "Profiling duration of {:?} elapsed, ending session",
                    self.duration
                );
                break true;
            }
        };

        self.core.finish_session(report_data);
        self.running.store(false, Ordering::SeqCst);
    }

    /// One polling round; nothing raised here ends the session
    fn tick(&self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            match self.capture.request_snapshot() {
                Ok(results) => self.core.record_round(results),
                Err(e) => warn!("Stack capture request failed: {}", e),
            }
        }));

        if outcome.is_err() {
            error!("Panic while processing a sampling tick; continuing");
        }
    }
}
