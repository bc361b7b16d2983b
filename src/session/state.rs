//! Per-session shared state and the stop-time pipeline.
//!
//! The core owns the call tree, failure counters, name cache and session
//! metadata. The sampler worker feeds it during a session; when sampling
//! ends it runs resolve -> reclassify -> prune -> serialize -> send and
//! then resets everything for the next session.

use crate::aggregator::{prune_tree, reclassify_tree, CallTree};
use crate::model::{ThreadId, ThreadStackResult};
use crate::names::{NameResolver, NameSource};
use crate::output::{serialize_profile, ProfileTransport, ThreadProfile};
use crate::sampler::FailureTracker;
use crate::utils::config::{ProfilerConfig, INVALID_SESSION_ID};
use crate::utils::error::AggregationError;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Identity, timing and counters of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetadata {
    pub session_id: i32,
    pub start_time: DateTime<Utc>,
    pub stop_time: Option<DateTime<Utc>>,

    /// Polling rounds that returned results
    pub sample_count: u64,

    /// Distinct threads that returned a non-empty stack
    pub thread_count: u32,
}

#[derive(Debug)]
struct SessionState {
    session_id: i32,
    start_time: DateTime<Utc>,
    stop_time: Option<DateTime<Utc>>,
    sample_count: u64,
    threads: HashSet<ThreadId>,
    config: ProfilerConfig,
}

impl SessionState {
    fn new() -> Self {
        Self {
            session_id: INVALID_SESSION_ID,
            start_time: Utc::now(),
            stop_time: None,
            sample_count: 0,
            threads: HashSet::new(),
            config: ProfilerConfig::default(),
        }
    }

    fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            session_id: self.session_id,
            start_time: self.start_time,
            stop_time: self.stop_time,
            sample_count: self.sample_count,
            thread_count: u32::try_from(self.threads.len()).unwrap_or(u32::MAX),
        }
    }
}

/// State shared between the controller and the sampler worker
pub struct ProfilingCore {
    tree: Mutex<CallTree>,
    failures: FailureTracker,
    names: NameResolver,
    session: Mutex<SessionState>,
    name_source: Arc<dyn NameSource>,
    transport: Arc<dyn ProfileTransport>,
}

impl ProfilingCore {
    pub fn new(name_source: Arc<dyn NameSource>, transport: Arc<dyn ProfileTransport>) -> Self {
        Self {
            tree: Mutex::new(CallTree::new()),
            failures: FailureTracker::new(),
            names: NameResolver::new(),
            session: Mutex::new(SessionState::new()),
            name_source,
            transport,
        }
    }

    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the call tree
    ///
    /// Recovers from poisoning; a panicking merge leaves at worst a
    /// partially merged snapshot behind.
    pub fn tree(&self) -> MutexGuard<'_, CallTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    pub fn names(&self) -> &NameResolver {
        &self.names
    }

    pub fn active_session_id(&self) -> i32 {
        self.session().session_id
    }

    pub fn metadata(&self) -> SessionMetadata {
        self.session().metadata()
    }

    /// Settings captured when the current session started
    pub fn session_config(&self) -> ProfilerConfig {
        self.session().config.clone()
    }

    /// Reset all state and mark `session_id` as active
    pub fn begin_session(&self, session_id: i32, config: ProfilerConfig) {
        self.reset();

        let mut session = self.session();
        session.session_id = session_id;
        session.start_time = Utc::now();
        session.stop_time = None;
        session.config = config;

        info!("Thread profiling session {} started", session_id);
    }

    /// Dispatch one polling round's results
    ///
    /// **Public** - called by the sampler worker on every tick
    pub fn record_round(&self, results: Vec<ThreadStackResult>) {
        {
            let mut session = self.session();
            session.sample_count += 1;
            // Only threads that contributed frames are counted
            session.threads.extend(results.iter().filter_map(|result| match result {
                ThreadStackResult::Success(snapshot) if !snapshot.frames.is_empty() => {
                    Some(snapshot.thread_id)
                }
                _ => None,
            }));
        }

        for result in results {
            match result {
                ThreadStackResult::Success(snapshot) => {
                    self.tree().merge_snapshot(&snapshot);
                }
                ThreadStackResult::LargeStackOverflow { thread_id } => {
                    self.failures.record_large_stack(thread_id);
                }
                ThreadStackResult::Failure {
                    thread_id,
                    error_code,
                } => {
                    self.failures.record_failure(thread_id, error_code);
                }
            }
        }
    }

    /// Run the stop-time pipeline and hand the profile to the transport
    ///
    /// Must only run once no more rounds are being recorded.
    ///
    /// # Errors
    /// * `AggregationError::MissingNode` - the tree links to a node it does not hold
    /// * `AggregationError::Transport` - the transport rejected the profile
    pub fn perform_aggregation(&self) -> Result<ThreadProfile, AggregationError> {
        let started = Instant::now();
        debug!("Starting aggregation at {}", Utc::now().format("%H:%M:%S%.3f"));

        let (meta, config) = {
            let mut session = self.session();
            session.stop_time = Some(Utc::now());
            (session.metadata(), session.config.clone())
        };

        let profile = {
            let mut tree = self.tree();

            self.names.resolve_names(&mut tree, self.name_source.as_ref());
            reclassify_tree(&mut tree, &config.non_runnable_signatures)?;
            prune_tree(&mut tree, config.max_aggregated_nodes);

            serialize_profile(&tree, &meta)
        };

        // The collector expects an array even though there is one profile
        self.transport.send_profiles(std::slice::from_ref(&profile))?;

        self.failures.log_summary();

        info!(
            "Session {} aggregated: {} samples, {} threads, {} nodes in {:.2}s",
            profile.session_id,
            profile.sample_count,
            profile.thread_count,
            profile.node_count(),
            started.elapsed().as_secs_f64()
        );

        Ok(profile)
    }

    /// End the current session, optionally reporting it first
    ///
    /// The session id is cleared and state reset even if aggregation fails
    /// or panics.
    ///
    /// # Returns
    /// The delivered profile, if one was produced
    pub fn finish_session(&self, report_data: bool) -> Option<ThreadProfile> {
        let profile = if report_data {
            match panic::catch_unwind(AssertUnwindSafe(|| self.perform_aggregation())) {
                Ok(Ok(profile)) => Some(profile),
                Ok(Err(e)) => {
                    error!("Exception performing thread profiling data aggregation: {}", e);
                    None
                }
                Err(_) => {
                    error!("Thread profiling data aggregation panicked");
                    None
                }
            }
        } else {
            None
        };

        let session_id = {
            let mut session = self.session();
            std::mem::replace(&mut session.session_id, INVALID_SESSION_ID)
        };
        self.reset();

        info!("Thread profiling session {} finished", session_id);

        profile
    }

    /// Clear a session id without reporting, used when a start is abandoned
    pub fn abandon_session(&self) {
        self.session().session_id = INVALID_SESSION_ID;
        self.reset();
    }

    /// Clear the tree, pruning list, name cache, failures and counters
    pub fn reset(&self) {
        self.tree().clear();
        self.names.clear();
        self.failures.clear();

        let mut session = self.session();
        session.sample_count = 0;
        session.threads.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassMethodNames, FunctionId, StackSnapshot};
    use crate::output::MemoryTransport;
    use std::collections::HashMap;

    fn names(ids: &HashSet<FunctionId>) -> HashMap<FunctionId, ClassMethodNames> {
        ids.iter()
            .map(|id| match id.0 {
                99 => (*id, ClassMethodNames::new("Foo", "Bar")),
                n => (*id, ClassMethodNames::new("App", format!("m{}", n))),
            })
            .collect()
    }

    fn core_with(transport: Arc<MemoryTransport>) -> ProfilingCore {
        ProfilingCore::new(Arc::new(names), transport)
    }

    fn success(thread: u64, frames: &[u64]) -> ThreadStackResult {
        ThreadStackResult::Success(StackSnapshot::from_raw(thread, frames))
    }

    #[test]
    fn test_record_round_dispatches_results() {
        let core = core_with(Arc::new(MemoryTransport::new()));
        core.begin_session(3, ProfilerConfig::default());

        core.record_round(vec![
            success(1, &[2, 1]),
            ThreadStackResult::LargeStackOverflow { thread_id: 2 },
            ThreadStackResult::Failure { thread_id: 3, error_code: 8 },
        ]);

        assert_eq!(core.tree().node_count(), 2);
        let summary = core.failures().summary();
        assert_eq!(summary.large_stack_threads, 1);
        assert_eq!(summary.failed_threads, 1);

        let meta = core.metadata();
        assert_eq!(meta.session_id, 3);
        assert_eq!(meta.sample_count, 1);
        assert_eq!(meta.thread_count, 1);
    }

    #[test]
    fn test_thread_count_ignores_threads_without_frames() {
        let transport = Arc::new(MemoryTransport::new());
        let core = core_with(transport.clone());
        core.begin_session(6, ProfilerConfig::default());

        core.record_round(vec![
            success(1, &[1]),
            success(2, &[]),
            ThreadStackResult::LargeStackOverflow { thread_id: 3 },
            ThreadStackResult::Failure { thread_id: 4, error_code: 5 },
        ]);
        core.record_round(vec![success(1, &[1]), success(5, &[2])]);

        let profile = core.finish_session(true).unwrap();
        assert_eq!(profile.thread_count, 2);
        assert_eq!(profile.runnable_thread_count, 2);
        assert_eq!(profile.sample_count, 2);
    }

    #[test]
    fn test_finish_session_reports_and_resets() {
        let transport = Arc::new(MemoryTransport::new());
        let core = core_with(transport.clone());
        let mut config = ProfilerConfig::default();
        config.non_runnable_signatures.insert("Foo:Bar".to_string());
        core.begin_session(11, config);

        for _ in 0..5 {
            core.record_round(vec![success(1, &[99, 2, 1])]);
        }
        core.record_round(vec![success(1, &[4, 2, 1])]);

        let profile = core.finish_session(true).unwrap();
        assert_eq!(profile.session_id, 11);
        assert_eq!(profile.sample_count, 6);

        let top = &profile.roots()[0];
        assert_eq!(top.method_name, "m1");
        assert_eq!(top.runnable_count, 1);
        let blocked = top.child("m2").unwrap().child("Bar").unwrap();
        assert_eq!(blocked.runnable_count, 0);

        assert_eq!(transport.delivered().len(), 1);
        assert_eq!(core.active_session_id(), INVALID_SESSION_ID);
        assert_eq!(core.tree().node_count(), 0);
        assert_eq!(core.names().cache_len(), 0);
        assert_eq!(core.metadata().sample_count, 0);
    }

    #[test]
    fn test_finish_without_report_sends_nothing() {
        let transport = Arc::new(MemoryTransport::new());
        let core = core_with(transport.clone());
        core.begin_session(5, ProfilerConfig::default());
        core.record_round(vec![success(1, &[1])]);

        assert!(core.finish_session(false).is_none());
        assert!(transport.delivered().is_empty());
        assert_eq!(core.active_session_id(), INVALID_SESSION_ID);
    }

    #[test]
    fn test_transport_failure_still_resets() {
        struct Refusing;
        impl ProfileTransport for Refusing {
            fn send_profiles(&self, _: &[ThreadProfile]) -> Result<(), AggregationError> {
                Err(AggregationError::Transport("collector unreachable".to_string()))
            }
        }

        let core = ProfilingCore::new(Arc::new(names), Arc::new(Refusing));
        core.begin_session(8, ProfilerConfig::default());
        core.record_round(vec![success(1, &[1])]);

        assert!(core.finish_session(true).is_none());
        assert_eq!(core.active_session_id(), INVALID_SESSION_ID);
        assert_eq!(core.tree().node_count(), 0);
    }

    #[test]
    fn test_name_source_panic_still_resets() {
        let exploding = |_: &HashSet<FunctionId>| -> HashMap<FunctionId, ClassMethodNames> {
            panic!("name source crashed")
        };
        let core = ProfilingCore::new(Arc::new(exploding), Arc::new(MemoryTransport::new()));
        core.begin_session(8, ProfilerConfig::default());
        core.record_round(vec![success(1, &[1])]);

        assert!(core.finish_session(true).is_none());
        assert_eq!(core.active_session_id(), INVALID_SESSION_ID);
    }

    #[test]
    fn test_pruning_uses_session_budget() {
        let transport = Arc::new(MemoryTransport::new());
        let core = core_with(transport);
        let config = ProfilerConfig {
            max_aggregated_nodes: 1,
            ..Default::default()
        };
        core.begin_session(2, config);
        core.record_round(vec![success(1, &[3, 2, 1])]);

        let profile = core.finish_session(true).unwrap();
        assert_eq!(profile.node_count(), 1);
    }
}
