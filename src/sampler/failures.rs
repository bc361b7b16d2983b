//! Bookkeeping for stack captures that did not produce a snapshot.
//!
//! Failures never stop a session; they are only counted so the session can
//! log a summary when it ends.

use crate::model::ThreadId;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct FailureRecords {
    /// Threads whose stack was too large to capture
    large_stack_threads: BTreeSet<ThreadId>,

    /// Failure count per thread
    failed_threads: BTreeMap<ThreadId, u32>,

    /// Last error code seen per thread
    error_codes: BTreeMap<ThreadId, u32>,
}

/// Snapshot of the failure counters, for logging and tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureSummary {
    pub large_stack_threads: usize,
    pub failed_threads: usize,
    pub total_failures: u64,
    pub error_codes: BTreeMap<ThreadId, u32>,
}

impl FailureSummary {
    pub fn is_empty(&self) -> bool {
        self.large_stack_threads == 0 && self.failed_threads == 0
    }
}

/// Lock-protected per-thread failure counters
#[derive(Debug, Default)]
pub struct FailureTracker {
    records: Mutex<FailureRecords>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that `thread_id`'s stack overflowed the capture buffer
    ///
    /// Membership only; repeats on the same thread are not counted.
    pub fn record_large_stack(&self, thread_id: ThreadId) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.large_stack_threads.insert(thread_id);
    }

    /// Count a generic capture failure for `thread_id`
    ///
    /// Only the most recent error code per thread is kept.
    pub fn record_failure(&self, thread_id: ThreadId, error_code: u32) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        *records.failed_threads.entry(thread_id).or_insert(0) += 1;
        records.error_codes.insert(thread_id, error_code);
    }

    pub fn summary(&self) -> FailureSummary {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        FailureSummary {
            large_stack_threads: records.large_stack_threads.len(),
            failed_threads: records.failed_threads.len(),
            total_failures: records.failed_threads.values().map(|c| u64::from(*c)).sum(),
            error_codes: records.error_codes.clone(),
        }
    }

    /// Emit the end-of-session diagnostics
    pub fn log_summary(&self) {
        let summary = self.summary();

        if summary.large_stack_threads > 0 {
            debug!(
                "Unable to retrieve the entire stack for {} threads",
                summary.large_stack_threads
            );
        }
        if summary.failed_threads > 0 {
            debug!(
                "Unable to retrieve a stack for {} threads ({} failures)",
                summary.failed_threads, summary.total_failures
            );
        }

        trace!("Failed thread error codes:");
        for (thread_id, code) in &summary.error_codes {
            trace!("ThreadId: {}  ErrorCode: {}", thread_id, code);
        }
    }

    pub fn clear(&self) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.large_stack_threads.clear();
        records.failed_threads.clear();
        records.error_codes.clear();
    }
}
