//! Identifiers and stack snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, process-stable handle of a callable function
///
/// The zero value is reserved for native or otherwise unknown frames and is
/// never sent to name resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u64);

impl FunctionId {
    /// Placeholder id for native/unknown frames
    pub const NATIVE: FunctionId = FunctionId(0);

    pub fn is_native(self) -> bool {
        self == Self::NATIVE
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a sampled thread
pub type ThreadId = u64;

/// One captured call stack for one thread at one sampling instant
///
/// `frames` are in capture order: innermost frame first, outermost last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSnapshot {
    pub thread_id: ThreadId,
    pub frames: Vec<FunctionId>,
}

impl StackSnapshot {
    pub fn new(thread_id: ThreadId, frames: Vec<FunctionId>) -> Self {
        Self { thread_id, frames }
    }

    /// Build a snapshot from raw ids, innermost first
    pub fn from_raw(thread_id: ThreadId, frames: &[u64]) -> Self {
        Self::new(thread_id, frames.iter().copied().map(FunctionId).collect())
    }

    /// Frames from outermost to innermost, the order they are merged in
    pub fn outermost_first(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.frames.iter().rev().copied()
    }
}

/// Outcome of capturing one thread's stack during a polling round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadStackResult {
    /// The full stack was captured
    Success(StackSnapshot),

    /// The stack was deeper than the capture buffer allows
    LargeStackOverflow { thread_id: ThreadId },

    /// Capture was refused or failed, with the source's error code
    Failure { thread_id: ThreadId, error_code: u32 },
}

impl ThreadStackResult {
    pub fn thread_id(&self) -> ThreadId {
        match self {
            ThreadStackResult::Success(snapshot) => snapshot.thread_id,
            ThreadStackResult::LargeStackOverflow { thread_id } => *thread_id,
            ThreadStackResult::Failure { thread_id, .. } => *thread_id,
        }
    }
}

/// Resolved human-readable names for a function id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMethodNames {
    pub class_name: String,
    pub method_name: String,
}

impl ClassMethodNames {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }

    /// `"Class:Method"`, the form used by non-runnable signatures
    pub fn signature(&self) -> String {
        format!("{}:{}", self.class_name, self.method_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outermost_first_reverses_capture_order() {
        let snapshot = StackSnapshot::from_raw(7, &[3, 2, 1]);
        let order: Vec<u64> = snapshot.outermost_first().map(|f| f.0).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_thread_id_of_each_result() {
        assert_eq!(ThreadStackResult::Success(StackSnapshot::from_raw(4, &[1])).thread_id(), 4);
        assert_eq!(ThreadStackResult::LargeStackOverflow { thread_id: 5 }.thread_id(), 5);
        assert_eq!(
            ThreadStackResult::Failure { thread_id: 6, error_code: 2 }.thread_id(),
            6
        );
    }

    #[test]
    fn test_signature() {
        assert_eq!(ClassMethodNames::new("Foo", "Bar").signature(), "Foo:Bar");
        assert!(FunctionId(0).is_native());
        assert!(!FunctionId(9).is_native());
    }
}
