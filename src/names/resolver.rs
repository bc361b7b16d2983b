//! Batch name resolution with a per-session cache.
//!
//! All distinct non-native ids in the tree are sent to the name source in a
//! single batch. Every node then gets a name: the resolved one, the native
//! placeholder for id zero, or an "unknown" placeholder when the source did
//! not answer for that id.

use crate::aggregator::CallTree;
use crate::model::{ClassMethodNames, FunctionId};
use crate::utils::config::{
    EMPTY_CLASS_NAME, EMPTY_METHOD_NAME, NATIVE_CLASS_NAME, NATIVE_METHOD_NAME, UNKNOWN_CLASS_NAME,
};
use log::{debug, log_enabled, trace, Level};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

/// External service that maps function ids to names
///
/// Ids missing from the returned map are treated as unresolved.
pub trait NameSource: Send + Sync {
    fn resolve_batch(&self, ids: &HashSet<FunctionId>) -> HashMap<FunctionId, ClassMethodNames>;
}

impl<F> NameSource for F
where
    F: Fn(&HashSet<FunctionId>) -> HashMap<FunctionId, ClassMethodNames> + Send + Sync,
{
    fn resolve_batch(&self, ids: &HashSet<FunctionId>) -> HashMap<FunctionId, ClassMethodNames> {
        self(ids)
    }
}

/// Counts from one resolution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Distinct non-native ids sent to the source
    pub requested: usize,

    /// Ids the source returned names for
    pub resolved: usize,
}

impl ResolveReport {
    pub fn unresolved(&self) -> usize {
        self.requested - self.resolved
    }
}

/// Function-name cache, cleared at every session boundary
#[derive(Debug, Default)]
pub struct NameResolver {
    cache: Mutex<HashMap<FunctionId, ClassMethodNames>>,
}

impl NameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and assign names for every node in `tree`
    ///
    /// **Public** - first step of the stop-time pipeline
    pub fn resolve_names(&self, tree: &mut CallTree, source: &dyn NameSource) -> ResolveReport {
        let ids = tree.function_ids();
        debug!("Resolving names for {} distinct function ids", ids.len());

        let answers = if ids.is_empty() {
            HashMap::new()
        } else {
            source.resolve_batch(&ids)
        };

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        for (id, names) in answers {
            // Only ids that were asked for are cached
            if ids.contains(&id) {
                cache.entry(id).or_insert_with(|| normalize(names));
            }
        }

        if log_enabled!(Level::Trace) {
            for id in ids.iter().filter(|id| !cache.contains_key(id)) {
                trace!("Function name lookup failed for id {}", id);
            }
        }

        let report = ResolveReport {
            requested: ids.len(),
            resolved: ids.iter().filter(|id| cache.contains_key(id)).count(),
        };

        tree.for_each_node_mut(|node| {
            node.names = Some(lookup(&cache, node.function_id));
        });

        debug!(
            "Name resolution complete: {} resolved, {} unresolved",
            report.resolved,
            report.unresolved()
        );

        report
    }

    /// Cached names for `id`, if resolved this session
    pub fn cached(&self, id: FunctionId) -> Option<ClassMethodNames> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

fn lookup(cache: &HashMap<FunctionId, ClassMethodNames>, id: FunctionId) -> ClassMethodNames {
    if id.is_native() {
        return native_names();
    }
    cache.get(&id).cloned().unwrap_or_else(|| unknown_names(id))
}

/// Placeholder for native/unknown frames
pub fn native_names() -> ClassMethodNames {
    ClassMethodNames::new(NATIVE_CLASS_NAME, NATIVE_METHOD_NAME)
}

/// Placeholder for ids the source could not resolve
pub fn unknown_names(id: FunctionId) -> ClassMethodNames {
    ClassMethodNames::new(UNKNOWN_CLASS_NAME, format!("Unknown method({})", id))
}

fn normalize(mut names: ClassMethodNames) -> ClassMethodNames {
    if names.class_name.is_empty() {
        names.class_name = EMPTY_CLASS_NAME.to_string();
    }
    if names.method_name.is_empty() {
        names.method_name = EMPTY_METHOD_NAME.to_string();
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StackSnapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        known: HashMap<FunctionId, ClassMethodNames>,
    }

    impl NameSource for CountingSource {
        fn resolve_batch(&self, ids: &HashSet<FunctionId>) -> HashMap<FunctionId, ClassMethodNames> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(!ids.contains(&FunctionId::NATIVE));
            ids.iter()
                .filter_map(|id| self.known.get(id).map(|n| (*id, n.clone())))
                .collect()
        }
    }

    fn tree_of(stacks: &[&[u64]]) -> CallTree {
        let mut tree = CallTree::new();
        for s in stacks {
            tree.merge_snapshot(&StackSnapshot::from_raw(1, s));
        }
        tree
    }

    #[test]
    fn test_single_batch_and_placeholders() {
        let mut known = HashMap::new();
        known.insert(FunctionId(1), ClassMethodNames::new("App", "Main"));
        known.insert(FunctionId(2), ClassMethodNames::new("", ""));
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            known,
        };

        let mut tree = tree_of(&[&[0, 2, 1], &[3, 1]]);
        let resolver = NameResolver::new();
        let report = resolver.resolve_names(&mut tree, &source);

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.requested, 3);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.unresolved(), 1);

        let name = |path: &[u64]| tree.node(tree.find_path(path).unwrap()).unwrap().names.clone().unwrap();
        assert_eq!(name(&[1]), ClassMethodNames::new("App", "Main"));
        assert_eq!(name(&[1, 2]), ClassMethodNames::new("No_class_name", "No_method_name"));
        assert_eq!(name(&[1, 2, 0]), native_names());
        assert_eq!(name(&[1, 3]), ClassMethodNames::new("Unknown class", "Unknown method(3)"));
    }

    #[test]
    fn test_native_only_tree_skips_source() {
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            known: HashMap::new(),
        };
        let mut tree = tree_of(&[&[0], &[0, 0]]);
        NameResolver::new().resolve_names(&mut tree, &source);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear_empties_cache() {
        let source = |ids: &HashSet<FunctionId>| {
            ids.iter()
                .map(|id| (*id, ClassMethodNames::new("C", format!("m{}", id))))
                .collect::<HashMap<_, _>>()
        };
        let mut tree = tree_of(&[&[2, 1]]);
        let resolver = NameResolver::new();
        resolver.resolve_names(&mut tree, &source);

        assert_eq!(resolver.cache_len(), 2);
        assert_eq!(resolver.cached(FunctionId(2)), Some(ClassMethodNames::new("C", "m2")));

        resolver.clear();
        assert_eq!(resolver.cache_len(), 0);
    }
}
