//! Wire-ready profile produced at the end of a session.
//!
//! The collector expects positional arrays rather than objects, so both
//! types here serialize as JSON arrays:
//!
//! ```text
//! profile: [session_id, start_ms, stop_ms, sample_count, {"OTHER": [node..]}, threads, runnable_threads]
//! node:    [[class_name, method_name, 0], runnable_count, 0, [child..]]
//! ```

use crate::aggregator::{CallTree, NodeId};
use crate::model::ClassMethodNames;
use crate::names::resolver::unknown_names;
use crate::session::SessionMetadata;
use crate::utils::config::PROFILE_SAMPLE_KEY;
use chrono::{DateTime, Utc};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Aggregated result of one profiling session
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "WireProfile")]
pub struct ThreadProfile {
    pub session_id: i32,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub sample_count: u64,

    /// Reported trees keyed by bucket name; only `"OTHER"` is produced
    pub samples: BTreeMap<String, Vec<ReportedNode>>,

    pub thread_count: u32,

    /// Always equal to `thread_count`; non-runnable threads are not tracked
    pub runnable_thread_count: u32,
}

impl ThreadProfile {
    /// Top-level reported nodes, empty when nothing was sampled
    pub fn roots(&self) -> &[ReportedNode] {
        self.samples
            .get(PROFILE_SAMPLE_KEY)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of reported nodes across all trees
    pub fn node_count(&self) -> usize {
        self.samples
            .values()
            .flatten()
            .map(ReportedNode::subtree_size)
            .sum()
    }
}

impl Serialize for ThreadProfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(7)?;
        tuple.serialize_element(&self.session_id)?;
        tuple.serialize_element(&self.start_time.timestamp_millis())?;
        tuple.serialize_element(&self.stop_time.timestamp_millis())?;
        tuple.serialize_element(&self.sample_count)?;
        tuple.serialize_element(&self.samples)?;
        tuple.serialize_element(&self.thread_count)?;
        tuple.serialize_element(&self.runnable_thread_count)?;
        tuple.end()
    }
}

#[derive(Deserialize)]
struct WireProfile(
    i32,
    i64,
    i64,
    u64,
    BTreeMap<String, Vec<ReportedNode>>,
    u32,
    u32,
);

impl From<WireProfile> for ThreadProfile {
    fn from(w: WireProfile) -> Self {
        Self {
            session_id: w.0,
            start_time: DateTime::from_timestamp_millis(w.1).unwrap_or_default(),
            stop_time: DateTime::from_timestamp_millis(w.2).unwrap_or_default(),
            sample_count: w.3,
            samples: w.4,
            thread_count: w.5,
            runnable_thread_count: w.6,
        }
    }
}

/// One named call-stack position in the reported tree
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "WireNode")]
pub struct ReportedNode {
    pub class_name: String,
    pub method_name: String,
    pub runnable_count: u64,
    pub children: Vec<ReportedNode>,
}

impl ReportedNode {
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(ReportedNode::subtree_size).sum::<usize>()
    }

    /// First direct child with the given method name
    pub fn child(&self, method_name: &str) -> Option<&ReportedNode> {
        self.children.iter().find(|c| c.method_name == method_name)
    }
}

impl Serialize for ReportedNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(4)?;
        tuple.serialize_element(&(&self.class_name, &self.method_name, 0u8))?;
        tuple.serialize_element(&self.runnable_count)?;
        tuple.serialize_element(&0u8)?;
        tuple.serialize_element(&self.children)?;
        tuple.end()
    }
}

#[derive(Deserialize)]
struct WireNode((String, String, u64), u64, u64, Vec<ReportedNode>);

impl From<WireNode> for ReportedNode {
    fn from(w: WireNode) -> Self {
        let (class_name, method_name, _) = w.0;
        Self {
            class_name,
            method_name,
            runnable_count: w.1,
            children: w.3,
        }
    }
}

/// Build the wire-ready profile from a finished tree
///
/// **Public** - last step of the stop-time pipeline before transport
///
/// # Arguments
/// * `tree` - Named, reclassified and pruned call tree
/// * `meta` - Session id, timing and counters
///
/// # Returns
/// The profile; the synthetic root and nodes flagged for pruning are left out
pub fn serialize_profile(tree: &CallTree, meta: &SessionMetadata) -> ThreadProfile {
    let roots = reported_children(tree, tree.root());

    let mut samples = BTreeMap::new();
    if !roots.is_empty() {
        samples.insert(PROFILE_SAMPLE_KEY.to_string(), roots);
    }

    ThreadProfile {
        session_id: meta.session_id,
        start_time: meta.start_time,
        stop_time: meta.stop_time.unwrap_or_else(Utc::now),
        sample_count: meta.sample_count,
        samples,
        thread_count: meta.thread_count,
        runnable_thread_count: meta.thread_count,
    }
}

fn reported_children(tree: &CallTree, parent: NodeId) -> Vec<ReportedNode> {
    tree.children(parent)
        .iter()
        .filter_map(|id| tree.node(*id).map(|node| (*id, node)))
        .filter(|(_, node)| !node.ignore_for_reporting)
        .map(|(id, node)| {
            let ClassMethodNames {
                class_name,
                method_name,
            } = node
                .names
                .clone()
                .unwrap_or_else(|| unknown_names(node.function_id));
            ReportedNode {
                class_name,
                method_name,
                runnable_count: node.runnable_count,
                children: reported_children(tree, id),
            }
        })
        .collect()
}
