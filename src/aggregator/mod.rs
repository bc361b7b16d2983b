//! Aggregation of stack snapshots into a bounded call tree.
//!
//! This module turns the per-tick stream of snapshots into:
//! - A merged call tree with per-node hit counts
//! - Runnable/non-runnable splits for blocked leaf frames
//! - A pruned tree that respects the node budget

pub mod pruning;
pub mod reclassify;
pub mod tree;

// Re-export main types and functions
pub use pruning::{compare_nodes, prune_tree, PruneReport};
pub use reclassify::{reclassify_tree, update_runnable_counts, ReclassifyReport};
pub use tree::{CallTree, NodeId, TreeNode};
