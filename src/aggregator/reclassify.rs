//! Moves blocked/idle samples out of the runnable counts.
//!
//! Leaves whose `"Class:Method"` signature is configured as non-runnable
//! give up their whole runnable count; every ancestor then gives up the same
//! amount, so counts higher up only reflect genuinely runnable samples.
//! Names must already be resolved when this runs.

use super::tree::{CallTree, NodeId};
use crate::utils::error::AggregationError;
use log::debug;
use std::collections::HashSet;

/// Summary of a reclassification pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclassifyReport {
    /// Leaves matched against the signature set
    pub matched_leaves: usize,

    /// Samples moved to non-runnable at matching leaves
    pub samples_moved: u64,
}

/// Reclassify the whole tree below the synthetic root
///
/// **Public** - called by the session core at stop time
pub fn reclassify_tree(
    tree: &mut CallTree,
    non_runnable: &HashSet<String>,
) -> Result<ReclassifyReport, AggregationError> {
    let root = tree.root();
    update_runnable_counts(tree, root, non_runnable)
}

/// Post-order walk starting at `start`
///
/// The synthetic root takes part in the walk but its own counts are never
/// adjusted.
///
/// # Errors
/// * `AggregationError::MissingNode` - `start` or a linked child is not in the tree
pub fn update_runnable_counts(
    tree: &mut CallTree,
    start: NodeId,
    non_runnable: &HashSet<String>,
) -> Result<ReclassifyReport, AggregationError> {
    let mut report = ReclassifyReport::default();
    let root = tree.root();
    let mut stack: Vec<(NodeId, bool)> = vec![(start, false)];

    while let Some((id, children_done)) = stack.pop() {
        let node = tree.node_mut(id).ok_or(AggregationError::MissingNode(id))?;

        if node.is_leaf() {
            if !non_runnable.is_empty() && non_runnable.contains(&node.signature()) {
                report.matched_leaves += 1;
                report.samples_moved += node.runnable_count;
                node.non_runnable_count += node.runnable_count;
                node.runnable_count = 0;
            }
            continue;
        }

        if !children_done {
            let children = node.children.clone();
            stack.push((id, true));
            stack.extend(children.into_iter().rev().map(|c| (c, false)));
            continue;
        }

        if id == root {
            continue;
        }

        let children = node.children.clone();
        for child in children {
            let moved = tree
                .node(child)
                .ok_or(AggregationError::MissingNode(child))?
                .non_runnable_count;
            let parent = tree.node_mut(id).ok_or(AggregationError::MissingNode(id))?;
            parent.runnable_count = parent.runnable_count.saturating_sub(moved);
            parent.non_runnable_count += moved;
        }
    }

    debug!(
        "Reclassified {} non-runnable leaves ({} samples)",
        report.matched_leaves, report.samples_moved
    );

    Ok(report)
}
