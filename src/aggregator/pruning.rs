//! Node-budget enforcement for the aggregated tree.
//!
//! Runs once per session, after reclassification and before serialization.
//! The pruning list is ranked by value and everything past the budget is
//! flagged, then flagged nodes are cut from their parents.

use super::tree::{CallTree, NodeId, TreeNode};
use log::{debug, info};
use std::cmp::Ordering;

/// Outcome of a pruning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Size of the pruning list when the pass ran
    pub candidates: usize,

    /// Nodes flagged `ignore_for_reporting` by this pass
    pub flagged: usize,

    /// Parent links removed by the detach walk
    pub detached: usize,
}

/// Ranking used to pick survivors
///
/// Higher runnable counts sort first; at equal counts shallower nodes win.
pub fn compare_nodes(a: &TreeNode, b: &TreeNode) -> Ordering {
    b.runnable_count
        .cmp(&a.runnable_count)
        .then(a.depth.cmp(&b.depth))
}

/// Enforce `budget` on the tree
///
/// **Public** - called by the session core at stop time
///
/// # Arguments
/// * `tree` - Tree to prune in place
/// * `budget` - Maximum number of pruning-list entries that stay reported
///
/// # Returns
/// What was flagged and detached. Nothing happens if the pruning list is
/// at or below the budget.
pub fn prune_tree(tree: &mut CallTree, budget: usize) -> PruneReport {
    let candidates = tree.pruning_list.len();
    let mut report = PruneReport {
        candidates,
        ..Default::default()
    };

    if candidates <= budget {
        debug!("Pruning skipped: {} candidates within budget {}", candidates, budget);
        return report;
    }

    let mut list = std::mem::take(&mut tree.pruning_list);
    // slice::sort_by is stable
    list.sort_by(|a, b| compare_nodes(&tree.nodes[a.0], &tree.nodes[b.0]));

    for id in &list[budget..] {
        let node = &mut tree.nodes[id.0];
        if !node.ignore_for_reporting {
            node.ignore_for_reporting = true;
            report.flagged += 1;
        }
    }
    tree.pruning_list = list;

    report.detached = detach_ignored(tree);

    info!(
        "Pruned call tree: {} candidates, budget {}, {} flagged, {} subtrees detached",
        candidates, budget, report.flagged, report.detached
    );

    report
}

/// Remove flagged children from every reachable parent
///
/// Whole subtrees go with a removed child since nothing links to them anymore.
fn detach_ignored(tree: &mut CallTree) -> usize {
    let mut detached = 0;
    let mut stack: Vec<NodeId> = vec![tree.root()];

    while let Some(id) = stack.pop() {
        let children = std::mem::take(&mut tree.nodes[id.0].children);
        let before = children.len();
        let kept: Vec<NodeId> = children
            .into_iter()
            .filter(|child| !tree.nodes[child.0].ignore_for_reporting)
            .collect();
        detached += before - kept.len();

        stack.extend(kept.iter().copied());
        tree.nodes[id.0].children = kept;
    }

    detached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StackSnapshot;

    fn build(stacks: &[&[u64]]) -> CallTree {
        let mut tree = CallTree::new();
        for s in stacks {
            tree.merge_snapshot(&StackSnapshot::from_raw(1, s));
        }
        tree
    }

    #[test]
    fn test_within_budget_is_skipped() {
        let mut tree = build(&[&[3, 2, 1]]);
        let report = prune_tree(&mut tree, 3);
        assert_eq!(report.flagged, 0);
        assert_eq!(report.detached, 0);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn test_flags_exactly_excess_lowest_value_nodes() {
        // Chain 1 -> 2 -> 3 hit once, chain 10 hit three times
        let mut tree = build(&[&[3, 2, 1], &[10], &[10], &[10]]);
        // Pruning list: 1, 2, 3 (first children); 10 is second child of root
        assert_eq!(tree.pruning_list().len(), 3);

        let report = prune_tree(&mut tree, 1);
        assert_eq!(report.flagged, 2);

        // Counts all equal 1, so deeper nodes lose: 2 and 3 are flagged
        let n1 = tree.find_path(&[1]).unwrap();
        assert!(!tree.node(n1).unwrap().ignore_for_reporting);
        assert!(tree.children(n1).is_empty());
        assert!(tree.find_path(&[10]).is_some());
    }

    #[test]
    fn test_higher_count_survives() {
        let mut tree = build(&[&[1], &[5, 2], &[5, 2], &[6, 3]]);
        // Pruning list: 1 (first root child), 5 (first child of 2), 6 (first child of 3)
        let report = prune_tree(&mut tree, 1);
        assert_eq!(report.flagged, 2);

        let survivor = tree.find_path(&[2, 5]).unwrap();
        assert!(!tree.node(survivor).unwrap().ignore_for_reporting);
        assert!(tree.find_path(&[1]).is_none());
        assert!(tree.find_path(&[3, 6]).is_none());
    }

    #[test]
    fn test_pruning_is_idempotent() {
        let mut tree = build(&[&[3, 2, 1], &[4, 2, 1], &[7, 6, 5], &[7, 6, 5]]);
        let first = prune_tree(&mut tree, 2);
        let count_after_first = tree.node_count();

        let second = prune_tree(&mut tree, 2);
        assert!(first.flagged > 0);
        assert_eq!(second.flagged, 0);
        assert_eq!(second.detached, 0);
        assert_eq!(tree.node_count(), count_after_first);
    }

    #[test]
    fn test_compare_nodes_order() {
        let tree = build(&[&[2, 1], &[2, 1], &[3]]);
        let a = tree.node(tree.find_path(&[1]).unwrap()).unwrap();
        let b = tree.node(tree.find_path(&[1, 2]).unwrap()).unwrap();
        let c = tree.node(tree.find_path(&[3]).unwrap()).unwrap();

        // Same count, shallower first
        assert_eq!(compare_nodes(a, b), Ordering::Less);
        // Higher count first
        assert_eq!(compare_nodes(c, a), Ordering::Greater);
    }
}
