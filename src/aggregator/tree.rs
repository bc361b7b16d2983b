//! The call tree ("bucket") that stack snapshots are merged into.
//!
//! Nodes live in an arena owned by the tree and refer to each other by
//! [`NodeId`]. Index 0 is always the synthetic root: function id zero,
//! depth 0, never reported.
//!
//! Example: merging the snapshots `[C, B, A]` and `[D, B, A]` (innermost
//! first) produces
//!
//! ```text
//! root
//! └── A (2)
//!     └── B (2)
//!         ├── C (1)
//!         └── D (1)
//! ```

use crate::model::{ClassMethodNames, FunctionId, StackSnapshot};
use log::trace;
use std::collections::HashSet;

/// Index of a node inside a [`CallTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One call-stack position in the aggregated tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Function at this position (zero = native frame)
    pub function_id: FunctionId,

    /// Samples seen at this position while classified as runnable
    pub runnable_count: u64,

    /// Samples moved out of `runnable_count` by reclassification
    pub non_runnable_count: u64,

    /// Distance from the synthetic root
    pub depth: u32,

    /// Child positions, in insertion order
    pub children: Vec<NodeId>,

    /// Set by the pruning pass; such nodes are detached before reporting
    pub ignore_for_reporting: bool,

    /// Filled in by the name resolver once sampling is over
    pub names: Option<ClassMethodNames>,
}

impl TreeNode {
    fn new(function_id: FunctionId, depth: u32) -> Self {
        Self {
            function_id,
            runnable_count: 0,
            non_runnable_count: 0,
            depth,
            children: Vec::new(),
            ignore_for_reporting: false,
            names: None,
        }
    }

    fn root() -> Self {
        let mut root = Self::new(FunctionId::NATIVE, 0);
        root.ignore_for_reporting = true;
        root
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// `"Class:Method"` of the resolved names, empty parts if unresolved
    pub fn signature(&self) -> String {
        match &self.names {
            Some(names) => names.signature(),
            None => ":".to_string(),
        }
    }
}

/// Aggregated call tree for one session, plus its pruning list
///
/// **Public** - owned by the session core behind a single lock
#[derive(Debug, Clone)]
pub struct CallTree {
    pub(super) nodes: Vec<TreeNode>,

    /// Every node that was created as the first child of its parent
    pub(super) pruning_list: Vec<NodeId>,
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![TreeNode::root()],
            pruning_list: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id.0)
    }

    /// Children of `id`, or an empty slice for unknown ids
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn pruning_list(&self) -> &[NodeId] {
        &self.pruning_list
    }

    /// Merge one snapshot into the tree
    ///
    /// **Public** - the only mutation path used while sampling
    ///
    /// Frames are consumed from outermost to innermost starting at the root.
    /// An existing child with the same function id has its count bumped;
    /// otherwise a new child is appended with a count of one. A new node is
    /// added to the pruning list only when it is its parent's first child.
    ///
    /// # Returns
    /// Number of nodes created by this merge
    pub fn merge_snapshot(&mut self, snapshot: &StackSnapshot) -> usize {
        let mut current = self.root();
        let mut created = 0;

        for function_id in snapshot.outermost_first() {
            current = match self.find_child(current, function_id) {
                Some(child) => {
                    self.nodes[child.0].runnable_count += 1;
                    child
                }
                None => {
                    created += 1;
                    self.add_child(current, function_id)
                }
            };
        }

        trace!(
            "Merged {} frames from thread {} ({} new nodes)",
            snapshot.frames.len(),
            snapshot.thread_id,
            created
        );

        created
    }

    fn find_child(&self, parent: NodeId, function_id: FunctionId) -> Option<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|child| self.nodes[child.0].function_id == function_id)
    }

    fn add_child(&mut self, parent: NodeId, function_id: FunctionId) -> NodeId {
        let depth = self.nodes[parent.0].depth + 1;
        let id = NodeId(self.nodes.len());

        let mut node = TreeNode::new(function_id, depth);
        node.runnable_count = 1;
        self.nodes.push(node);

        let siblings = &mut self.nodes[parent.0].children;
        siblings.push(id);
        if siblings.len() == 1 {
            self.pruning_list.push(id);
        }

        id
    }

    /// Number of nodes reachable from the root, root excluded
    pub fn node_count(&self) -> usize {
        self.descendants(self.root()).len()
    }

    /// Pre-order list of nodes reachable below `start`
    pub fn descendants(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(start).iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }

        out
    }

    /// Sum of runnable and non-runnable counts directly under the root
    pub fn total_samples(&self) -> u64 {
        self.children(self.root())
            .iter()
            .filter_map(|id| self.node(*id))
            .map(|n| n.runnable_count + n.non_runnable_count)
            .sum()
    }

    /// Distinct non-native function ids present in the tree
    pub fn function_ids(&self) -> HashSet<FunctionId> {
        self.descendants(self.root())
            .into_iter()
            .map(|id| self.nodes[id.0].function_id)
            .filter(|f| !f.is_native())
            .collect()
    }

    /// Apply `f` to every node below the root
    pub fn for_each_node_mut(&mut self, mut f: impl FnMut(&mut TreeNode)) {
        for node in self.nodes.iter_mut().skip(1) {
            f(node);
        }
    }

    /// Drop every node and the pruning list, keeping the allocations
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[0] = TreeNode::root();
        self.pruning_list.clear();
    }

    /// Follow a path of function ids (outermost first) from the root
    pub fn find_path(&self, path: &[u64]) -> Option<NodeId> {
        let mut current = self.root();
        for raw in path {
            current = self.find_child(current, FunctionId(*raw))?;
        }
        Some(current)
    }
}
