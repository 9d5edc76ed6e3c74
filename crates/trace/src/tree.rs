//! The trace tree: an append-only, parent-indexed arena of trace nodes
//! with lazy enumeration of root-to-leaf traces.

use std::collections::HashMap;
use std::sync::Arc;

use crate::node::{NodeId, TraceNode};

/// Substitutes policy-id placeholders embedded in transition policies
/// back to their original text. Installed by the model loader.
pub trait PolicyRestorer: Send + Sync {
    fn restore(&self, s: &str) -> String;
}

/// Errors raised while building the trace tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("nodes added to the trace tree must have unique ids (id {0} already present)")]
    DuplicateNodeId(NodeId),

    #[error("parent id {0} not found in the trace tree")]
    ParentNotFound(NodeId),

    #[error("the trace tree already has a root")]
    RootExists,
}

/// Parent-indexed tree of trace nodes. Built by the generator, frozen
/// afterwards except for the racing-node links added by the analyzer.
#[derive(Debug, Default)]
pub struct TraceTree {
    /// `(node, parent index)`; the parent index is `-1` only for the
    /// root.
    nodes: Vec<(TraceNode, isize)>,
    id_to_index: HashMap<NodeId, usize>,
    is_leaf: Vec<bool>,
    restorer: Option<Arc<dyn PolicyRestorer>>,
}

impl std::fmt::Debug for dyn PolicyRestorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PolicyRestorer")
    }
}

impl TraceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree that restores policy placeholders on every insertion.
    pub fn with_restorer(restorer: Arc<dyn PolicyRestorer>) -> Self {
        Self {
            restorer: Some(restorer),
            ..Self::default()
        }
    }

    /// Appends `node` under `parent` (or as the root when `parent` is
    /// `None`), restoring any policy placeholders in its transition.
    pub fn add_node(&mut self, mut node: TraceNode, parent: Option<NodeId>) -> Result<NodeId, TreeError> {
        if self.id_to_index.contains_key(&node.id()) {
            // Unique ids are required for skipping branches that were
            // already analyzed.
            return Err(TreeError::DuplicateNodeId(node.id()));
        }
        let parent_index: isize = match parent {
            None if self.nodes.is_empty() => -1,
            None => return Err(TreeError::RootExists),
            Some(id) => *self
                .id_to_index
                .get(&id)
                .ok_or(TreeError::ParentNotFound(id))? as isize,
        };

        if let Some(restorer) = &self.restorer {
            let restored = restorer.restore(node.transition.policy());
            node.transition.set_policy(restored);
        }

        let id = node.id();
        self.nodes.push((node, parent_index));
        self.is_leaf.push(true);
        let index = self.nodes.len() - 1;
        if parent_index >= 0 {
            self.is_leaf[parent_index as usize] = false;
        }
        self.id_to_index.insert(id, index);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &TraceNode {
        &self.nodes[index].0
    }

    pub fn node_by_id(&self, id: NodeId) -> Option<&TraceNode> {
        self.id_to_index.get(&id).map(|&i| &self.nodes[i].0)
    }

    /// Number of root-to-leaf traces in the tree.
    pub fn trace_count(&self) -> usize {
        self.is_leaf.iter().filter(|&&leaf| leaf).count()
    }

    /// Iterates the traces as root-first node-index sequences, in leaf
    /// insertion order.
    pub fn traces(&self) -> TraceIter<'_> {
        TraceIter {
            tree: self,
            next: 0,
        }
    }

    /// The nodes of one trace, cloned root-first.
    pub fn trace_nodes(&self, indices: &[usize]) -> Vec<TraceNode> {
        indices.iter().map(|&i| self.nodes[i].0.clone()).collect()
    }

    /// Records that the nodes at `i` and `j` race with each other.
    pub fn mark_racing_pair(&mut self, i: usize, j: usize) {
        let id_i = self.nodes[i].0.id();
        let id_j = self.nodes[j].0.id();
        self.nodes[i].0.add_racing_node(id_j);
        self.nodes[j].0.add_racing_node(id_i);
    }
}

/// Iterator over root-to-leaf traces; yields node-index paths.
pub struct TraceIter<'a> {
    tree: &'a TraceTree,
    next: usize,
}

impl Iterator for TraceIter<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let leaf = self.tree.is_leaf[self.next..]
            .iter()
            .position(|&l| l)
            .map(|off| self.next + off)?;
        self.next = leaf + 1;

        let mut path = Vec::new();
        let mut i = leaf as isize;
        while i >= 0 {
            path.push(i as usize);
            i = self.tree.nodes[i as usize].1;
        }
        path.reverse();
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::transition::Transition;
    use crate::vector_clocks::VectorClocks;

    fn node(label: &str, size: usize) -> TraceNode {
        TraceNode::new(Transition::parse(label).unwrap(), VectorClocks::new(size))
    }

    #[test]
    fn single_root_has_one_trace() {
        let mut tree = TraceTree::new();
        tree.add_node(TraceNode::root(2), None).unwrap();
        assert_eq!(tree.trace_count(), 1);
        let traces: Vec<_> = tree.traces().collect();
        assert_eq!(traces, vec![vec![0]]);
    }

    #[test]
    fn traces_walk_from_root_to_each_leaf() {
        let mut tree = TraceTree::new();
        let root = tree.add_node(TraceNode::root(2), None).unwrap();
        let a = tree.add_node(node("proc('f0',0)", 2), Some(root)).unwrap();
        tree.add_node(node("proc('f0',1)", 2), Some(root)).unwrap();
        tree.add_node(node("rcfg(up, 'f1', 1, 0)", 2), Some(a))
            .unwrap();

        assert_eq!(tree.trace_count(), 2);
        let traces: Vec<_> = tree.traces().collect();
        assert_eq!(traces, vec![vec![0, 2], vec![0, 1, 3]]);
        for trace in traces {
            for pair in trace.windows(2) {
                // consecutive nodes are parent and child
                assert_eq!(tree.nodes[pair[1]].1, pair[0] as isize);
            }
        }
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut tree = TraceTree::new();
        tree.add_node(TraceNode::root(1), None).unwrap();
        let err = tree.add_node(node("proc('f0',0)", 1), Some(9999));
        assert!(matches!(err, Err(TreeError::ParentNotFound(9999))));
    }

    #[test]
    fn second_root_is_rejected() {
        let mut tree = TraceTree::new();
        tree.add_node(TraceNode::root(1), None).unwrap();
        assert!(matches!(
            tree.add_node(TraceNode::root(1), None),
            Err(TreeError::RootExists)
        ));
    }

    #[test]
    fn placeholders_are_restored_on_insertion() {
        struct Table;
        impl PolicyRestorer for Table {
            fn restore(&self, s: &str) -> String {
                s.replace("#0", "port = 1 . port <- 2")
            }
        }

        let mut tree = TraceTree::with_restorer(Arc::new(Table));
        let root = tree.add_node(TraceNode::root(1), None).unwrap();
        tree.add_node(node("proc('#0',0)", 1), Some(root)).unwrap();
        assert_eq!(tree.node(1).transition.policy(), "port = 1 . port <- 2");
    }

    #[test]
    fn racing_pairs_are_symmetric() {
        let mut tree = TraceTree::new();
        let root = tree.add_node(TraceNode::root(2), None).unwrap();
        let a = tree.add_node(node("proc('f0',0)", 2), Some(root)).unwrap();
        tree.add_node(node("proc('f1',1)", 2), Some(a)).unwrap();

        tree.mark_racing_pair(1, 2);
        let id1 = tree.node(1).id();
        let id2 = tree.node(2).id();
        assert!(tree.node(1).is_racing_with(id2));
        assert!(tree.node(2).is_racing_with(id1));
    }
}
