//! Rooted species trees.
//!
//! Uses arena-style storage: nodes live in a flat `Vec<Node>` and are
//! referenced by `NodeId` (a `usize` index). Trees arrive here already
//! parsed; this crate only consumes their branch-length structure.

use banksia_core::{BanksiaError, Result, Summarizable};

/// Index into the tree's node arena.
pub type NodeId = usize;

/// A single node in a species tree.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Index of this node in the arena.
    pub id: NodeId,
    /// Parent node (None for root).
    pub parent: Option<NodeId>,
    /// Child nodes.
    pub children: Vec<NodeId>,
    /// Branch length from this node to its parent.
    pub branch_length: Option<f64>,
    /// Species identifier (expected on leaves).
    pub name: Option<String>,
}

impl Node {
    /// True if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// True if this node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A rooted species tree stored as an arena of nodes.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpeciesTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl SpeciesTree {
    /// Create a new tree with a single unnamed root node.
    pub fn new() -> Self {
        let root = Node {
            id: 0,
            parent: None,
            children: Vec::new(),
            branch_length: None,
            name: None,
        };
        Self {
            nodes: vec![root],
            root: 0,
        }
    }

    /// Add a child to `parent` and return its `NodeId`.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` is out of range or the branch length is
    /// negative.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: Option<String>,
        branch_length: Option<f64>,
    ) -> Result<NodeId> {
        if parent >= self.nodes.len() {
            return Err(BanksiaError::InvalidInput(format!(
                "parent index {} out of range ({})",
                parent,
                self.nodes.len()
            )));
        }
        if let Some(len) = branch_length {
            if !len.is_finite() || len < 0.0 {
                return Err(BanksiaError::InvalidInput(format!(
                    "branch length must be finite and non-negative, got {}",
                    len
                )));
            }
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            parent: Some(parent),
            children: Vec::new(),
            branch_length,
            name,
        });
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    /// Access a node by id.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// All nodes in arena order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The root node id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaf nodes.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// All leaf node ids.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.id)
            .collect()
    }

    /// Distance (sum of branch lengths) from the root to every node.
    ///
    /// Missing branch lengths count as zero.
    pub fn distances_from_root(&self) -> Vec<f64> {
        let mut dist = vec![0.0; self.nodes.len()];
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            for &child in &self.nodes[id].children {
                dist[child] = dist[id] + self.nodes[child].branch_length.unwrap_or(0.0);
                stack.push(child);
            }
        }
        dist
    }

    /// Tree height: the largest root-to-leaf distance.
    pub fn height(&self) -> f64 {
        let dist = self.distances_from_root();
        self.leaves()
            .into_iter()
            .map(|id| dist[id])
            .fold(0.0, f64::max)
    }

    /// True when every leaf sits at the same distance from the root, within
    /// `tolerance` (an absolute distance).
    pub fn is_ultrametric(&self, tolerance: f64) -> bool {
        let dist = self.distances_from_root();
        let height = self.height();
        self.leaves()
            .into_iter()
            .all(|id| (dist[id] - height).abs() <= tolerance)
    }
}

impl Default for SpeciesTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Summarizable for SpeciesTree {
    fn summary(&self) -> String {
        let leaves = self.leaf_count();
        format!(
            "SpeciesTree: {} nodes ({} leaves), height {:.4}",
            self.node_count(),
            leaves,
            self.height()
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// ((a:1, b:1):1, (c:1, d:1):1) — a balanced ultrametric tree of height 2.
    pub(crate) fn balanced() -> SpeciesTree {
        let mut tree = SpeciesTree::new();
        let left = tree.add_child(tree.root(), None, Some(1.0)).unwrap();
        let right = tree.add_child(tree.root(), None, Some(1.0)).unwrap();
        tree.add_child(left, Some("a".into()), Some(1.0)).unwrap();
        tree.add_child(left, Some("b".into()), Some(1.0)).unwrap();
        tree.add_child(right, Some("c".into()), Some(1.0)).unwrap();
        tree.add_child(right, Some("d".into()), Some(1.0)).unwrap();
        tree
    }

    #[test]
    fn build_and_measure() {
        let tree = balanced();
        assert_eq!(tree.node_count(), 7);
        assert_eq!(tree.leaf_count(), 4);
        assert!((tree.height() - 2.0).abs() < 1e-12);
        assert!(tree.is_ultrametric(1e-9));
    }

    #[test]
    fn non_ultrametric_is_detected() {
        let mut tree = SpeciesTree::new();
        tree.add_child(tree.root(), Some("a".into()), Some(1.0)).unwrap();
        tree.add_child(tree.root(), Some("b".into()), Some(3.0)).unwrap();
        assert!(!tree.is_ultrametric(1e-9));
        assert!(tree.is_ultrametric(2.5));
    }

    #[test]
    fn negative_branch_length_is_rejected() {
        let mut tree = SpeciesTree::new();
        assert!(tree
            .add_child(tree.root(), Some("a".into()), Some(-0.5))
            .is_err());
    }

    #[test]
    fn distances_accumulate_along_paths() {
        let tree = balanced();
        let dist = tree.distances_from_root();
        for leaf in tree.leaves() {
            assert!((dist[leaf] - 2.0).abs() < 1e-12);
        }
    }
}
