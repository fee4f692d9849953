//! Parent/child reconstruction from category URL paths
//!
//! The tree is rebuilt from path tokens alone, so it does not depend on the
//! order in which discovery happened to reach each node.

use crate::category::CategoryNode;
use std::collections::{HashMap, HashSet};

/// Category nodes keyed by id with inferred parent/child links
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: HashMap<String, CategoryNode>,

    /// Ids in placement order (shallow first)
    order: Vec<String>,
}

impl CategoryTree {
    pub fn get(&self, id: &str) -> Option<&CategoryNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Direct children of a node, empty if the id is unknown
    pub fn children_of(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Nodes without a parent in the tree
    pub fn roots(&self) -> Vec<&CategoryNode> {
        self.iter().filter(|node| node.parent_id.is_none()).collect()
    }

    /// Returns true if `ancestor` appears on `descendant`'s parent chain
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut current = self
            .nodes
            .get(descendant)
            .and_then(|node| node.parent_id.as_deref());

        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(|node| node.parent_id.as_deref());
        }

        false
    }

    /// Iterates nodes in placement order
    pub fn iter(&self) -> impl Iterator<Item = &CategoryNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }
}

/// Reconstructs parent/child relationships among discovered nodes
///
/// Nodes are placed shallow-first. Each node's parent is the already placed
/// node whose path is the longest strict prefix of its own; on equal prefix
/// length the first placed node wins. Duplicate ids keep their first
/// occurrence. Any `parent_id`/`children` on the input are replaced.
///
/// Runs in O(n²), which is fine for discovery sets in the low thousands.
pub fn build_tree(nodes: &[CategoryNode]) -> CategoryTree {
    let mut seen = HashSet::new();
    let mut sorted: Vec<CategoryNode> = nodes
        .iter()
        .filter(|node| seen.insert(node.id.clone()))
        .cloned()
        .map(|mut node| {
            node.parent_id = None;
            node.children.clear();
            node
        })
        .collect();

    // Stable sort keeps input order among nodes of equal depth
    sorted.sort_by_key(|node| node.path_segments.len());

    let mut placed: Vec<CategoryNode> = Vec::with_capacity(sorted.len());

    for mut node in sorted {
        let mut best: Option<usize> = None;
        for (index, candidate) in placed.iter().enumerate() {
            if !candidate.is_path_prefix_of(&node) {
                continue;
            }
            let better = match best {
                Some(current) => {
                    candidate.path_segments.len() > placed[current].path_segments.len()
                }
                None => true,
            };
            if better {
                best = Some(index);
            }
        }

        if let Some(parent_index) = best {
            node.parent_id = Some(placed[parent_index].id.clone());
            placed[parent_index].children.push(node.id.clone());
        }

        placed.push(node);
    }

    let order = placed.iter().map(|node| node.id.clone()).collect();
    let nodes = placed
        .into_iter()
        .map(|node| (node.id.clone(), node))
        .collect();

    CategoryTree { nodes, order }
}
