//! Redundant parent removal for basis sets

use crate::category::hierarchy::{build_tree, CategoryTree};
use crate::category::CategoryNode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Policy deciding when a basis parent is redundant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedundancyRule {
    /// Drop a parent when any of its tree children is also in the basis
    #[default]
    AnyChild,

    /// Drop a parent only when its basis children account for at least its
    /// own item count; parents with an unknown count fall back to `AnyChild`
    CoveringChildren,
}

/// Removes basis entries whose tree children are also in the basis
///
/// Checks direct children only. Output keeps the input order with
/// duplicate ids removed, and re-running on the output is a no-op.
pub fn prune(basis: &[CategoryNode], tree: &CategoryTree) -> Vec<CategoryNode> {
    prune_with_rule(basis, tree, RedundancyRule::AnyChild)
}

/// Prunes under an explicit redundancy rule
pub fn prune_with_rule(
    basis: &[CategoryNode],
    tree: &CategoryTree,
    rule: RedundancyRule,
) -> Vec<CategoryNode> {
    let by_id: HashMap<&str, &CategoryNode> = basis
        .iter()
        .map(|node| (node.id.as_str(), node))
        .collect();

    let mut emitted = HashSet::new();
    let mut pruned = Vec::with_capacity(basis.len());

    for node in basis {
        if !emitted.insert(node.id.as_str()) {
            continue;
        }

        let basis_children: Vec<&CategoryNode> = tree
            .children_of(&node.id)
            .iter()
            .filter_map(|child| by_id.get(child.as_str()).copied())
            .collect();

        if is_redundant(node, &basis_children, rule) {
            tracing::debug!(
                "Dropping redundant basis entry {} ({} basis children)",
                node.id,
                basis_children.len()
            );
            continue;
        }

        pruned.push(node.clone());
    }

    pruned
}

/// Builds a tree over the basis itself and prunes against it
///
/// Because every tree parent is then the nearest ancestor that is also in
/// the basis, the direct-children check removes every ancestor pair under
/// `AnyChild`, not only immediate parent/child collisions.
pub fn prune_basis(basis: &[CategoryNode], rule: RedundancyRule) -> Vec<CategoryNode> {
    let tree = build_tree(basis);
    prune_with_rule(basis, &tree, rule)
}

fn is_redundant(node: &CategoryNode, basis_children: &[&CategoryNode], rule: RedundancyRule) -> bool {
    if basis_children.is_empty() {
        return false;
    }

    match (rule, node.item_count) {
        (RedundancyRule::AnyChild, _) | (RedundancyRule::CoveringChildren, None) => true,
        (RedundancyRule::CoveringChildren, Some(own)) => {
            let covered: u64 = basis_children
                .iter()
                .filter_map(|child| child.item_count)
                .sum();
            covered >= own
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::NodeStatus;

    fn basis_node(url: &str, count: u64) -> CategoryNode {
        let mut node = CategoryNode::from_url(url).unwrap();
        node.item_count = Some(count);
        node.status = NodeStatus::Basis;
        node
    }

    fn ids(nodes: &[CategoryNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    fn sample_basis() -> Vec<CategoryNode> {
        vec![
            basis_node("https://shop.example.com/c/grocery/dairy/1100", 900),
            basis_node("https://shop.example.com/c/grocery/dairy/milk/1110", 300),
            basis_node("https://shop.example.com/c/grocery/bakery/1200", 150),
        ]
    }

    #[test]
    fn test_parent_with_basis_child_dropped() {
        let basis = sample_basis();
        let tree = build_tree(&basis);

        let pruned = prune(&basis, &tree);
        assert_eq!(ids(&pruned), vec!["1110", "1200"]);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let basis = sample_basis();
        let tree = build_tree(&basis);

        let once = prune(&basis, &tree);
        let twice = prune(&once, &tree);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_no_ancestor_pairs_after_prune_basis() {
        let basis = vec![
            basis_node("https://shop.example.com/c/grocery/1000", 1800),
            basis_node("https://shop.example.com/c/grocery/dairy/milk/1110", 300),
            basis_node("https://shop.example.com/c/grocery/dairy/cheese/1120", 200),
            basis_node("https://shop.example.com/c/home/2000", 700),
        ];

        let pruned = prune_basis(&basis, RedundancyRule::AnyChild);
        let tree = build_tree(&pruned);
        for a in &pruned {
            for b in &pruned {
                assert!(!tree.is_ancestor(&a.id, &b.id), "{} is ancestor of {}", a.id, b.id);
            }
        }
        assert_eq!(ids(&pruned), vec!["1110", "1120", "2000"]);
    }

    #[test]
    fn test_duplicate_ids_collapsed() {
        let mut basis = sample_basis();
        basis.push(basis_node("https://shop.example.com/c/grocery/bakery/1200", 150));
        let tree = build_tree(&basis);

        let pruned = prune(&basis, &tree);
        assert_eq!(ids(&pruned), vec!["1110", "1200"]);
    }

    #[test]
    fn test_covering_children_keeps_partially_covered_parent() {
        let basis = sample_basis();
        let tree = build_tree(&basis);

        // dairy has 900 items but milk only covers 300 of them
        let pruned = prune_with_rule(&basis, &tree, RedundancyRule::CoveringChildren);
        assert_eq!(ids(&pruned), vec!["1100", "1110", "1200"]);
    }

    #[test]
    fn test_covering_children_drops_fully_covered_parent() {
        let basis = vec![
            basis_node("https://shop.example.com/c/grocery/dairy/1100", 500),
            basis_node("https://shop.example.com/c/grocery/dairy/milk/1110", 300),
            basis_node("https://shop.example.com/c/grocery/dairy/cheese/1120", 200),
        ];
        let tree = build_tree(&basis);

        let pruned = prune_with_rule(&basis, &tree, RedundancyRule::CoveringChildren);
        assert_eq!(ids(&pruned), vec!["1110", "1120"]);
    }

    #[test]
    fn test_rule_deserializes_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            rule: RedundancyRule,
        }
        let parsed: Wrapper = toml::from_str("rule = \"covering-children\"").unwrap();
        assert_eq!(parsed.rule, RedundancyRule::CoveringChildren);
        assert_eq!(RedundancyRule::default(), RedundancyRule::AnyChild);
    }
}
