//! Hierarchy audit export
//!
//! Serializes a reconstructed category tree as a flat JSON array, shallow
//! nodes first.

use crate::category::{CategoryTree, NodeStatus};
use crate::SweepError;
use serde::Serialize;
use std::path::Path;

/// One node of the exported hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyEntry {
    pub id: String,
    pub url: String,
    pub parent_id: Option<String>,
    pub children: Vec<String>,
    pub item_count: Option<u64>,
    pub status: NodeStatus,
}

/// Flattens a tree into export entries
pub fn hierarchy_entries(tree: &CategoryTree) -> Vec<HierarchyEntry> {
    tree.iter()
        .map(|node| HierarchyEntry {
            id: node.id.clone(),
            url: node.url.clone(),
            parent_id: node.parent_id.clone(),
            children: node.children.clone(),
            item_count: node.item_count,
            status: node.status,
        })
        .collect()
}

/// Writes the hierarchy as pretty-printed JSON
pub fn export_hierarchy(tree: &CategoryTree, path: &Path) -> Result<usize, SweepError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let entries = hierarchy_entries(tree);
    std::fs::write(path, serde_json::to_vec_pretty(&entries)?)?;

    tracing::info!(
        "Exported hierarchy of {} nodes to {}",
        entries.len(),
        path.display()
    );
    Ok(entries.len())
}
