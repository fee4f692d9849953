//! Discovery state
//!
//! `DiscoveryState` is the single owner of a run's progress: every known node,
//! the visited set, the frontier and the basis list in acceptance order.
//! Changes are tracked so a flush only writes what moved since the last one.

use crate::category::{CategoryNode, NodeStatus};
use crate::discovery::frontier::Frontier;
use crate::storage::{DiscoveryStore, NodeRecord, StorageResult};
use chrono::Utc;
use std::collections::{HashMap, HashSet};

/// Progress of one discovery run
#[derive(Debug, Default)]
pub struct DiscoveryState {
    nodes: HashMap<String, NodeRecord>,
    visited: HashSet<String>,
    frontier: Frontier,
    basis: Vec<String>,
    dirty: HashSet<String>,
}

impl DiscoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the state of a run from storage
    ///
    /// Nodes that were recorded but neither visited nor queued (possible only
    /// after manual edits to the database) are queued again.
    pub fn load<S: DiscoveryStore>(store: &S, run_id: i64) -> StorageResult<Self> {
        let mut state = Self::new();

        for record in store.load_nodes(run_id)? {
            if record.node.status.is_classified() {
                state.visited.insert(record.node.id.clone());
            }
            state.nodes.insert(record.node.id.clone(), record);
        }

        state.basis = store
            .load_basis(run_id)?
            .into_iter()
            .map(|record| record.node.id)
            .collect();

        for id in store.load_frontier(run_id)? {
            if state.nodes.contains_key(&id) {
                state.frontier.push_unvisited(id, &state.visited);
            }
        }

        let mut stranded: Vec<&NodeRecord> = state
            .nodes
            .values()
            .filter(|record| {
                !record.node.status.is_classified() && !state.frontier.contains(&record.node.id)
            })
            .collect();
        stranded.sort_by(|a, b| a.node.id.cmp(&b.node.id));
        let stranded: Vec<String> = stranded.into_iter().map(|r| r.node.id.clone()).collect();
        for id in stranded {
            tracing::debug!("Re-queueing stranded node {}", id);
            state.frontier.push(id);
        }

        Ok(state)
    }

    /// Adds a node if its id is new and queues it unless already visited
    ///
    /// Returns true if the node was queued.
    pub fn enqueue(&mut self, node: CategoryNode) -> bool {
        let id = node.id.clone();
        if !self.nodes.contains_key(&id) {
            self.nodes.insert(
                id.clone(),
                NodeRecord {
                    node,
                    is_listing: false,
                    basis_seq: None,
                    visited_at: None,
                },
            );
            self.dirty.insert(id.clone());
        }
        self.frontier.push_unvisited(id, &self.visited)
    }

    /// Pops the next id that has not been visited yet
    pub fn next_unvisited(&mut self) -> Option<String> {
        while let Some(id) = self.frontier.pop() {
            if !self.visited.contains(&id) {
                return Some(id);
            }
        }
        None
    }

    pub fn mark_visited(&mut self, id: &str) -> bool {
        self.visited.insert(id.to_string())
    }

    pub fn is_visited(&self, id: &str) -> bool {
        self.visited.contains(id)
    }

    /// Stores the outcome of a probe for a node
    pub fn classify(
        &mut self,
        id: &str,
        status: NodeStatus,
        item_count: Option<u64>,
        is_listing: bool,
        children: Vec<String>,
    ) {
        if let Some(record) = self.nodes.get_mut(id) {
            record.node.status = status;
            record.node.item_count = item_count;
            record.node.children = children;
            record.is_listing = is_listing;
            record.visited_at = Some(Utc::now().to_rfc3339());

            if status.in_basis() && record.basis_seq.is_none() {
                record.basis_seq = Some(self.basis.len() as i64);
                self.basis.push(id.to_string());
            }

            self.dirty.insert(id.to_string());
        }
    }

    pub fn node(&self, id: &str) -> Option<&CategoryNode> {
        self.nodes.get(id).map(|record| &record.node)
    }

    /// Basis and fallback nodes in acceptance order
    pub fn basis(&self) -> Vec<CategoryNode> {
        self.basis
            .iter()
            .filter_map(|id| self.node(id).cloned())
            .collect()
    }

    /// Every node known to the run
    pub fn nodes(&self) -> impl Iterator<Item = &CategoryNode> {
        self.nodes.values().map(|record| &record.node)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    pub fn basis_len(&self) -> usize {
        self.basis.len()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Writes changed nodes and the frontier snapshot in one transaction
    pub fn flush<S: DiscoveryStore>(&mut self, store: &mut S, run_id: i64) -> StorageResult<()> {
        let mut dirty: Vec<&String> = self.dirty.iter().collect();
        dirty.sort();
        let records: Vec<NodeRecord> = dirty
            .into_iter()
            .filter_map(|id| self.nodes.get(id).cloned())
            .collect();

        store.save_progress(run_id, &records, &self.frontier.snapshot())?;

        tracing::debug!(
            "Flushed {} nodes, frontier size {}",
            records.len(),
            self.frontier.len()
        );
        self.dirty.clear();
        Ok(())
    }
}
