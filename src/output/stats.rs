//! Statistics generation from the discovery database
//!
//! This module provides functionality for extracting and displaying
//! discovery statistics from the storage layer.

use crate::category::NodeStatus;
use crate::storage::{DiscoveryStore, NodeRecord, RunRecord};
use crate::SweepError;
use std::collections::HashMap;

/// Discovery statistics summary
#[derive(Debug, Clone)]
pub struct DiscoveryStatistics {
    pub run: RunRecord,

    /// Total number of category nodes known to the run
    pub total_nodes: u64,

    /// Count of nodes by status
    pub nodes_by_status: HashMap<NodeStatus, u64>,

    /// Basis and fallback entries, in acceptance order
    pub basis: Vec<NodeRecord>,

    /// Run duration if it has finished
    pub duration_seconds: Option<u64>,
}

impl DiscoveryStatistics {
    pub fn count(&self, status: NodeStatus) -> u64 {
        self.nodes_by_status.get(&status).copied().unwrap_or(0)
    }

    /// URLs of nodes kept as fallback
    pub fn fallback_urls(&self) -> Vec<&str> {
        self.basis
            .iter()
            .filter(|record| record.node.status == NodeStatus::Fallback)
            .map(|record| record.node.url.as_str())
            .collect()
    }
}

/// Loads statistics for a run, or for the latest run when `run_id` is None
pub fn load_statistics(
    storage: &dyn DiscoveryStore,
    run_id: Option<i64>,
) -> Result<DiscoveryStatistics, SweepError> {
    let run = match run_id {
        Some(id) => storage.get_run(id)?,
        None => storage
            .get_latest_run()?
            .ok_or_else(|| SweepError::Storage("No discovery runs found in database".to_string()))?,
    };

    let total_nodes = storage.count_total_nodes(run.id)?;

    let mut nodes_by_status = HashMap::new();
    for status in NodeStatus::all_statuses() {
        let count = storage.count_nodes_by_status(run.id, status)?;
        if count > 0 {
            nodes_by_status.insert(status, count);
        }
    }

    let basis = storage.load_basis(run.id)?;

    let duration_seconds = match (
        run.started_at.parse::<chrono::DateTime<chrono::Utc>>(),
        run.finished_at
            .as_deref()
            .map(str::parse::<chrono::DateTime<chrono::Utc>>),
    ) {
        (Ok(started), Some(Ok(finished))) => Some((finished - started).num_seconds().max(0) as u64),
        _ => None,
    };

    Ok(DiscoveryStatistics {
        run,
        total_nodes,
        nodes_by_status,
        basis,
        duration_seconds,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &DiscoveryStatistics) {
    println!("=== Discovery Statistics ===\n");

    println!("Run:");
    println!("  ID: {}", stats.run.id);
    println!("  Status: {}", stats.run.status.to_db_string());
    println!("  Started: {}", stats.run.started_at);
    if let Some(finished) = &stats.run.finished_at {
        println!("  Finished: {}", finished);
    }
    if let Some(duration) = stats.duration_seconds {
        println!("  Duration: {}s", duration);
    }
    println!("  Pagination limit: {}", stats.run.pagination_limit);
    println!("  Config hash: {}", stats.run.config_hash);
    println!();

    println!("Nodes by Status:");
    let mut status_counts: Vec<_> = stats.nodes_by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (status, count) in status_counts {
        let percentage = if stats.total_nodes > 0 {
            (*count as f64 / stats.total_nodes as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!("  total: {}", stats.total_nodes);
    println!();

    let covered: u64 = stats
        .basis
        .iter()
        .filter_map(|record| record.node.item_count)
        .sum();
    println!(
        "Basis: {} entries covering {} items",
        stats.basis.len(),
        covered
    );

    let fallback = stats.fallback_urls();
    if !fallback.is_empty() {
        println!();
        println!("Fallback Entries ({}):", fallback.len());
        for url in fallback {
            println!("  - {}", url);
        }
    }
}
