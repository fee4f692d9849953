//! Storage traits and error types
//!
//! This module defines the trait interface for discovery storage backends
//! and associated error types.

use crate::category::NodeStatus;
use crate::storage::{NodeRecord, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record for category {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for discovery storage backends
///
/// The discovery state is written through `save_progress`, which must apply
/// node updates and the frontier snapshot atomically so a reader never sees
/// one without the other.
pub trait DiscoveryStore {
    // ===== Run Management =====

    /// Creates a new discovery run
    fn create_run(&mut self, config_hash: &str, pagination_limit: u64) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    // ===== Progress =====

    /// Upserts the given nodes and replaces the frontier snapshot in one
    /// transaction
    fn save_progress(
        &mut self,
        run_id: i64,
        nodes: &[NodeRecord],
        frontier: &[String],
    ) -> StorageResult<()>;

    /// Loads every node recorded for a run
    fn load_nodes(&self, run_id: i64) -> StorageResult<Vec<NodeRecord>>;

    /// Loads the frontier snapshot in queue order
    fn load_frontier(&self, run_id: i64) -> StorageResult<Vec<String>>;

    /// Loads basis/fallback nodes in acceptance order
    fn load_basis(&self, run_id: i64) -> StorageResult<Vec<NodeRecord>>;

    // ===== Statistics =====

    /// Counts a run's nodes in a given status
    fn count_nodes_by_status(&self, run_id: i64, status: NodeStatus) -> StorageResult<u64>;

    /// Counts all nodes known to a run
    fn count_total_nodes(&self, run_id: i64) -> StorageResult<u64>;
}
