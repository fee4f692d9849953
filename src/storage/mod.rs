//! Storage module for persisting discovery progress
//!
//! This module handles all database operations for discovery, including:
//! - SQLite database initialization and schema management
//! - Run tracking and resumption support
//! - Node classification persistence
//! - Frontier snapshots

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{DiscoveryStore, StorageError, StorageResult};

use crate::category::CategoryNode;

/// A category node as persisted for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub node: CategoryNode,
    pub is_listing: bool,

    /// Position in the run's basis list, if accepted
    pub basis_seq: Option<i64>,
    pub visited_at: Option<String>,
}

/// Represents a discovery run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub pagination_limit: u64,
    pub status: RunStatus,
}

/// Status of a discovery run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true if a run in this status can be picked up again
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Running | Self::Interrupted)
    }
}
