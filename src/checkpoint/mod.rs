//! Worker checkpoints
//!
//! This module tracks how far each store worker has progressed through the
//! basis list:
//! - Store: atomic per-store checkpoint files
//! - Recovery: rebuilding a lost or stale checkpoint from the worker log

mod recovery;
mod store;

pub use recovery::{
    completion_marker, last_completed, read_log_tail, reconstruct, reset_progress,
    resolve_start_index, RecoveryPolicy, ResumePoint, ResumeSource, RESET_MARKER,
};
pub use store::{CheckpointRecord, CheckpointStore};

use thiserror::Error;

/// Errors reading or writing checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Corrupt checkpoint {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Checkpoint for {store_id} is {age_secs}s older than its worker log")]
    Stale { store_id: String, age_secs: u64 },

    #[error("Checkpoint IO error: {0}")]
    Io(#[from] std::io::Error),
}
