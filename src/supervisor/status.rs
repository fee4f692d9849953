//! Aggregated status snapshot
//!
//! Written by the supervisor only, replaced atomically on every poll so
//! external monitors never read a partial file.

use crate::supervisor::SupervisorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Point-in-time view of every store worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub total_items: u64,
    pub workers_launched: u64,
    pub workers_failed: u64,
    pub blocking_incidents: u64,
    pub workers: Vec<WorkerStatus>,
}

/// One store worker as seen by the supervisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub id: usize,
    pub store_id: String,
    pub alive: bool,
    pub items_total: u64,
    pub items_per_minute: f64,
    pub memory_mb: f64,
    pub cpu_percent: f64,

    /// Supervisor phase (`running`, `stalled`, `terminated`, ...)
    pub phase: String,
    pub category_index: usize,
    pub total_categories: usize,
    pub restarts: u32,
}

impl StatusSnapshot {
    /// Writes the snapshot as JSON (write to temp, then rename)
    pub fn write(&self, path: &Path) -> Result<(), SupervisorError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let bytes = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, SupervisorError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Prints a snapshot as a table
pub fn print_snapshot(snapshot: &StatusSnapshot) {
    println!("=== Worker Status ({}) ===\n", snapshot.timestamp.to_rfc3339());
    println!(
        "Uptime: {}s  Items: {}  Launched: {}  Failed: {}  Blocked: {}",
        snapshot.uptime_seconds,
        snapshot.total_items,
        snapshot.workers_launched,
        snapshot.workers_failed,
        snapshot.blocking_incidents
    );
    println!();
    println!(
        "{:<4} {:<16} {:<11} {:>5} {:>9} {:>10} {:>8} {:>6} {:>8}",
        "ID", "STORE", "PHASE", "ALIVE", "PROGRESS", "ITEMS", "ITEM/MIN", "MEM MB", "CPU %"
    );
    for worker in &snapshot.workers {
        println!(
            "{:<4} {:<16} {:<11} {:>5} {:>9} {:>10} {:>8.1} {:>6.1} {:>8.1}",
            worker.id,
            worker.store_id,
            worker.phase,
            if worker.alive { "yes" } else { "no" },
            format!("{}/{}", worker.category_index, worker.total_categories),
            worker.items_total,
            worker.items_per_minute,
            worker.memory_mb,
            worker.cpu_percent
        );
    }
}
