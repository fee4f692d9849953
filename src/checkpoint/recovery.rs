//! Checkpoint recovery from worker logs
//!
//! Workers log `category N of M completed` (N zero-based) after each
//! category. When a checkpoint is missing, corrupt or older than the log by
//! more than the staleness threshold, the last such marker decides where the
//! worker resumes. A `checkpoint reset` line in the log hides every marker
//! written before it.

use crate::checkpoint::{CheckpointError, CheckpointStore};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Bytes read per requested tail line when scanning a log backwards
const TAIL_BYTES_PER_LINE: u64 = 512;

fn marker_regex() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r"category (\d+) of (\d+) completed").ok())
        .as_ref()
}

/// Log line that discards earlier completion markers
pub const RESET_MARKER: &str = "checkpoint reset, restarting from category 0";

/// Log line written by a worker after finishing category `index`
pub fn completion_marker(index: usize, total: usize) -> String {
    format!("category {} of {} completed", index, total)
}

/// Where a worker's start index came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeSource {
    Override,
    Checkpoint,
    LogRecovery,
    Default,
}

/// Resolved start index for a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub index: usize,
    pub source: ResumeSource,
}

/// Staleness and tail size used when resolving a start index
#[derive(Debug, Clone, Copy)]
pub struct RecoveryPolicy {
    pub staleness: Duration,
    pub tail_lines: usize,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(600),
            tail_lines: 200,
        }
    }
}

/// Finds the resume index from a log tail
///
/// Returns `N + 1` for the last `category N of M completed` marker, or 0 if
/// there is none.
///
/// # Examples
///
/// ```
/// use catalog_sweep::checkpoint::reconstruct;
///
/// let tail = vec![
///     "INFO catalog_sweep::worker: category 3 of 10 completed".to_string(),
///     "INFO catalog_sweep::worker: category 4 of 10 completed".to_string(),
///     "WARN catalog_sweep::worker: listing page timed out".to_string(),
/// ];
/// assert_eq!(reconstruct("store-101", &tail), 5);
/// assert_eq!(reconstruct("store-101", &[]), 0);
/// ```
pub fn reconstruct(store_id: &str, log_tail: &[String]) -> usize {
    match last_completed(log_tail) {
        Some((index, total)) => {
            tracing::info!(
                "Recovered {} from log: category {} of {} was the last completed",
                store_id,
                index,
                total
            );
            index + 1
        }
        None => 0,
    }
}

/// Last completion marker in a log tail as `(index, total)`
///
/// Scanning stops at the most recent reset marker.
pub fn last_completed(log_tail: &[String]) -> Option<(usize, usize)> {
    let marker = marker_regex()?;
    for line in log_tail.iter().rev() {
        if line.contains(RESET_MARKER) {
            return None;
        }
        let Some(captures) = marker.captures_iter(line).last() else {
            continue;
        };
        let index = captures.get(1).and_then(|m| m.as_str().parse().ok());
        let total = captures.get(2).and_then(|m| m.as_str().parse().ok());
        if let (Some(index), Some(total)) = (index, total) {
            return Some((index, total));
        }
    }
    None
}

/// Clears a store's progress so its next worker starts at index 0
///
/// Deletes the checkpoint and, when the worker log exists, appends the reset
/// marker so log recovery no longer sees the old run. Returns false if there
/// was neither a checkpoint nor a log.
pub fn reset_progress(
    checkpoints: &CheckpointStore,
    store_id: &str,
    log_path: &Path,
) -> Result<bool, CheckpointError> {
    let removed = checkpoints.reset(store_id)?;

    let mut log = match std::fs::OpenOptions::new().append(true).open(log_path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
        Err(e) => return Err(CheckpointError::Io(e)),
    };
    writeln!(log, "{}  INFO {}", Utc::now().to_rfc3339(), RESET_MARKER)?;

    tracing::info!("Reset progress for {}", store_id);
    Ok(true)
}

/// Reads up to `lines` trailing lines of a log file
///
/// A missing log yields an empty tail.
pub fn read_log_tail(path: &Path, lines: usize) -> std::io::Result<Vec<String>> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let len = file.metadata()?.len();
    let window = (lines as u64).saturating_mul(TAIL_BYTES_PER_LINE);
    let start = len.saturating_sub(window);
    file.seek(SeekFrom::Start(start))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let text = String::from_utf8_lossy(&bytes);

    let mut all: Vec<&str> = text.lines().collect();
    if start > 0 && !all.is_empty() {
        // first line is probably cut
        all.remove(0);
    }

    let skip = all.len().saturating_sub(lines);
    Ok(all[skip..].iter().map(|line| line.to_string()).collect())
}

/// Decides where a store's worker starts
///
/// Order: explicit override, then a fresh checkpoint, then the worker log,
/// then 0. A stale checkpoint with no marker in the log is still used.
pub fn resolve_start_index(
    checkpoints: &CheckpointStore,
    store_id: &str,
    log_path: &Path,
    policy: RecoveryPolicy,
    override_index: Option<usize>,
) -> Result<ResumePoint, CheckpointError> {
    if let Some(index) = override_index {
        tracing::info!("Starting {} at index {} (override)", store_id, index);
        return Ok(ResumePoint {
            index,
            source: ResumeSource::Override,
        });
    }

    let checkpoint = match checkpoints.read(store_id) {
        Ok(record) => record,
        Err(CheckpointError::Io(e)) => return Err(CheckpointError::Io(e)),
        Err(e) => {
            tracing::warn!("{}", e);
            None
        }
    };

    let log_modified: Option<DateTime<Utc>> = std::fs::metadata(log_path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    if let Some(record) = &checkpoint {
        let stale_by = log_modified
            .and_then(|log_time| (log_time - record.updated_at).to_std().ok())
            .filter(|age| *age > policy.staleness);

        match stale_by {
            None => {
                return Ok(ResumePoint {
                    index: record.category_index,
                    source: ResumeSource::Checkpoint,
                });
            }
            Some(age) => {
                tracing::warn!(
                    "{}",
                    CheckpointError::Stale {
                        store_id: store_id.to_string(),
                        age_secs: age.as_secs(),
                    }
                );
            }
        }
    }

    let tail = read_log_tail(log_path, policy.tail_lines)?;
    if last_completed(&tail).is_some() {
        return Ok(ResumePoint {
            index: reconstruct(store_id, &tail),
            source: ResumeSource::LogRecovery,
        });
    }

    match checkpoint {
        Some(record) => Ok(ResumePoint {
            index: record.category_index,
            source: ResumeSource::Checkpoint,
        }),
        None => {
            tracing::warn!(
                "No checkpoint or completion marker for {}; starting from index 0",
                store_id
            );
            Ok(ResumePoint {
                index: 0,
                source: ResumeSource::Default,
            })
        }
    }
}
