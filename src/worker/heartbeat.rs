//! Worker heartbeats
//!
//! Workers report progress as one JSON object per line on stdout. The
//! supervisor reads these lines instead of polling the process. The last
//! heartbeat of a clean exit carries `finished = true`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Assumed kernel page size for `/proc/self/statm`
const PAGE_SIZE_BYTES: f64 = 4096.0;

/// Assumed clock ticks per second for `/proc/self/stat`
const CLOCK_TICKS: f64 = 100.0;

/// Progress report from a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub store_id: String,

    /// Next category to process
    pub category_index: usize,
    pub categories_completed: usize,
    pub total_categories: usize,
    pub items_total: u64,
    pub blocked_incidents: u64,
    pub memory_mb: f64,
    pub cpu_percent: f64,

    /// Clean shutdown marker
    pub finished: bool,

    /// True once every category in range has been processed
    pub completed: bool,
    pub timestamp: DateTime<Utc>,
}

impl Heartbeat {
    /// Parses one heartbeat line, ignoring anything that is not one
    pub fn parse_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}

/// Samples memory and CPU usage of the current process
///
/// Reads `/proc/self`; reports zeros where that is unavailable.
#[derive(Debug)]
pub struct ProcessSampler {
    last_sample: Instant,
    last_cpu_ticks: Option<u64>,
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self {
            last_sample: Instant::now(),
            last_cpu_ticks: read_cpu_ticks(),
        }
    }

    /// Resident memory in megabytes
    pub fn memory_mb(&self) -> f64 {
        std::fs::read_to_string("/proc/self/statm")
            .ok()
            .and_then(|statm| statm.split_whitespace().nth(1)?.parse::<f64>().ok())
            .map(|pages| pages * PAGE_SIZE_BYTES / (1024.0 * 1024.0))
            .unwrap_or(0.0)
    }

    /// CPU usage since the previous sample, in percent of one core
    pub fn cpu_percent(&mut self) -> f64 {
        let now = Instant::now();
        let ticks = read_cpu_ticks();
        let elapsed = now.duration_since(self.last_sample).as_secs_f64();

        let percent = match (self.last_cpu_ticks, ticks) {
            (Some(before), Some(after)) if elapsed > 0.0 => {
                (after.saturating_sub(before) as f64 / CLOCK_TICKS) / elapsed * 100.0
            }
            _ => 0.0,
        };

        self.last_sample = now;
        self.last_cpu_ticks = ticks;
        percent
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// utime + stime from `/proc/self/stat`
fn read_cpu_ticks() -> Option<u64> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    // fields after the parenthesized command name
    let rest = stat.rsplit_once(')')?.1;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

/// Writes heartbeats as JSON lines
pub struct HeartbeatEmitter<W> {
    writer: W,
    sampler: ProcessSampler,
}

impl<W: AsyncWrite + Unpin> HeartbeatEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            sampler: ProcessSampler::new(),
        }
    }

    /// Fills in resource usage and writes one heartbeat line
    pub async fn emit(&mut self, mut heartbeat: Heartbeat) -> std::io::Result<Heartbeat> {
        heartbeat.memory_mb = self.sampler.memory_mb();
        heartbeat.cpu_percent = self.sampler.cpu_percent();
        heartbeat.timestamp = Utc::now();

        let mut line = serde_json::to_vec(&heartbeat)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(heartbeat)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
