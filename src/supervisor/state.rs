//! Per-store worker bookkeeping
//!
//! Lifecycle of one store:
//!
//! ```text
//! Pending -> Starting -> Running(Healthy|Stalled) -> Completed
//!                 \              |
//!                  \             v (crash)
//!                   +------> Restarting -> Starting ... -> Terminated
//! ```

use crate::supervisor::status::WorkerStatus;
use crate::worker::Heartbeat;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Health of a running worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Stalled,
}

/// Supervisor phase of one store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Pending,
    Starting,
    Running(Health),
    Restarting { at: Instant },
    Completed,
    Terminated,

    /// Stopped by a supervisor shutdown
    Stopped,
}

impl WorkerPhase {
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Starting | Self::Running(_))
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Terminated | Self::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Running(Health::Healthy) => "running",
            Self::Running(Health::Stalled) => "stalled",
            Self::Restarting { .. } => "restarting",
            Self::Completed => "completed",
            Self::Terminated => "terminated",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the supervisor knows about one store's worker
#[derive(Debug)]
pub struct StoreWorker {
    pub id: usize,
    pub store_id: String,
    pub phase: WorkerPhase,

    /// Launches so far; also identifies the live launch
    pub launches: u64,

    /// Failures since the last launch that made progress
    pub consecutive_failures: u32,
    pub started_at: Option<Instant>,
    pub last_heartbeat: Option<Heartbeat>,

    /// Items and blocks from finished launches
    items_before: u64,
    blocked_before: u64,
    samples: VecDeque<(Instant, u64)>,
}

impl StoreWorker {
    pub fn new(id: usize, store_id: String) -> Self {
        Self {
            id,
            store_id,
            phase: WorkerPhase::Pending,
            launches: 0,
            consecutive_failures: 0,
            started_at: None,
            last_heartbeat: None,
            items_before: 0,
            blocked_before: 0,
            samples: VecDeque::new(),
        }
    }

    /// Returns true if the store should be launched now
    pub fn is_due(&self, now: Instant) -> bool {
        match self.phase {
            WorkerPhase::Pending => true,
            WorkerPhase::Restarting { at } => now >= at,
            _ => false,
        }
    }

    pub fn mark_launched(&mut self, now: Instant) {
        self.launches += 1;
        self.phase = WorkerPhase::Starting;
        self.started_at = Some(now);
        self.last_heartbeat = None;
        self.samples.clear();
        self.samples.push_back((now, self.items_before));
    }

    /// Applies a heartbeat from the live launch
    ///
    /// A heartbeat showing a completed category resets the failure count.
    pub fn record_heartbeat(&mut self, heartbeat: Heartbeat, now: Instant) {
        if self.phase == WorkerPhase::Starting {
            self.phase = WorkerPhase::Running(Health::Healthy);
        }
        if heartbeat.categories_completed > 0 {
            self.consecutive_failures = 0;
        }
        self.samples
            .push_back((now, self.items_before + heartbeat.items_total));
        self.last_heartbeat = Some(heartbeat);
    }

    /// Folds the finished launch's counters into the totals
    pub fn close_launch(&mut self) {
        if let Some(heartbeat) = &self.last_heartbeat {
            self.items_before += heartbeat.items_total;
            self.blocked_before += heartbeat.blocked_incidents;
        }
        self.last_heartbeat = None;
        self.started_at = None;
    }

    /// Records a failed launch; returns true if the store is now terminated
    pub fn record_failure(&mut self, max_restarts: u32, backoff: Duration, now: Instant) -> bool {
        self.consecutive_failures += 1;
        if self.consecutive_failures > max_restarts {
            self.phase = WorkerPhase::Terminated;
            return true;
        }

        let delay = backoff * (1u32 << (self.consecutive_failures - 1).min(5));
        self.phase = WorkerPhase::Restarting { at: now + delay };
        false
    }

    pub fn items_total(&self) -> u64 {
        self.items_before
            + self
                .last_heartbeat
                .as_ref()
                .map(|heartbeat| heartbeat.items_total)
                .unwrap_or(0)
    }

    pub fn blocked_total(&self) -> u64 {
        self.blocked_before
            + self
                .last_heartbeat
                .as_ref()
                .map(|heartbeat| heartbeat.blocked_incidents)
                .unwrap_or(0)
    }

    /// Items per minute since the oldest kept sample
    pub fn items_per_minute(&self, now: Instant) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some((t0, n0)), Some((_, n1))) => {
                let minutes = now.duration_since(*t0).as_secs_f64() / 60.0;
                if minutes <= 0.0 {
                    0.0
                } else {
                    n1.saturating_sub(*n0) as f64 / minutes
                }
            }
            _ => 0.0,
        }
    }

    /// Drops samples older than `window`, keeping one at or beyond its start
    fn prune_samples(&mut self, window: Duration, now: Instant) {
        while self.samples.len() > 1
            && self
                .samples
                .get(1)
                .map(|(at, _)| now.duration_since(*at) >= window)
                .unwrap_or(false)
        {
            self.samples.pop_front();
        }
    }

    /// Re-evaluates stall status; returns true on a transition into `Stalled`
    ///
    /// Only workers that have been up for a full window can stall. Stalled
    /// workers are reported, never killed.
    pub fn evaluate_health(&mut self, window: Duration, threshold: f64, now: Instant) -> bool {
        self.prune_samples(window, now);

        let WorkerPhase::Running(health) = self.phase else {
            return false;
        };
        let up_for = self
            .started_at
            .map(|started| now.duration_since(started))
            .unwrap_or_default();
        if up_for < window {
            return false;
        }

        let stalled = self.items_per_minute(now) < threshold;
        let next = if stalled { Health::Stalled } else { Health::Healthy };
        self.phase = WorkerPhase::Running(next);
        stalled && health == Health::Healthy
    }

    pub fn status(&self, now: Instant) -> WorkerStatus {
        let heartbeat = self.last_heartbeat.as_ref();
        let alive = self.phase.is_alive();
        WorkerStatus {
            id: self.id,
            store_id: self.store_id.clone(),
            alive,
            items_total: self.items_total(),
            items_per_minute: if alive {
                self.items_per_minute(now)
            } else {
                0.0
            },
            memory_mb: heartbeat.map(|h| h.memory_mb).unwrap_or(0.0),
            cpu_percent: heartbeat.map(|h| h.cpu_percent).unwrap_or(0.0),
            phase: self.phase.to_string(),
            category_index: heartbeat.map(|h| h.category_index).unwrap_or(0),
            total_categories: heartbeat.map(|h| h.total_categories).unwrap_or(0),
            restarts: self.launches.saturating_sub(1) as u32,
        }
    }
}
