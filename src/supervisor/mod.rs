//! Worker supervision
//!
//! The supervisor launches one worker per store, keeps at most
//! `concurrency_limit` of them alive, restarts crashed workers with
//! exponential backoff and writes the aggregated status snapshot on every
//! poll. Workers report through heartbeat events; the supervisor never reads
//! their checkpoint or output files.
//!
//! # Components
//!
//! - Process: `WorkerLauncher` trait and the child-process launcher
//! - State: per-store lifecycle and stall detection
//! - Status: the snapshot file and its table rendering

mod process;
mod state;
mod status;

pub use process::{LaunchSpec, ProcessLauncher, WorkerEvent, WorkerExit, WorkerHandle, WorkerLauncher};
pub use state::{Health, StoreWorker, WorkerPhase};
pub use status::{print_snapshot, StatusSnapshot, WorkerStatus};

use crate::config::OrchestratorConfig;
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

/// Supervisor errors
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to launch worker for {store_id}: {source}")]
    Spawn {
        store_id: String,
        source: std::io::Error,
    },

    #[error("No stores to run")]
    NoStores,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Supervision tunables
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub concurrency_limit: usize,
    pub poll_interval: Duration,
    pub stall_window: Duration,

    /// Items per minute below which a worker counts as stalled
    pub stall_rate_threshold: f64,
    pub max_restarts: u32,
    pub restart_backoff: Duration,
    pub status_path: PathBuf,
}

impl SupervisorSettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            concurrency_limit: config.concurrency_limit.max(1),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            stall_window: Duration::from_secs(config.stall_window_secs),
            stall_rate_threshold: config.stall_rate_threshold,
            max_restarts: config.max_restarts,
            restart_backoff: Duration::from_millis(config.restart_backoff_ms),
            status_path: PathBuf::from(&config.status_path),
        }
    }
}

/// Final state of a supervised run
#[derive(Debug, Clone)]
pub struct SupervisorOutcome {
    pub completed: Vec<String>,
    pub terminated: Vec<String>,
    pub stopped: Vec<String>,
    pub snapshot: StatusSnapshot,
}

impl SupervisorOutcome {
    pub fn all_completed(&self) -> bool {
        self.terminated.is_empty() && self.stopped.is_empty()
    }
}

/// Runs store workers to completion
pub struct Supervisor<L> {
    launcher: L,
    settings: SupervisorSettings,
    start_index: Option<usize>,
    workers: Vec<StoreWorker>,
    handles: HashMap<String, WorkerHandle>,
    started_at: Instant,
    workers_launched: u64,
    workers_failed: u64,
    shutting_down: bool,
}

impl<L: WorkerLauncher> Supervisor<L> {
    pub fn new(launcher: L, settings: SupervisorSettings) -> Self {
        Self {
            launcher,
            settings,
            start_index: None,
            workers: Vec::new(),
            handles: HashMap::new(),
            started_at: Instant::now(),
            workers_launched: 0,
            workers_failed: 0,
            shutting_down: false,
        }
    }

    /// Start index passed to every store's first launch
    pub fn with_start_index(mut self, start_index: Option<usize>) -> Self {
        self.start_index = start_index;
        self
    }

    /// Supervises `store_ids` until every store is final
    ///
    /// When `shutdown` resolves, live workers are asked to stop and stores
    /// that have not finished end up `Stopped`.
    pub async fn run<F>(
        mut self,
        store_ids: &[String],
        shutdown: F,
    ) -> Result<SupervisorOutcome, SupervisorError>
    where
        F: Future<Output = ()>,
    {
        if store_ids.is_empty() {
            return Err(SupervisorError::NoStores);
        }

        self.started_at = Instant::now();
        self.workers = store_ids
            .iter()
            .enumerate()
            .map(|(i, store)| StoreWorker::new(i + 1, store.clone()))
            .collect();

        tracing::info!(
            "Supervising {} stores (concurrency limit {})",
            self.workers.len(),
            self.settings.concurrency_limit
        );

        let (events_tx, mut events_rx) = mpsc::channel(256);
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            if !self.shutting_down {
                self.launch_due(&events_tx, Instant::now());
            }
            if self.workers.iter().all(|worker| worker.phase.is_final()) {
                break;
            }

            tokio::select! {
                Some(event) = events_rx.recv() => {
                    self.handle_event(event, Instant::now());
                }
                _ = ticker.tick() => {
                    self.poll(Instant::now());
                }
                _ = &mut shutdown, if !self.shutting_down => {
                    self.begin_shutdown();
                }
            }
        }

        let snapshot = self.snapshot(Instant::now());
        if let Err(e) = snapshot.write(&self.settings.status_path) {
            tracing::warn!("Failed to write final status snapshot: {}", e);
        }

        let mut outcome = SupervisorOutcome {
            completed: Vec::new(),
            terminated: Vec::new(),
            stopped: Vec::new(),
            snapshot,
        };
        for worker in self.workers {
            match worker.phase {
                WorkerPhase::Completed => outcome.completed.push(worker.store_id),
                WorkerPhase::Terminated => outcome.terminated.push(worker.store_id),
                _ => outcome.stopped.push(worker.store_id),
            }
        }

        tracing::info!(
            "Supervision finished: {} completed, {} terminated, {} stopped",
            outcome.completed.len(),
            outcome.terminated.len(),
            outcome.stopped.len()
        );
        Ok(outcome)
    }

    /// Launches due stores while there is capacity
    fn launch_due(&mut self, events: &mpsc::Sender<WorkerEvent>, now: Instant) {
        let mut alive = self
            .workers
            .iter()
            .filter(|worker| worker.phase.is_alive())
            .count();

        for i in 0..self.workers.len() {
            if alive >= self.settings.concurrency_limit {
                break;
            }
            if !self.workers[i].is_due(now) {
                continue;
            }

            let worker = &mut self.workers[i];
            let spec = LaunchSpec {
                store_id: worker.store_id.clone(),
                launch: worker.launches + 1,
                start_index: if worker.launches == 0 {
                    self.start_index
                } else {
                    None
                },
            };

            match self.launcher.launch(&spec, events.clone()) {
                Ok(handle) => {
                    worker.mark_launched(now);
                    self.handles.insert(spec.store_id, handle);
                    self.workers_launched += 1;
                    alive += 1;
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    self.workers_failed += 1;
                    if worker.record_failure(
                        self.settings.max_restarts,
                        self.settings.restart_backoff,
                        now,
                    ) {
                        tracing::error!(
                            "Store {} terminated after {} failed launches",
                            worker.store_id,
                            worker.consecutive_failures
                        );
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: WorkerEvent, now: Instant) {
        match event {
            WorkerEvent::Heartbeat {
                store_id,
                launch,
                heartbeat,
            } => {
                if let Some(worker) = self.live_worker(&store_id, launch) {
                    worker.record_heartbeat(heartbeat, now);
                }
            }
            WorkerEvent::Exited {
                store_id,
                launch,
                exit,
            } => self.handle_exit(&store_id, launch, exit, now),
        }
    }

    fn handle_exit(&mut self, store_id: &str, launch: u64, exit: WorkerExit, now: Instant) {
        let shutting_down = self.shutting_down;
        let max_restarts = self.settings.max_restarts;
        let backoff = self.settings.restart_backoff;

        let Some(worker) = self.live_worker(store_id, launch) else {
            return;
        };
        worker.close_launch();

        let mut failed = false;
        if exit.is_success() {
            tracing::info!("Store {} completed", store_id);
            worker.phase = WorkerPhase::Completed;
        } else if shutting_down {
            tracing::info!("Store {} stopped (exit code {:?})", store_id, exit.code);
            worker.phase = WorkerPhase::Stopped;
        } else {
            failed = true;
            tracing::warn!(
                "Worker for {} exited unexpectedly (code {:?}, clean shutdown {})",
                store_id,
                exit.code,
                exit.clean_shutdown
            );
            if worker.record_failure(max_restarts, backoff, now) {
                tracing::error!(
                    "Store {} terminated after {} consecutive failures",
                    store_id,
                    worker.consecutive_failures
                );
            }
        }

        if failed {
            self.workers_failed += 1;
        }
        self.handles.remove(store_id);
    }

    /// Worker for `store_id` if `launch` is its live launch
    fn live_worker(&mut self, store_id: &str, launch: u64) -> Option<&mut StoreWorker> {
        self.workers.iter_mut().find(|worker| {
            worker.store_id == store_id && worker.launches == launch && worker.phase.is_alive()
        })
    }

    fn poll(&mut self, now: Instant) {
        for worker in &mut self.workers {
            if worker.evaluate_health(
                self.settings.stall_window,
                self.settings.stall_rate_threshold,
                now,
            ) {
                tracing::warn!(
                    "Worker for {} is stalled (below {} items/min over {:?})",
                    worker.store_id,
                    self.settings.stall_rate_threshold,
                    self.settings.stall_window
                );
            }
        }

        if let Err(e) = self.snapshot(now).write(&self.settings.status_path) {
            tracing::warn!("Failed to write status snapshot: {}", e);
        }
    }

    fn begin_shutdown(&mut self) {
        tracing::info!("Shutdown requested, stopping {} workers", self.handles.len());
        self.shutting_down = true;

        for worker in &mut self.workers {
            if !worker.phase.is_alive() && !worker.phase.is_final() {
                worker.phase = WorkerPhase::Stopped;
            }
        }
        for handle in self.handles.values_mut() {
            handle.request_stop();
        }
    }

    pub fn snapshot(&self, now: Instant) -> StatusSnapshot {
        StatusSnapshot {
            timestamp: Utc::now(),
            uptime_seconds: now.duration_since(self.started_at).as_secs(),
            total_items: self.workers.iter().map(|w| w.items_total()).sum(),
            workers_launched: self.workers_launched,
            workers_failed: self.workers_failed,
            blocking_incidents: self.workers.iter().map(|w| w.blocked_total()).sum(),
            workers: self.workers.iter().map(|w| w.status(now)).collect(),
        }
    }
}
