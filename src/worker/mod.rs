//! Store workers
//!
//! A worker is one OS process bound to one store. It walks the shared basis
//! list from its resume index, appends scraped items to its own output file,
//! advances its own checkpoint and reports heartbeats on stdout.
//!
//! # Components
//!
//! - Scraper: `ListingScraper` trait and its HTTP implementation
//! - Sink: `OutputSink` trait and the JSON lines file sink
//! - Heartbeat: progress lines read by the supervisor
//! - Runner: the category loop

mod heartbeat;
mod runner;
mod scraper;
mod sink;

pub use heartbeat::{Heartbeat, HeartbeatEmitter, ProcessSampler};
pub use runner::{Worker, WorkerSummary};
pub use scraper::{HttpListingScraper, ListingScraper};
pub use sink::{ItemRecord, JsonLinesSink, MemorySink, OutputSink};

use crate::checkpoint::{resolve_start_index, CheckpointStore, RecoveryPolicy};
use crate::config::Config;
use crate::discovery::RetryPolicy;
use crate::output::read_basis_file;
use crate::SweepError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;

/// What one worker run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub store_id: String,

    /// Explicit start index; otherwise resolved from checkpoint or log
    pub start_index: Option<usize>,

    /// Upper bound on categories processed in this run
    pub max_categories: Option<usize>,
}

/// Files a worker reads and writes
#[derive(Debug, Clone)]
pub struct WorkerPaths {
    pub basis: PathBuf,
    pub output_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl WorkerPaths {
    pub fn output_file(&self, store_id: &str) -> PathBuf {
        output_file(&self.output_dir, store_id)
    }

    pub fn log_file(&self, store_id: &str) -> PathBuf {
        log_file(&self.log_dir, store_id)
    }
}

/// Output file of a store's worker
pub fn output_file(output_dir: &Path, store_id: &str) -> PathBuf {
    output_dir.join(format!("{}.jsonl", store_id))
}

/// Log file of a store's worker
pub fn log_file(log_dir: &Path, store_id: &str) -> PathBuf {
    log_dir.join(format!("{}.log", store_id))
}

/// Runs a worker for one store in the current process
///
/// With `supervised` set, end of stdin is treated as a stop request; Ctrl-C
/// always is.
pub async fn run_worker_process(
    config: &Config,
    run: RunConfig,
    paths: &WorkerPaths,
    supervised: bool,
) -> Result<WorkerSummary, SweepError> {
    let basis = read_basis_file(&paths.basis)?;
    let checkpoints = CheckpointStore::new(&paths.checkpoint_dir);

    let policy = RecoveryPolicy {
        staleness: Duration::from_secs(config.orchestrator.checkpoint_staleness_secs),
        tail_lines: config.orchestrator.log_tail_lines,
    };
    let resume = resolve_start_index(
        &checkpoints,
        &run.store_id,
        &paths.log_file(&run.store_id),
        policy,
        run.start_index,
    )?;
    tracing::info!(
        "Worker for {} resuming at index {} ({:?})",
        run.store_id,
        resume.index,
        resume.source
    );

    let scraper = HttpListingScraper::new(&config.probe)?;
    let mut sink = JsonLinesSink::open(&paths.output_file(&run.store_id))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let ctrl_c_tx = stop_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after current category");
            let _ = ctrl_c_tx.send(true);
        }
    });
    if supervised {
        tokio::spawn(stop_on_stdin_eof(stop_tx));
    }

    let mut worker = Worker::new(
        run,
        &scraper,
        checkpoints,
        RetryPolicy::from_config(&config.discovery),
        HeartbeatEmitter::new(tokio::io::stdout()),
    )
    .with_heartbeat_interval(Duration::from_secs(
        config.orchestrator.heartbeat_interval_secs,
    ));

    worker.run(&basis, resume.index, &mut sink, stop_rx).await
}

/// Requests a stop once the supervisor closes our stdin
async fn stop_on_stdin_eof(stop: watch::Sender<bool>) {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 256];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }
    tracing::info!("Supervisor closed stdin, stopping");
    let _ = stop.send(true);
}
