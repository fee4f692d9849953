//! Worker process launching and monitoring
//!
//! Each launch gets a monitor task that forwards heartbeats from the child's
//! stdout to the supervisor channel and reports the exit. Stopping is
//! cooperative: stdin is closed, and the child is killed if it is still
//! running after the grace period.

use crate::supervisor::SupervisorError;
use crate::worker::{log_file, Heartbeat, WorkerPaths};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// Messages from monitor tasks to the supervisor
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Heartbeat {
        store_id: String,
        launch: u64,
        heartbeat: Heartbeat,
    },
    Exited {
        store_id: String,
        launch: u64,
        exit: WorkerExit,
    },
}

/// How a worker launch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub code: Option<i32>,

    /// The final heartbeat carried the clean-shutdown marker
    pub clean_shutdown: bool,

    /// The worker reported every category in range as done
    pub completed: bool,
}

impl WorkerExit {
    pub fn is_success(&self) -> bool {
        self.code == Some(0) && self.clean_shutdown && self.completed
    }
}

/// What to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub store_id: String,
    pub launch: u64,

    /// Explicit start index, only honored on a store's first launch
    pub start_index: Option<usize>,
}

/// Handle to a live launch
#[derive(Debug)]
pub struct WorkerHandle {
    stop: Option<oneshot::Sender<()>>,
}

impl WorkerHandle {
    pub fn new(stop: oneshot::Sender<()>) -> Self {
        Self { stop: Some(stop) }
    }

    /// Asks the worker to stop; later calls do nothing
    pub fn request_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// Starts workers and wires their events into the supervisor channel
pub trait WorkerLauncher {
    fn launch(
        &self,
        spec: &LaunchSpec,
        events: mpsc::Sender<WorkerEvent>,
    ) -> Result<WorkerHandle, SupervisorError>;
}

/// Launches `catalog-sweep worker` child processes
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    pub program: PathBuf,
    pub config_path: PathBuf,
    pub paths: WorkerPaths,
    pub max_categories: Option<usize>,
    pub grace_period: Duration,

    /// Extra arguments placed before the subcommand (e.g. `-v`)
    pub global_args: Vec<String>,
}

impl ProcessLauncher {
    fn command(&self, spec: &LaunchSpec) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.global_args)
            .arg("--config")
            .arg(&self.config_path)
            .arg("worker")
            .arg("--store")
            .arg(&spec.store_id)
            .arg("--basis")
            .arg(&self.paths.basis)
            .arg("--output-dir")
            .arg(&self.paths.output_dir)
            .arg("--checkpoint-dir")
            .arg(&self.paths.checkpoint_dir)
            .arg("--log-dir")
            .arg(&self.paths.log_dir)
            .arg("--supervised");

        if let Some(index) = spec.start_index {
            command.arg("--start-index").arg(index.to_string());
        }
        if let Some(max) = self.max_categories {
            command.arg("--max-categories").arg(max.to_string());
        }
        command
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(
        &self,
        spec: &LaunchSpec,
        events: mpsc::Sender<WorkerEvent>,
    ) -> Result<WorkerHandle, SupervisorError> {
        let spawn_error = |source: std::io::Error| SupervisorError::Spawn {
            store_id: spec.store_id.clone(),
            source,
        };

        std::fs::create_dir_all(&self.paths.log_dir).map_err(spawn_error)?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file(&self.paths.log_dir, &spec.store_id))
            .map_err(spawn_error)?;

        let child = self
            .command(spec)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(log))
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        tracing::info!(
            "Launched worker for {} (launch {}, pid {:?})",
            spec.store_id,
            spec.launch,
            child.id()
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(monitor(
            child,
            spec.store_id.clone(),
            spec.launch,
            events,
            stop_rx,
            self.grace_period,
        ));

        Ok(WorkerHandle::new(stop_tx))
    }
}

/// Forwards heartbeats until the child closes stdout, then reports its exit
async fn monitor(
    mut child: Child,
    store_id: String,
    launch: u64,
    events: mpsc::Sender<WorkerEvent>,
    mut stop: oneshot::Receiver<()>,
    grace: Duration,
) {
    let mut stdin = child.stdin.take();
    let mut lines = child.stdout.take().map(|stdout| BufReader::new(stdout).lines());

    let mut last: Option<Heartbeat> = None;
    let mut stop_requested = false;
    let kill_at = tokio::time::sleep(Duration::MAX);
    tokio::pin!(kill_at);
    let mut killed = false;

    while let Some(reader) = lines.as_mut() {
        tokio::select! {
            line = reader.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(heartbeat) = Heartbeat::parse_line(&line) {
                        last = Some(heartbeat.clone());
                        let _ = events
                            .send(WorkerEvent::Heartbeat {
                                store_id: store_id.clone(),
                                launch,
                                heartbeat,
                            })
                            .await;
                    }
                }
                Ok(None) | Err(_) => break,
            },
            _ = &mut stop, if !stop_requested => {
                stop_requested = true;
                // closing stdin is the stop signal
                drop(stdin.take());
                kill_at.as_mut().reset(tokio::time::Instant::now() + grace);
            }
            _ = &mut kill_at, if stop_requested && !killed => {
                tracing::warn!("Worker for {} ignored stop for {:?}; killing it", store_id, grace);
                let _ = child.start_kill();
                killed = true;
            }
        }
    }

    let status = if stop_requested && !killed {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => status.ok(),
            Err(_) => {
                let _ = child.start_kill();
                child.wait().await.ok()
            }
        }
    } else {
        child.wait().await.ok()
    };

    let exit = WorkerExit {
        code: status.and_then(|status| status.code()),
        clean_shutdown: last.as_ref().map(|h| h.finished).unwrap_or(false),
        completed: last.as_ref().map(|h| h.completed).unwrap_or(false),
    };

    let _ = events
        .send(WorkerEvent::Exited {
            store_id,
            launch,
            exit,
        })
        .await;
}
