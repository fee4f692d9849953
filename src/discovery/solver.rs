//! Coverage solver - the discovery loop
//!
//! This module walks the category graph from department roots and builds the
//! basis set:
//! - Resuming or starting a run in the discovery store
//! - Popping unvisited nodes from the frontier
//! - Probing each node with bounded retries
//! - Classifying it and queueing children when it must be drilled
//! - Flushing progress after every basis acceptance and at fixed intervals

use crate::category::{CategoryNode, NodeStatus};
use crate::config::DiscoveryConfig;
use crate::discovery::retry::{with_retry, RetryPolicy};
use crate::discovery::state::DiscoveryState;
use crate::probe::{CategoryProbe, ProbeResponse, StoreContext};
use crate::storage::{DiscoveryStore, RunStatus, SqliteStorage};
use crate::url::canonicalize_url;
use crate::SweepError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Tunables for one discovery run
#[derive(Debug, Clone, Copy)]
pub struct SolverSettings {
    pub pagination_limit: u64,
    pub retry: RetryPolicy,

    /// Probes between periodic flushes
    pub persist_interval: u32,
}

impl SolverSettings {
    pub fn new(pagination_limit: u64) -> Self {
        Self {
            pagination_limit,
            retry: RetryPolicy::default(),
            persist_interval: 25,
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            pagination_limit: config.pagination_limit,
            retry: RetryPolicy::from_config(config),
            persist_interval: config.persist_interval.max(1),
        }
    }
}

/// Counters for one solver session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub probes: u64,
    pub hubs: u64,
    pub basis: u64,
    pub overflow: u64,
    pub fallback: u64,
    pub empty: u64,

    /// Probes that failed after every retry
    pub probe_failures: u64,

    /// Failed probes whose last error was an access block
    pub blocked: u64,
}

/// Result of a discovery session
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub run_id: i64,

    /// Basis and fallback nodes in acceptance order
    pub basis: Vec<CategoryNode>,

    /// False if the session stopped before the frontier drained
    pub complete: bool,
    pub stats: SolverStats,
}

/// Classifies a probed node from its count and whether it has children
///
/// # Examples
///
/// ```
/// use catalog_sweep::discovery::classify;
/// use catalog_sweep::NodeStatus;
///
/// assert_eq!(classify(0, true, 2000), NodeStatus::Hub);
/// assert_eq!(classify(1200, true, 2000), NodeStatus::Basis);
/// assert_eq!(classify(5000, true, 2000), NodeStatus::Overflow);
/// assert_eq!(classify(3000, false, 2000), NodeStatus::Fallback);
/// ```
pub fn classify(count: u64, has_children: bool, limit: u64) -> NodeStatus {
    match (count, has_children) {
        (0, true) => NodeStatus::Hub,
        (0, false) => NodeStatus::Empty,
        (count, _) if count <= limit => NodeStatus::Basis,
        (_, true) => NodeStatus::Overflow,
        (_, false) => NodeStatus::Fallback,
    }
}

/// Walks the category graph and accumulates the basis set
pub struct CoverageSolver<S: DiscoveryStore> {
    store: S,
    settings: SolverSettings,
    store_context: StoreContext,
    run_id: i64,
    state: DiscoveryState,
    stats: SolverStats,
    stop: Arc<AtomicBool>,
}

impl<S: DiscoveryStore> CoverageSolver<S> {
    /// Creates a solver, resuming the latest interrupted run unless `fresh`
    ///
    /// A run is only resumed if it was recorded with the same pagination
    /// limit; otherwise a new run is started.
    pub fn new(
        mut store: S,
        settings: SolverSettings,
        store_context: StoreContext,
        config_hash: &str,
        fresh: bool,
    ) -> Result<Self, SweepError> {
        let resumable = if fresh {
            None
        } else {
            store.get_latest_run()?.filter(|run| {
                run.status.is_resumable() && run.pagination_limit == settings.pagination_limit
            })
        };

        let (run_id, state) = match resumable {
            Some(run) => {
                tracing::info!("Resuming interrupted discovery run {}", run.id);
                if run.config_hash != config_hash {
                    tracing::warn!(
                        "Config changed since run {} started; continuing with current settings",
                        run.id
                    );
                }
                store.update_run_status(run.id, RunStatus::Running)?;
                let state = DiscoveryState::load(&store, run.id)?;
                tracing::info!(
                    "Loaded {} visited nodes, {} basis entries, {} queued",
                    state.visited_count(),
                    state.basis_len(),
                    state.frontier_len()
                );
                (run.id, state)
            }
            None => {
                let run_id = store.create_run(config_hash, settings.pagination_limit)?;
                tracing::info!("Starting discovery run {}", run_id);
                (run_id, DiscoveryState::new())
            }
        };

        Ok(Self {
            store,
            settings,
            store_context,
            run_id,
            state,
            stats: SolverStats::default(),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn state(&self) -> &DiscoveryState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Flag that stops the loop after the in-flight probe
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Queues department roots; roots already visited are ignored
    pub fn seed(&mut self, roots: &[CategoryNode]) -> Result<(), SweepError> {
        let mut queued = 0;
        for root in roots {
            let mut root = root.clone();
            root.parent_id = None;
            root.children.clear();
            root.item_count = None;
            root.status = NodeStatus::Unvisited;
            if self.state.enqueue(root) {
                queued += 1;
            }
        }

        tracing::info!("Seeded frontier with {} root(s)", queued);
        self.state.flush(&mut self.store, self.run_id)?;
        Ok(())
    }

    /// Runs the discovery loop until the frontier is empty or a stop is requested
    pub async fn discover(&mut self, probe: &dyn CategoryProbe) -> Result<DiscoveryOutcome, SweepError> {
        let start_time = Instant::now();
        let mut since_flush: u32 = 0;
        let mut complete = true;

        loop {
            if self.stop.load(Ordering::SeqCst) {
                tracing::info!("Stop requested, interrupting discovery run {}", self.run_id);
                complete = false;
                break;
            }

            let id = match self.state.next_unvisited() {
                Some(id) => id,
                None => {
                    tracing::info!("Frontier is empty, discovery complete");
                    break;
                }
            };

            let url = match self.state.node(&id) {
                Some(node) => node.url.clone(),
                None => continue,
            };
            self.state.mark_visited(&id);

            let accepted = self.process_node(&id, &url, probe).await;
            self.stats.probes += 1;
            since_flush += 1;

            if accepted || since_flush >= self.settings.persist_interval {
                self.state.flush(&mut self.store, self.run_id)?;
                since_flush = 0;
            }

            if self.stats.probes % 10 == 0 {
                let rate = self.stats.probes as f64 / start_time.elapsed().as_secs_f64().max(0.001);
                tracing::info!(
                    "Progress: {} probed, {} basis, {} in frontier, {:.2} probes/sec",
                    self.state.visited_count(),
                    self.state.basis_len(),
                    self.state.frontier_len(),
                    rate
                );
            }
        }

        self.state.flush(&mut self.store, self.run_id)?;
        if complete {
            self.store.complete_run(self.run_id)?;
        } else {
            self.store
                .update_run_status(self.run_id, RunStatus::Interrupted)?;
        }

        tracing::info!(
            "Discovery session finished: {} probes, {} basis entries ({} fallback) in {:?}",
            self.stats.probes,
            self.state.basis_len(),
            self.stats.fallback,
            start_time.elapsed()
        );

        Ok(DiscoveryOutcome {
            run_id: self.run_id,
            basis: self.state.basis(),
            complete,
            stats: self.stats,
        })
    }

    /// Probes and classifies one node
    ///
    /// Returns true if the node was added to the basis.
    async fn process_node(&mut self, id: &str, url: &str, probe: &dyn CategoryProbe) -> bool {
        let context = self.store_context.clone();
        let result = with_retry(&self.settings.retry, || probe.probe(url, &context)).await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    "Probe of {} failed after retries ({}); keeping it as fallback",
                    url,
                    e
                );
                self.stats.probe_failures += 1;
                if e.is_blocked() {
                    self.stats.blocked += 1;
                }
                self.stats.fallback += 1;
                self.state
                    .classify(id, NodeStatus::Fallback, None, false, Vec::new());
                return true;
            }
        };

        let children = self.child_nodes(id, &response);
        let status = classify(
            response.count,
            !children.is_empty(),
            self.settings.pagination_limit,
        );
        let child_ids: Vec<String> = children.iter().map(|child| child.id.clone()).collect();

        tracing::debug!(
            "Classified {} as {} (count={}, children={})",
            url,
            status,
            response.count,
            child_ids.len()
        );

        match status {
            NodeStatus::Hub => self.stats.hubs += 1,
            NodeStatus::Basis => self.stats.basis += 1,
            NodeStatus::Overflow => self.stats.overflow += 1,
            NodeStatus::Empty => self.stats.empty += 1,
            NodeStatus::Fallback => {
                self.stats.fallback += 1;
                tracing::warn!(
                    "{} lists {} items (limit {}) and has no child categories; kept as fallback",
                    url,
                    response.count,
                    self.settings.pagination_limit
                );
            }
            NodeStatus::Unvisited => {}
        }

        self.state.classify(
            id,
            status,
            Some(response.count),
            response.is_listing,
            child_ids,
        );

        if matches!(status, NodeStatus::Hub | NodeStatus::Overflow) {
            for child in children {
                self.state.enqueue(child);
            }
        }

        status.in_basis()
    }

    /// Canonicalizes child links into nodes, deduplicated by id
    fn child_nodes(&self, parent_id: &str, response: &ProbeResponse) -> Vec<CategoryNode> {
        let mut seen = HashSet::new();
        let mut children = Vec::new();

        for link in &response.child_urls {
            let child = match canonicalize_url(link).and_then(|url| CategoryNode::from_canonical(&url)) {
                Ok(child) => child,
                Err(e) => {
                    tracing::debug!("Ignoring child link {}: {}", link, e);
                    continue;
                }
            };

            if child.id == parent_id || !seen.insert(child.id.clone()) {
                continue;
            }
            children.push(child);
        }

        children
    }
}

/// Runs a complete discovery over `roots` against an in-memory store
///
/// # Example
///
/// ```no_run
/// use catalog_sweep::category::CategoryNode;
/// use catalog_sweep::config::ProbeConfig;
/// use catalog_sweep::discovery::discover;
/// use catalog_sweep::probe::HttpCategoryProbe;
///
/// # async fn example(config: ProbeConfig) -> Result<(), Box<dyn std::error::Error>> {
/// let probe = HttpCategoryProbe::new(&config)?;
/// let roots = vec![CategoryNode::from_url("https://shop.example.com/c/grocery/1000")?];
/// let basis = discover(&roots, 2000, &probe).await?;
/// # Ok(())
/// # }
/// ```
pub async fn discover(
    roots: &[CategoryNode],
    limit: u64,
    probe: &dyn CategoryProbe,
) -> Result<Vec<CategoryNode>, SweepError> {
    let store = SqliteStorage::open_in_memory()?;
    let mut solver = CoverageSolver::new(
        store,
        SolverSettings::new(limit),
        StoreContext::default(),
        "",
        true,
    )?;
    solver.seed(roots)?;
    Ok(solver.discover(probe).await?.basis)
}
