//! Catalog-Sweep main entry point
//!
//! Command-line interface for category discovery and store orchestration.

use anyhow::Context;
use catalog_sweep::category::{build_tree, prune_basis, CategoryNode};
use catalog_sweep::checkpoint::{reset_progress, CheckpointStore};
use catalog_sweep::config::{load_config_with_hash, Config};
use catalog_sweep::discovery::{classify, CoverageSolver, SolverSettings};
use catalog_sweep::output::{
    export_hierarchy, load_statistics, print_statistics, read_basis_file, write_basis_file,
};
use catalog_sweep::probe::{CategoryProbe, HttpCategoryProbe, StoreContext};
use catalog_sweep::storage::SqliteStorage;
use catalog_sweep::supervisor::{
    print_snapshot, ProcessLauncher, StatusSnapshot, Supervisor, SupervisorSettings,
};
use catalog_sweep::worker::{log_file, run_worker_process, RunConfig, WorkerPaths};
use clap::{Args, Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Catalog-Sweep: category coverage discovery and resumable store scraping
///
/// `discover` finds a set of category listings that covers the catalog while
/// staying under the pagination limit. `run` scrapes that basis list for
/// every store in parallel worker processes that survive crashes.
#[derive(Parser, Debug)]
#[command(name = "catalog-sweep")]
#[command(version)]
#[command(about = "Category coverage discovery and resumable store orchestration", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true, default_value = "sweep.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover the basis set of category listings
    Discover {
        /// Start a fresh run, ignoring any interrupted one
        #[arg(long)]
        fresh: bool,

        /// Show statistics from the database and exit
        #[arg(long, conflicts_with_all = ["fresh", "dry_run"])]
        stats: bool,

        /// Validate config and probe the seeds only
        #[arg(long, conflicts_with = "stats")]
        dry_run: bool,
    },

    /// Remove redundant parents from an existing basis file
    Prune {
        /// Basis file to prune in place (defaults to the configured one)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Run store workers over the basis list under supervision
    Run(RunArgs),

    /// Run a single store worker (spawned by `run`)
    #[command(hide = true)]
    Worker(WorkerArgs),

    /// Show the supervisor status snapshot
    Status {
        /// Keep refreshing until interrupted
        #[arg(long)]
        watch: bool,

        /// Refresh interval in seconds for --watch
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },

    /// Manage store checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Store to run; repeat for several (defaults to every configured store)
    #[arg(long = "store")]
    stores: Vec<String>,

    #[command(flatten)]
    paths: PathArgs,

    /// Category index every store starts from on its first launch
    #[arg(long)]
    start_index: Option<usize>,

    /// Maximum categories per worker session
    #[arg(long)]
    max_categories: Option<usize>,
}

#[derive(Args, Debug)]
struct WorkerArgs {
    #[arg(long)]
    store: String,

    #[command(flatten)]
    paths: PathArgs,

    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[arg(long)]
    start_index: Option<usize>,

    #[arg(long)]
    max_categories: Option<usize>,

    /// Treat end of stdin as a stop request
    #[arg(long)]
    supervised: bool,
}

#[derive(Args, Debug)]
struct PathArgs {
    /// Basis list file (defaults to the configured one)
    #[arg(long)]
    basis: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum CheckpointAction {
    /// Delete a store's checkpoint and mark its log so it starts over
    Reset {
        #[arg(long)]
        store: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // workers set up logging to their own log file
    if !matches!(cli.command, Command::Worker(_)) {
        setup_logging(cli.verbose, cli.quiet);
    }

    let result = dispatch(&cli, &cli.command).await;

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: &Cli, command: &Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Status { watch, interval } => {
            let config = load(&cli.config)?.0;
            handle_status(&config, *watch, *interval).await?;
        }
        Command::Checkpoint {
            action: CheckpointAction::Reset { store },
        } => {
            let config = load(&cli.config)?.0;
            handle_checkpoint_reset(&config, store)?;
        }
        Command::Discover {
            fresh,
            stats,
            dry_run,
        } => {
            let (config, hash) = load(&cli.config)?;
            if *stats {
                handle_stats(&config)?;
            } else if *dry_run {
                handle_dry_run(&config).await?;
            } else {
                handle_discover(&config, &hash, *fresh).await?;
            }
        }
        Command::Prune { input } => {
            let config = load(&cli.config)?.0;
            handle_prune(&config, input.as_deref())?;
        }
        Command::Run(args) => {
            let config = load(&cli.config)?.0;
            return handle_run(cli, &config, args).await;
        }
        Command::Worker(args) => {
            return handle_worker(cli, args).await;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn load(path: &Path) -> anyhow::Result<(Config, String)> {
    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::debug!("Configuration loaded (hash: {})", hash);
    Ok((config, hash))
}

fn verbosity_filter(verbose: u8) -> EnvFilter {
    match verbose {
        0 => EnvFilter::new("catalog_sweep=info,warn"),
        1 => EnvFilter::new("catalog_sweep=debug,info"),
        2 => EnvFilter::new("catalog_sweep=trace,debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        verbosity_filter(verbose)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Worker logs go to the store's log file; completion markers need info level
fn setup_worker_logging(verbose: u8, log_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open worker log {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(verbosity_filter(verbose))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(())
}

/// Handles `discover`: runs the coverage solver and writes basis + hierarchy
async fn handle_discover(config: &Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    let discovery = &config.discovery;
    let roots = seed_nodes(config)?;
    tracing::info!(
        "Discovering with {} seed(s), pagination limit {}",
        roots.len(),
        discovery.pagination_limit
    );

    let storage = SqliteStorage::new(Path::new(&discovery.database_path))?;
    let probe = HttpCategoryProbe::new(&config.probe)?;
    let mut solver = CoverageSolver::new(
        storage,
        SolverSettings::from_config(discovery),
        StoreContext::new(discovery.store.clone()),
        config_hash,
        fresh,
    )?;
    solver.seed(&roots)?;

    let stop = solver.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current probe");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let outcome = solver.discover(&probe).await?;
    if !outcome.complete {
        tracing::warn!(
            "Discovery of run {} interrupted with {} basis entries so far; rerun to resume",
            outcome.run_id,
            outcome.basis.len()
        );
        return Ok(());
    }

    let pruned = prune_basis(&outcome.basis, discovery.redundancy_rule);
    tracing::info!(
        "Pruned basis from {} to {} entries",
        outcome.basis.len(),
        pruned.len()
    );
    write_basis_file(
        Path::new(&discovery.basis_path),
        &pruned,
        &format!("discovery run {}", outcome.run_id),
    )?;

    let nodes: Vec<CategoryNode> = solver.state().nodes().cloned().collect();
    export_hierarchy(&build_tree(&nodes), Path::new(&discovery.hierarchy_path))?;

    let stats = outcome.stats;
    println!(
        "Discovery finished: {} probes, {} basis, {} fallback, {} hubs, {} overflow, {} empty",
        stats.probes, stats.basis, stats.fallback, stats.hubs, stats.overflow, stats.empty
    );
    println!("Basis list: {} ({} entries)", discovery.basis_path, pruned.len());
    Ok(())
}

fn seed_nodes(config: &Config) -> anyhow::Result<Vec<CategoryNode>> {
    config
        .seeds
        .iter()
        .map(|seed| {
            CategoryNode::from_url(&seed.url)
                .with_context(|| format!("Invalid seed URL {}", seed.url))
        })
        .collect()
}

/// Handles `discover --stats`
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.discovery.database_path);
    let storage = SqliteStorage::new(Path::new(&config.discovery.database_path))?;
    let stats = load_statistics(&storage, None)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles `discover --dry-run`: probes each seed once and prints its class
async fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Catalog-Sweep Dry Run ===\n");
    println!("Pagination limit: {}", config.discovery.pagination_limit);
    println!(
        "Discovery store: {}",
        config.discovery.store.as_deref().unwrap_or("(none)")
    );
    println!("Stores configured: {}", config.stores.len());
    println!("\nSeeds ({}):", config.seeds.len());

    let probe = HttpCategoryProbe::new(&config.probe)?;
    let store = StoreContext::new(config.discovery.store.clone());
    for (seed, node) in config.seeds.iter().zip(seed_nodes(config)?) {
        let name = seed.name.as_deref().unwrap_or(&node.id);
        match probe.probe(&node.url, &store).await {
            Ok(response) => {
                let status = classify(
                    response.count,
                    !response.child_urls.is_empty(),
                    config.discovery.pagination_limit,
                );
                println!(
                    "  - {} {}: {} items, {} children -> {}",
                    name,
                    node.url,
                    response.count,
                    response.child_urls.len(),
                    status
                );
            }
            Err(e) => println!("  - {} {}: probe failed: {}", name, node.url, e),
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles `prune`: rewrites a basis file without redundant parents
fn handle_prune(config: &Config, input: Option<&Path>) -> anyhow::Result<()> {
    let path = input.unwrap_or_else(|| Path::new(&config.discovery.basis_path));
    let urls = read_basis_file(path)
        .with_context(|| format!("Failed to read basis file {}", path.display()))?;

    let mut nodes = Vec::with_capacity(urls.len());
    for url in &urls {
        match CategoryNode::from_url(url) {
            Ok(node) => nodes.push(node),
            Err(e) => tracing::warn!("Skipping basis entry {}: {}", url, e),
        }
    }

    let pruned = prune_basis(&nodes, config.discovery.redundancy_rule);
    write_basis_file(path, &pruned, &format!("prune of {}", path.display()))?;
    println!(
        "Pruned {}: {} -> {} entries",
        path.display(),
        urls.len(),
        pruned.len()
    );
    Ok(())
}

fn worker_paths(config: &Config, args: &PathArgs, log_dir: Option<&Path>) -> WorkerPaths {
    let orchestrator = &config.orchestrator;
    WorkerPaths {
        basis: args
            .basis
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.discovery.basis_path)),
        output_dir: args
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&orchestrator.output_dir)),
        checkpoint_dir: args
            .checkpoint_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&orchestrator.checkpoint_dir)),
        log_dir: log_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&orchestrator.log_dir)),
    }
}

/// Handles `run`: supervises one worker process per store
async fn handle_run(cli: &Cli, config: &Config, args: &RunArgs) -> anyhow::Result<ExitCode> {
    let stores = if args.stores.is_empty() {
        config.stores.clone()
    } else {
        args.stores.clone()
    };

    let paths = worker_paths(config, &args.paths, None);
    let basis = read_basis_file(&paths.basis)
        .with_context(|| format!("Failed to read basis file {}", paths.basis.display()))?;
    tracing::info!(
        "Running {} store(s) over {} categories from {}",
        stores.len(),
        basis.len(),
        paths.basis.display()
    );

    let mut global_args = Vec::new();
    if cli.verbose > 0 {
        global_args.push(format!("-{}", "v".repeat(cli.verbose as usize)));
    }

    let launcher = ProcessLauncher {
        program: std::env::current_exe().context("Failed to locate own executable")?,
        config_path: cli.config.clone(),
        paths,
        max_categories: args.max_categories,
        grace_period: Duration::from_secs(config.orchestrator.grace_period_secs),
        global_args,
    };

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping workers");
        }
    };

    let outcome = Supervisor::new(launcher, SupervisorSettings::from_config(&config.orchestrator))
        .with_start_index(args.start_index)
        .run(&stores, shutdown)
        .await?;

    print_snapshot(&outcome.snapshot);
    println!();
    println!(
        "Completed: {}  Terminated: {}  Stopped: {}",
        outcome.completed.len(),
        outcome.terminated.len(),
        outcome.stopped.len()
    );
    for store in &outcome.terminated {
        println!("  terminated: {}", store);
    }

    if outcome.terminated.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Handles the hidden `worker` subcommand
async fn handle_worker(cli: &Cli, args: &WorkerArgs) -> anyhow::Result<ExitCode> {
    let (config, _) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let paths = worker_paths(&config, &args.paths, args.log_dir.as_deref());
    setup_worker_logging(cli.verbose, &log_file(&paths.log_dir, &args.store))?;

    let run = RunConfig {
        store_id: args.store.clone(),
        start_index: args.start_index,
        max_categories: args.max_categories,
    };

    let summary = run_worker_process(&config, run, &paths, args.supervised)
        .await
        .with_context(|| format!("Worker for {} failed", args.store))?;

    tracing::info!(
        "Worker for {} finished: {} categories, {} items, next index {}",
        summary.store_id,
        summary.processed.len(),
        summary.items_total,
        summary.next_index
    );
    Ok(ExitCode::SUCCESS)
}

/// Handles `status`: prints the snapshot once or until interrupted
async fn handle_status(config: &Config, watch: bool, interval: u64) -> anyhow::Result<()> {
    let path = PathBuf::from(&config.orchestrator.status_path);

    if !watch {
        let snapshot = StatusSnapshot::read(&path)
            .with_context(|| format!("No status snapshot at {}", path.display()))?;
        print_snapshot(&snapshot);
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // clear screen
                print!("\x1B[2J\x1B[H");
                match StatusSnapshot::read(&path) {
                    Ok(snapshot) => print_snapshot(&snapshot),
                    Err(e) => println!("Waiting for {}: {}", path.display(), e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// Handles `checkpoint reset`
fn handle_checkpoint_reset(config: &Config, store: &str) -> anyhow::Result<()> {
    let checkpoints = CheckpointStore::new(&config.orchestrator.checkpoint_dir);
    let log_path = log_file(Path::new(&config.orchestrator.log_dir), store);
    if reset_progress(&checkpoints, store, &log_path)? {
        println!("Reset progress for {}", store);
    } else {
        println!("No progress recorded for {}", store);
    }
    Ok(())
}
