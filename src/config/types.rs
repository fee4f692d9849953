use crate::category::RedundancyRule;
use serde::Deserialize;

/// Main configuration structure for Catalog-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub probe: ProbeConfig,
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub seeds: Vec<SeedEntry>,
    #[serde(default)]
    pub stores: Vec<String>,
}

/// Category discovery configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscoveryConfig {
    /// Maximum item count a single listing can paginate through
    pub pagination_limit: u64,

    /// Store context used while probing category pages
    #[serde(default)]
    pub store: Option<String>,

    /// Retries for blocked/timed out probes before a node falls back
    #[serde(default = "default_max_probe_retries")]
    pub max_probe_retries: u32,

    /// First backoff delay (milliseconds)
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Upper bound on a single backoff delay (milliseconds)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Number of probes between periodic state flushes
    #[serde(default = "default_persist_interval")]
    pub persist_interval: u32,

    /// Path to the SQLite discovery database
    pub database_path: String,

    /// Path to the basis list file (one URL per line)
    pub basis_path: String,

    /// Path to the hierarchy audit export
    #[serde(default = "default_hierarchy_path")]
    pub hierarchy_path: String,

    /// Policy deciding when a parent basis entry is redundant
    #[serde(default)]
    pub redundancy_rule: RedundancyRule,
}

/// HTTP probe and listing scraper configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProbeConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Selector whose text carries the category item count
    pub count_selector: String,

    /// Selector for links to child categories
    pub child_link_selector: String,

    /// Body substrings that mean access was denied
    #[serde(default)]
    pub blocked_markers: Vec<String>,

    /// Query parameter carrying the store id
    #[serde(default = "default_store_param")]
    pub store_param: String,

    /// Selector for product tiles on a listing page
    pub item_selector: String,

    /// Selector for the "next page" link of a listing
    #[serde(default)]
    pub next_page_selector: Option<String>,

    /// Maximum listing pages followed per category
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

/// Worker orchestration configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrchestratorConfig {
    pub checkpoint_dir: String,
    pub output_dir: String,
    pub log_dir: String,
    pub status_path: String,

    /// Maximum number of worker processes alive at once
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// How often workers emit a heartbeat while idle inside a category
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Window over which a near-zero item rate marks a worker stalled
    #[serde(default = "default_stall_window_secs")]
    pub stall_window_secs: u64,

    /// Items per minute below which a worker counts as idle
    #[serde(default = "default_stall_rate_threshold")]
    pub stall_rate_threshold: f64,

    /// Consecutive failed restarts before a store is terminated
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Base delay before a crashed worker is relaunched; doubles per failure
    #[serde(default = "default_restart_backoff_ms")]
    pub restart_backoff_ms: u64,

    /// Time a worker gets to stop cooperatively before it is killed
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Checkpoint age (relative to the worker log) that triggers log recovery
    #[serde(default = "default_checkpoint_staleness_secs")]
    pub checkpoint_staleness_secs: u64,

    /// Lines read from the end of a worker log during recovery
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
}

/// Department root used to seed discovery
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    pub url: String,

    /// Human-readable department name
    #[serde(default)]
    pub name: Option<String>,
}

fn default_max_probe_retries() -> u32 {
    3
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_persist_interval() -> u32 {
    25
}

fn default_hierarchy_path() -> String {
    "hierarchy.json".to_string()
}

fn default_user_agent() -> String {
    format!("catalog-sweep/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_store_param() -> String {
    "store".to_string()
}

fn default_max_pages() -> u32 {
    50
}

fn default_concurrency_limit() -> usize {
    4
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_heartbeat_interval_secs() -> u64 {
    5
}

fn default_stall_window_secs() -> u64 {
    300
}

fn default_stall_rate_threshold() -> f64 {
    0.5
}

fn default_max_restarts() -> u32 {
    3
}

fn default_restart_backoff_ms() -> u64 {
    1_000
}

fn default_grace_period_secs() -> u64 {
    10
}

fn default_checkpoint_staleness_secs() -> u64 {
    600
}

fn default_log_tail_lines() -> usize {
    200
}
