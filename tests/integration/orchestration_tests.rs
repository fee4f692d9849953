//! Integration tests for store orchestration
//!
//! Worker and supervisor runs use the real binary against a wiremock
//! catalog of three listing categories.

use catalog_sweep::checkpoint::{
    completion_marker, last_completed, resolve_start_index, CheckpointStore, RecoveryPolicy,
    ResumeSource,
};
use catalog_sweep::supervisor::StatusSnapshot;
use catalog_sweep::worker::{Heartbeat, ItemRecord};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CATEGORIES: [&str; 3] = ["/c/snacks/2001", "/c/drinks/2002", "/c/bakery/2003"];
const ITEMS_PER_CATEGORY: usize = 2;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.path("checkpoints"))
    }

    fn output(&self, store: &str) -> Vec<ItemRecord> {
        let path = self.path("output").join(format!("{}.jsonl", store));
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn log(&self, store: &str) -> PathBuf {
        self.path("logs").join(format!("{}.log", store))
    }
}

fn listing_page(category: &str) -> String {
    let tiles: String = (1..=ITEMS_PER_CATEGORY)
        .map(|i| {
            format!(
                r#"<a class="product-tile" href="/p{}/{}">Item {}</a>"#,
                category, i, i
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", tiles)
}

async fn mount_catalog(server: &MockServer) {
    for category in CATEGORIES {
        Mock::given(method("GET"))
            .and(path(category))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(category)))
            .mount(server)
            .await;
    }
}

/// Writes a config and basis file for `stores` against `server`
fn workspace(server: &MockServer, stores: &[&str]) -> Workspace {
    let dir = TempDir::new().unwrap();
    let root = dir.path().display().to_string();

    let basis: String = CATEGORIES
        .iter()
        .map(|category| format!("{}{}\n", server.uri(), category))
        .collect();
    std::fs::write(dir.path().join("basis.txt"), basis).unwrap();

    let stores = stores
        .iter()
        .map(|store| format!("\"{}\"", store))
        .collect::<Vec<_>>()
        .join(", ");
    let config = format!(
        r#"
stores = [{stores}]

[discovery]
pagination-limit = 2000
max-probe-retries = 0
database-path = "{root}/discovery.db"
basis-path = "{root}/basis.txt"

[probe]
count-selector = ".result-count"
child-link-selector = "nav.categories a"
item-selector = "a.product-tile"

[orchestrator]
checkpoint-dir = "{root}/checkpoints"
output-dir = "{root}/output"
log-dir = "{root}/logs"
status-path = "{root}/status.json"
concurrency-limit = 2
poll-interval-secs = 1
heartbeat-interval-secs = 1
max-restarts = 2
restart-backoff-ms = 50
grace-period-secs = 2

[[seeds]]
url = "{uri}/c/grocery/1000"
"#,
        stores = stores,
        root = root,
        uri = server.uri(),
    );
    let config_path = dir.path().join("sweep.toml");
    std::fs::write(&config_path, config).unwrap();

    Workspace {
        dir,
        config: config_path,
    }
}

async fn run_cli(config: &Path, args: &[&str]) -> Output {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_catalog-sweep"))
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .await
        .unwrap()
}

fn heartbeats(output: &Output) -> Vec<Heartbeat> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(Heartbeat::parse_line)
        .collect()
}

fn categories_of(records: &[ItemRecord]) -> Vec<String> {
    let mut seen = Vec::new();
    for record in records {
        if !seen.contains(&record.category_url) {
            seen.push(record.category_url.clone());
        }
    }
    seen
}

#[tokio::test]
async fn test_worker_stops_at_max_categories_and_resumes() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let ws = workspace(&server, &["1001"]);

    let first = run_cli(&ws.config, &["worker", "--store", "1001", "--max-categories", "1"]).await;
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    assert_eq!(
        ws.checkpoints().read("1001").unwrap().unwrap().category_index,
        1
    );

    let beats = heartbeats(&first);
    let last = beats.last().unwrap();
    assert!(last.finished);
    assert!(last.completed);
    assert_eq!(last.categories_completed, 1);
    assert_eq!(last.items_total, ITEMS_PER_CATEGORY as u64);

    let second = run_cli(&ws.config, &["worker", "--store", "1001"]).await;
    assert!(second.status.success(), "{}", String::from_utf8_lossy(&second.stderr));
    assert_eq!(
        ws.checkpoints().read("1001").unwrap().unwrap().category_index,
        3
    );

    // the second session starts at index 1 and never repeats index 0
    let records = ws.output("1001");
    assert_eq!(records.len(), CATEGORIES.len() * ITEMS_PER_CATEGORY);
    assert_eq!(categories_of(&records).len(), CATEGORIES.len());
    assert!(records.iter().all(|record| record.store_id == "1001"));

    let log = std::fs::read_to_string(ws.log("1001")).unwrap();
    assert!(log.contains(&completion_marker(0, 3)));
    assert!(log.contains(&completion_marker(2, 3)));
}

/// Completion markers in a worker log, in the order they were written
fn logged_markers(log: &Path) -> Vec<usize> {
    std::fs::read_to_string(log)
        .unwrap()
        .lines()
        .filter_map(|line| last_completed(&[line.to_string()]))
        .map(|(index, _)| index)
        .collect()
}

#[tokio::test]
async fn test_killed_worker_resumes_after_last_checkpoint() {
    let server = MockServer::start().await;

    // hold the first request for category 1 so the worker can be killed mid-category
    Mock::given(method("GET"))
        .and(path(CATEGORIES[1]))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(CATEGORIES[1]))
                .set_delay(Duration::from_secs(60)),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_catalog(&server).await;
    let ws = workspace(&server, &["1001"]);

    let mut child = tokio::process::Command::new(env!("CARGO_BIN_EXE_catalog-sweep"))
        .arg("--config")
        .arg(&ws.config)
        .args(["worker", "--store", "1001"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let record = ws.checkpoints().read("1001").unwrap();
        let marked = ws.log("1001").exists() && logged_markers(&ws.log("1001")) == vec![0];
        if record.map(|r| r.category_index) == Some(1) && marked {
            break;
        }
        assert!(Instant::now() < deadline, "category 0 was never checkpointed");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // SIGKILL, no chance to clean up
    child.kill().await.unwrap();
    assert_eq!(ws.checkpoints().read("1001").unwrap().unwrap().category_index, 1);
    assert_eq!(logged_markers(&ws.log("1001")), vec![0]);

    let restarted = run_cli(&ws.config, &["worker", "--store", "1001"]).await;
    assert!(restarted.status.success(), "{}", String::from_utf8_lossy(&restarted.stderr));

    let beats = heartbeats(&restarted);
    assert_eq!(beats.first().unwrap().category_index, 1);
    assert!(beats.last().unwrap().completed);

    // the relaunch picks up at index 1 and never repeats index 0
    assert_eq!(logged_markers(&ws.log("1001")), vec![0, 1, 2]);
    assert_eq!(ws.checkpoints().read("1001").unwrap().unwrap().category_index, 3);

    let records = ws.output("1001");
    assert_eq!(records.len(), CATEGORIES.len() * ITEMS_PER_CATEGORY);
    assert_eq!(categories_of(&records).len(), CATEGORIES.len());
}

#[tokio::test]
async fn test_worker_recovers_start_index_from_log() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let ws = workspace(&server, &["1001"]);

    // no checkpoint; the log says index 0 finished
    std::fs::create_dir_all(ws.path("logs")).unwrap();
    std::fs::write(
        ws.log("1001"),
        format!("2026-01-05T10:00:00Z  INFO {}\n", completion_marker(0, 3)),
    )
    .unwrap();

    let output = run_cli(&ws.config, &["worker", "--store", "1001"]).await;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let categories = categories_of(&ws.output("1001"));
    assert_eq!(categories.len(), 2);
    assert!(categories.iter().all(|url| !url.ends_with(CATEGORIES[0])));
}

#[tokio::test]
async fn test_recovery_scenario_without_checkpoint() {
    let dir = TempDir::new().unwrap();
    let checkpoints = CheckpointStore::new(dir.path().join("checkpoints"));
    checkpoints.write("1001", 2).unwrap();
    std::fs::remove_file(checkpoints.path("1001")).unwrap();

    let log = dir.path().join("1001.log");
    std::fs::write(
        &log,
        format!(
            "INFO starting\nINFO {}\nINFO {}\nWARN listing page timed out\n",
            completion_marker(3, 10),
            completion_marker(4, 10)
        ),
    )
    .unwrap();

    let resume =
        resolve_start_index(&checkpoints, "1001", &log, RecoveryPolicy::default(), None).unwrap();
    assert_eq!(resume.index, 5);
    assert_eq!(resume.source, ResumeSource::LogRecovery);
}

#[tokio::test]
async fn test_supervised_run_restarts_crashed_worker_from_checkpoint() {
    let server = MockServer::start().await;

    // store 1001 fails once on its second category, after index 1 is checkpointed
    Mock::given(method("GET"))
        .and(path(CATEGORIES[1]))
        .and(query_param("store", "1001"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_catalog(&server).await;
    let ws = workspace(&server, &["1001", "1002"]);

    let output = run_cli(&ws.config, &["run"]).await;
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    for store in ["1001", "1002"] {
        let records = ws.output(store);
        let categories: HashSet<String> = categories_of(&records).into_iter().collect();
        assert_eq!(categories.len(), CATEGORIES.len(), "store {}", store);
        assert_eq!(records.len(), CATEGORIES.len() * ITEMS_PER_CATEGORY, "store {}", store);
        assert_eq!(ws.checkpoints().read(store).unwrap().unwrap().category_index, 3);
    }

    let snapshot = StatusSnapshot::read(&ws.path("status.json")).unwrap();
    assert_eq!(snapshot.workers_failed, 1);
    assert_eq!(snapshot.workers_launched, 3);
    assert_eq!(snapshot.total_items, (2 * CATEGORIES.len() * ITEMS_PER_CATEGORY) as u64);

    let crashed = snapshot
        .workers
        .iter()
        .find(|worker| worker.store_id == "1001")
        .unwrap();
    assert_eq!(crashed.restarts, 1);
    assert_eq!(crashed.phase, "completed");
}

#[tokio::test]
async fn test_run_exits_nonzero_when_store_is_terminated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CATEGORIES[0]))
        .and(query_param("store", "1001"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_catalog(&server).await;
    let ws = workspace(&server, &["1001"]);

    let output = run_cli(&ws.config, &["run"]).await;
    assert!(!output.status.success());

    let snapshot = StatusSnapshot::read(&ws.path("status.json")).unwrap();
    // first launch plus max-restarts relaunches
    assert_eq!(snapshot.workers_launched, 3);
    assert_eq!(snapshot.workers[0].phase, "terminated");
    assert!(ws.output("1001").is_empty());
}

#[tokio::test]
async fn test_checkpoint_reset_command() {
    let server = MockServer::start().await;
    let ws = workspace(&server, &["1001"]);
    ws.checkpoints().write("1001", 3).unwrap();
    std::fs::create_dir_all(ws.path("logs")).unwrap();
    std::fs::write(
        ws.log("1001"),
        format!("2026-01-05T10:00:00Z  INFO {}\n", completion_marker(2, 3)),
    )
    .unwrap();

    let output = run_cli(&ws.config, &["checkpoint", "reset", "--store", "1001"]).await;
    assert!(output.status.success());
    assert!(ws.checkpoints().read("1001").unwrap().is_none());

    // the old run's completion marker no longer counts
    let resume = resolve_start_index(
        &ws.checkpoints(),
        "1001",
        &ws.log("1001"),
        RecoveryPolicy::default(),
        None,
    )
    .unwrap();
    assert_eq!(resume.index, 0);
    assert_eq!(resume.source, ResumeSource::Default);
}
