//! Integration tests for category discovery
//!
//! These tests serve a small category tree from a wiremock server and run
//! the HTTP probe, the coverage solver and the CLI against it.

use async_trait::async_trait;
use catalog_sweep::category::{prune_basis, CategoryNode, NodeStatus, RedundancyRule};
use catalog_sweep::config::ProbeConfig;
use catalog_sweep::discovery::{discover, CoverageSolver, RetryPolicy, SolverSettings};
use catalog_sweep::probe::{CategoryProbe, HttpCategoryProbe, ProbeError, ProbeResponse, StoreContext};
use catalog_sweep::storage::{DiscoveryStore, SqliteStorage};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT: &str = "/c/grocery/1000";
const PRODUCE: &str = "/c/grocery/produce/1100";
const PANTRY: &str = "/c/grocery/pantry/1200";
const BAKING: &str = "/c/grocery/pantry/baking/1210";
const FROZEN: &str = "/c/grocery/frozen/1400";

fn probe_config() -> ProbeConfig {
    ProbeConfig {
        user_agent: "TestSweep/1.0".to_string(),
        timeout_secs: 5,
        count_selector: ".result-count".to_string(),
        child_link_selector: "nav.categories a".to_string(),
        blocked_markers: vec!["Access Denied".to_string()],
        store_param: "store".to_string(),
        item_selector: "a.product-tile".to_string(),
        next_page_selector: Some("a.next".to_string()),
        max_pages: 5,
    }
}

fn settings() -> SolverSettings {
    SolverSettings {
        pagination_limit: 2000,
        retry: RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(50)),
        persist_interval: 1,
    }
}

fn category_page(count: Option<u64>, children: &[&str]) -> String {
    let count = count
        .map(|c| format!(r#"<span class="result-count">{} results</span>"#, c))
        .unwrap_or_default();
    let links: String = children
        .iter()
        .map(|child| format!(r#"<a href="{}">child</a>"#, child))
        .collect();
    format!(
        r#"<html><body>{}<nav class="categories">{}</nav><a class="product-tile" href="/p/1">Item</a></body></html>"#,
        count, links
    )
}

async fn mount_page(server: &MockServer, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// R(5000) -> A(1200), B(hub) -> C(800), D(3000, leaf)
async fn mount_catalog(server: &MockServer) {
    mount_page(server, ROOT, category_page(Some(5000), &[PRODUCE, PANTRY, FROZEN])).await;
    mount_page(server, PRODUCE, category_page(Some(1200), &[])).await;
    mount_page(
        server,
        PANTRY,
        r#"<html><body><nav class="categories"><a href="/c/grocery/pantry/baking/1210">Baking</a></nav></body></html>"#
            .to_string(),
    )
    .await;
    mount_page(server, BAKING, category_page(Some(800), &[])).await;
    mount_page(server, FROZEN, category_page(Some(3000), &[])).await;
}

fn roots(server: &MockServer) -> Vec<CategoryNode> {
    vec![CategoryNode::from_url(&format!("{}{}", server.uri(), ROOT)).unwrap()]
}

fn ids(nodes: &[CategoryNode]) -> HashSet<String> {
    nodes.iter().map(|node| node.id.clone()).collect()
}

fn expected_basis() -> HashSet<String> {
    ["1100", "1210", "1400"].iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_http_discovery_builds_expected_basis() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let probe = HttpCategoryProbe::new(&probe_config()).unwrap();
    let mut solver = CoverageSolver::new(
        SqliteStorage::open_in_memory().unwrap(),
        settings(),
        StoreContext::default(),
        "test",
        true,
    )
    .unwrap();
    solver.seed(&roots(&server)).unwrap();

    let outcome = solver.discover(&probe).await.unwrap();
    assert!(outcome.complete);
    assert_eq!(ids(&outcome.basis), expected_basis());

    let state = solver.state();
    assert_eq!(state.node("1000").unwrap().status, NodeStatus::Overflow);
    assert_eq!(state.node("1200").unwrap().status, NodeStatus::Hub);
    assert_eq!(state.node("1400").unwrap().status, NodeStatus::Fallback);
    assert_eq!(state.node("1400").unwrap().item_count, Some(3000));

    // every basis entry is a leaf in the reconstructed hierarchy
    let pruned = prune_basis(&outcome.basis, RedundancyRule::AnyChild);
    assert_eq!(ids(&pruned), expected_basis());
}

#[tokio::test]
async fn test_store_parameter_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PRODUCE))
        .and(query_param("store", "1001"))
        .respond_with(ResponseTemplate::new(200).set_body_string(category_page(Some(40), &[])))
        .expect(1)
        .mount(&server)
        .await;

    let probe = HttpCategoryProbe::new(&probe_config()).unwrap();
    let response = probe
        .probe(
            &format!("{}{}", server.uri(), PRODUCE),
            &StoreContext::new(Some("1001".to_string())),
        )
        .await
        .unwrap();

    assert_eq!(response.count, 40);
    assert!(response.is_listing);
}

fn tiles(n: usize) -> String {
    (1..=n)
        .map(|i| format!(r#"<a class="product-tile" href="/p/{}">Item {}</a>"#, i, i))
        .collect()
}

#[tokio::test]
async fn test_paginated_listing_without_count_is_not_basis() {
    let server = MockServer::start().await;
    let body = format!(
        r#"<html><body>{}<a class="next" href="{}?page=2">Next</a><nav class="categories"><a href="{}">Produce</a></nav></body></html>"#,
        tiles(24),
        ROOT,
        PRODUCE
    );
    mount_page(&server, ROOT, body).await;
    mount_page(&server, PRODUCE, category_page(Some(40), &[])).await;

    let probe = HttpCategoryProbe::new(&probe_config()).unwrap();
    let root_url = format!("{}{}", server.uri(), ROOT);
    let result = probe.probe(&root_url, &StoreContext::default()).await;
    assert!(matches!(result, Err(ProbeError::Malformed { .. })));

    let basis = discover(&roots(&server), 2000, &probe).await.unwrap();
    assert_eq!(basis.len(), 1);
    assert_eq!(basis[0].id, "1000");
    assert_eq!(basis[0].status, NodeStatus::Fallback);
    assert_eq!(basis[0].item_count, None);
}

#[tokio::test]
async fn test_single_page_listing_without_count_uses_tiles() {
    let server = MockServer::start().await;
    let body = format!("<html><body>{}</body></html>", tiles(7));
    mount_page(&server, PRODUCE, body).await;

    let probe = HttpCategoryProbe::new(&probe_config()).unwrap();
    let response = probe
        .probe(&format!("{}{}", server.uri(), PRODUCE), &StoreContext::default())
        .await
        .unwrap();
    assert_eq!(response.count, 7);
    assert!(response.is_listing);
    assert!(response.child_urls.is_empty());
}

#[tokio::test]
async fn test_blocked_page_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    mount_page(&server, ROOT, category_page(Some(5000), &[PRODUCE])).await;
    Mock::given(method("GET"))
        .and(path(PRODUCE))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(&server, PRODUCE, category_page(Some(1200), &[])).await;

    let probe = HttpCategoryProbe::new(&probe_config()).unwrap();
    let mut solver = CoverageSolver::new(
        SqliteStorage::open_in_memory().unwrap(),
        settings(),
        StoreContext::default(),
        "test",
        true,
    )
    .unwrap();
    solver.seed(&roots(&server)).unwrap();

    let outcome = solver.discover(&probe).await.unwrap();
    let produce = solver.state().node("1100").unwrap();
    assert_eq!(produce.status, NodeStatus::Basis);
    assert_eq!(produce.item_count, Some(1200));
    assert_eq!(outcome.stats.probe_failures, 0);
}

#[tokio::test]
async fn test_persistently_blocked_page_becomes_fallback() {
    let server = MockServer::start().await;
    mount_page(&server, ROOT, category_page(Some(5000), &[PRODUCE, FROZEN])).await;
    mount_page(
        &server,
        PRODUCE,
        "<html><body>Access Denied</body></html>".to_string(),
    )
    .await;
    mount_page(&server, FROZEN, category_page(Some(300), &[])).await;

    let probe = HttpCategoryProbe::new(&probe_config()).unwrap();
    let mut solver = CoverageSolver::new(
        SqliteStorage::open_in_memory().unwrap(),
        settings(),
        StoreContext::default(),
        "test",
        true,
    )
    .unwrap();
    solver.seed(&roots(&server)).unwrap();

    let outcome = solver.discover(&probe).await.unwrap();
    assert!(outcome.complete);

    let produce = solver.state().node("1100").unwrap();
    assert_eq!(produce.status, NodeStatus::Fallback);
    assert_eq!(produce.item_count, None);
    assert_eq!(outcome.stats.blocked, 1);
    assert_eq!(outcome.stats.probe_failures, 1);

    // initial attempt plus two retries
    let produce_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == PRODUCE)
        .count();
    assert_eq!(produce_requests, 3);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PRODUCE))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let probe = HttpCategoryProbe::new(&probe_config()).unwrap();
    let url = format!("{}{}", server.uri(), PRODUCE);
    let store = StoreContext::default();
    let result =
        catalog_sweep::discovery::with_retry(&settings().retry, || probe.probe(&url, &store)).await;

    assert!(matches!(result, Err(ProbeError::Http { status: 404, .. })));
}

/// Probe that requests a stop after a fixed number of calls
struct StoppingProbe<'a> {
    inner: &'a HttpCategoryProbe,
    calls: AtomicUsize,
    stop_after: usize,
    stop: Arc<AtomicBool>,
}

#[async_trait]
impl CategoryProbe for StoppingProbe<'_> {
    async fn probe(&self, url: &str, store: &StoreContext) -> Result<ProbeResponse, ProbeError> {
        let result = self.inner.probe(url, store).await;
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.stop_after {
            self.stop.store(true, Ordering::SeqCst);
        }
        result
    }
}

#[tokio::test]
async fn test_interrupted_discovery_resumes_to_same_basis() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("discovery.db");
    let http = HttpCategoryProbe::new(&probe_config()).unwrap();

    // first session stops after two probes
    {
        let mut solver = CoverageSolver::new(
            SqliteStorage::new(&db_path).unwrap(),
            settings(),
            StoreContext::default(),
            "test",
            true,
        )
        .unwrap();
        solver.seed(&roots(&server)).unwrap();

        let probe = StoppingProbe {
            inner: &http,
            calls: AtomicUsize::new(0),
            stop_after: 2,
            stop: solver.stop_handle(),
        };
        let outcome = solver.discover(&probe).await.unwrap();
        assert!(!outcome.complete);
        assert_eq!(outcome.stats.probes, 2);
    }

    // second session picks up the interrupted run
    let mut solver = CoverageSolver::new(
        SqliteStorage::new(&db_path).unwrap(),
        settings(),
        StoreContext::default(),
        "test",
        false,
    )
    .unwrap();
    solver.seed(&roots(&server)).unwrap();
    let outcome = solver.discover(&http).await.unwrap();

    assert!(outcome.complete);
    assert_eq!(outcome.stats.probes, 3);
    assert_eq!(ids(&outcome.basis), expected_basis());

    let store = solver.into_store();
    let run = store.get_latest_run().unwrap().unwrap();
    assert_eq!(run.id, outcome.run_id);
    assert_eq!(store.load_basis(run.id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_discover_command_writes_basis_and_hierarchy() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = TempDir::new().unwrap();

    let basis_path = dir.path().join("basis.txt");
    let hierarchy_path = dir.path().join("hierarchy.json");
    let config_path = dir.path().join("sweep.toml");
    let config = format!(
        r#"
stores = ["1001"]

[discovery]
pagination-limit = 2000
max-probe-retries = 1
backoff-initial-ms = 10
database-path = "{db}"
basis-path = "{basis}"
hierarchy-path = "{hierarchy}"

[probe]
count-selector = ".result-count"
child-link-selector = "nav.categories a"
item-selector = "a.product-tile"

[orchestrator]
checkpoint-dir = "{dir}/checkpoints"
output-dir = "{dir}/output"
log-dir = "{dir}/logs"
status-path = "{dir}/status.json"

[[seeds]]
url = "{root}"
name = "Grocery"
"#,
        db = dir.path().join("discovery.db").display(),
        basis = basis_path.display(),
        hierarchy = hierarchy_path.display(),
        dir = dir.path().display(),
        root = format!("{}{}", server.uri(), ROOT),
    );
    std::fs::write(&config_path, config).unwrap();

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_catalog-sweep"))
        .arg("--config")
        .arg(&config_path)
        .arg("discover")
        .arg("--fresh")
        .output()
        .await
        .unwrap();
    assert!(
        output.status.success(),
        "discover failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let basis = catalog_sweep::output::read_basis_file(&basis_path).unwrap();
    let basis_ids: HashSet<String> = basis
        .iter()
        .map(|url| CategoryNode::from_url(url).unwrap().id)
        .collect();
    assert_eq!(basis_ids, expected_basis());

    let hierarchy: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&hierarchy_path).unwrap()).unwrap();
    let entries = hierarchy.as_array().unwrap();
    assert_eq!(entries.len(), 5);
    let baking = entries.iter().find(|entry| entry["id"] == "1210").unwrap();
    assert_eq!(baking["parentId"], "1200");
    assert_eq!(baking["status"], "basis");
}
