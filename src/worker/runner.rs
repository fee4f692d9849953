//! The per-store worker loop
//!
//! Categories are processed strictly in basis order from the start index.
//! After each category the output is flushed, the checkpoint advances to the
//! next index and the completion marker is logged, in that order.

use crate::checkpoint::{completion_marker, CheckpointStore};
use crate::discovery::RetryPolicy;
use crate::probe::{ProbeError, StoreContext};
use crate::worker::heartbeat::{Heartbeat, HeartbeatEmitter};
use crate::worker::scraper::ListingScraper;
use crate::worker::sink::{ItemRecord, OutputSink};
use crate::worker::RunConfig;
use crate::SweepError;
use chrono::Utc;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::watch;

/// How a worker session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub store_id: String,

    /// Indices processed in this session, in order
    pub processed: Vec<usize>,
    pub items_total: u64,
    pub blocked_incidents: u64,

    /// Index the next session should start from
    pub next_index: usize,

    /// False if a stop request ended the session early
    pub completed: bool,
}

/// One store's worker
pub struct Worker<'a, W> {
    run: RunConfig,
    scraper: &'a dyn ListingScraper,
    checkpoints: CheckpointStore,
    retry: RetryPolicy,
    heartbeats: HeartbeatEmitter<W>,
    heartbeat_interval: Duration,
}

impl<'a, W: AsyncWrite + Unpin> Worker<'a, W> {
    pub fn new(
        run: RunConfig,
        scraper: &'a dyn ListingScraper,
        checkpoints: CheckpointStore,
        retry: RetryPolicy,
        heartbeats: HeartbeatEmitter<W>,
    ) -> Self {
        Self {
            run,
            scraper,
            checkpoints,
            retry,
            heartbeats,
            heartbeat_interval: Duration::from_secs(5),
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(10));
        self
    }

    pub fn into_heartbeats(self) -> HeartbeatEmitter<W> {
        self.heartbeats
    }

    /// Processes `basis[start..]` (bounded by `max_categories`)
    ///
    /// A `true` on `stop` ends the session after abandoning the in-flight
    /// category; its checkpoint is left untouched. A category whose scrape
    /// fails after every retry ends the session with an error and no
    /// clean-shutdown heartbeat.
    pub async fn run(
        &mut self,
        basis: &[String],
        start: usize,
        sink: &mut dyn OutputSink,
        mut stop: watch::Receiver<bool>,
    ) -> Result<WorkerSummary, SweepError> {
        let total = basis.len();
        let range = self.run.category_range(start, total);
        let store = StoreContext::new(Some(self.run.store_id.clone()));
        let blocked = AtomicU64::new(0);

        let mut summary = WorkerSummary {
            store_id: self.run.store_id.clone(),
            processed: Vec::new(),
            items_total: 0,
            blocked_incidents: 0,
            next_index: range.start,
            completed: false,
        };

        tracing::info!(
            "Worker for {} processing categories {}..{} of {}",
            self.run.store_id,
            range.start,
            range.end,
            total
        );
        self.beat(&summary, total, &blocked, false).await?;

        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.tick().await;
        let mut stop_open = true;

        'categories: for index in range.clone() {
            if *stop.borrow() {
                break;
            }

            let url = basis[index].as_str();
            tracing::debug!("Starting category {} of {}: {}", index, total, url);

            let scraper = self.scraper;
            let retry = self.retry;
            let blocked_ref = &blocked;
            let store_ref = &store;
            let scrape = crate::discovery::with_retry(&retry, move || async move {
                let result = scraper.scrape(url, store_ref).await;
                if let Err(ProbeError::Blocked { .. }) = &result {
                    blocked_ref.fetch_add(1, Ordering::Relaxed);
                }
                result
            });
            tokio::pin!(scrape);

            let result = loop {
                tokio::select! {
                    result = &mut scrape => break result,
                    _ = ticker.tick() => {
                        self.beat(&summary, total, &blocked, false).await?;
                    }
                    changed = stop.changed(), if stop_open => {
                        match changed {
                            Ok(()) if *stop.borrow() => {
                                tracing::info!("Stop requested during category {}; abandoning it", index);
                                break 'categories;
                            }
                            Ok(()) => {}
                            Err(_) => stop_open = false,
                        }
                    }
                }
            };

            let items = result.map_err(|source| SweepError::Scrape {
                url: url.to_string(),
                source,
            })?;

            let scraped_at = Utc::now();
            for item in &items {
                sink.append(&ItemRecord {
                    store_id: self.run.store_id.clone(),
                    category_url: url.to_string(),
                    item_url: item.url.clone(),
                    title: item.title.clone(),
                    scraped_at,
                })?;
            }
            sink.flush()?;

            self.checkpoints.write(&self.run.store_id, index + 1)?;
            tracing::info!("{}", completion_marker(index, total));

            summary.processed.push(index);
            summary.items_total += items.len() as u64;
            summary.next_index = index + 1;
            self.beat(&summary, total, &blocked, false).await?;
        }

        summary.blocked_incidents = blocked.load(Ordering::Relaxed);
        summary.completed = summary.next_index >= range.end;

        if summary.completed {
            tracing::info!(
                "Worker for {} completed {} categories ({} items)",
                self.run.store_id,
                summary.processed.len(),
                summary.items_total
            );
        }

        self.beat(&summary, total, &blocked, true).await?;
        Ok(summary)
    }

    async fn beat(
        &mut self,
        summary: &WorkerSummary,
        total: usize,
        blocked: &AtomicU64,
        finished: bool,
    ) -> Result<(), SweepError> {
        self.heartbeats
            .emit(Heartbeat {
                store_id: summary.store_id.clone(),
                category_index: summary.next_index,
                categories_completed: summary.processed.len(),
                total_categories: total,
                items_total: summary.items_total,
                blocked_incidents: blocked.load(Ordering::Relaxed),
                // sampled by the emitter
                memory_mb: 0.0,
                cpu_percent: 0.0,
                finished,
                completed: finished && summary.completed,
                timestamp: Utc::now(),
            })
            .await?;
        Ok(())
    }
}

impl RunConfig {
    /// Indices this run covers for a basis of `total` entries
    pub fn category_range(&self, start: usize, total: usize) -> Range<usize> {
        let start = start.min(total);
        let end = match self.max_categories {
            Some(max) => start.saturating_add(max).min(total),
            None => total,
        };
        start..end
    }
}
