//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator wires the query space, governor, pagination workers and
//! checkpoint manager together:
//! - A producer walks the query space (resuming after the checkpoint) and
//!   dispatches targets to at most `max-concurrent-targets` workers
//! - Workers paginate their target and send records, skips and a final
//!   `TargetDone` over one channel
//! - The result loop is the single writer: it buffers records, flushes
//!   batches and advances the checkpoint
//!
//! Cancellation (Ctrl-C or the run timeout) stops new dispatches, lets
//! in-flight work wind down, then performs the final flush.

use super::fetcher::{Fetcher, ReqwestFetcher};
use super::governor::{Governor, GovernorStats};
use super::pagination::{ArchiveSpec, CrawlContext, PaginationController, TargetOutcome};
use crate::checkpoint::CheckpointManager;
use crate::config::Config;
use crate::extract::{CssSelector, Extractor, Record, Selector, SkipReason};
use crate::query::{CrawlTarget, QuerySpace, Targets};
use crate::storage::{RunStatus, Sink};
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Capacity of the worker-to-writer channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Records between progress log lines
const PROGRESS_EVERY: u64 = 100;

/// Messages from workers to the result loop
#[derive(Debug)]
pub enum CrawlEvent {
    /// A validated record
    Record(Record),
    /// An item that produced no record
    Skipped { url: String, reason: SkipReason },
    /// A target finished; all of its records and skips were sent before this
    TargetDone {
        seq: u64,
        target: CrawlTarget,
        outcome: TargetOutcome,
    },
}

/// Summary of a finished run
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    pub targets_exhausted: u64,
    pub targets_failed: u64,
    pub targets_cancelled: u64,
    pub records_accepted: u64,
    pub records_flushed: u64,
    /// Skipped items by [`SkipReason::kind`]
    pub skipped: BTreeMap<String, u64>,
    /// Last target durably recorded in the checkpoint
    pub checkpoint: Option<CrawlTarget>,
    pub cancelled: bool,
    pub governor: GovernorStats,
    pub elapsed: Duration,
}

impl CrawlReport {
    pub fn targets_done(&self) -> u64 {
        self.targets_exhausted + self.targets_failed
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    space: QuerySpace,
    archive: Arc<ArchiveSpec>,
    extractor: Arc<Extractor>,
    governor: Arc<Governor>,
    selector: Arc<dyn Selector>,
    sink: Box<dyn Sink>,
    batch_size: usize,
    max_sink_failures: u32,
    max_concurrent_targets: usize,
    max_concurrent_items: usize,
    run_timeout: Option<Duration>,
    config_hash: Option<String>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `sink` - Durable destination for records and the checkpoint
    /// * `fetcher` - Transport used by the governor
    /// * `selector` - Parses archive and item pages
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(HarvestError)` - The configuration could not be compiled
    pub fn new(
        config: &Config,
        sink: Box<dyn Sink>,
        fetcher: Arc<dyn Fetcher>,
        selector: Arc<dyn Selector>,
    ) -> Result<Self> {
        Ok(Self {
            space: config.query_space()?,
            archive: Arc::new(ArchiveSpec::from_config(config)?),
            extractor: Arc::new(config.extractor()?),
            governor: Arc::new(Governor::new(fetcher, &config.governor)),
            selector,
            sink,
            batch_size: config.crawl.batch_size,
            max_sink_failures: config.crawl.max_sink_failures,
            max_concurrent_targets: config.governor.max_concurrent_targets.max(1),
            max_concurrent_items: config.governor.max_concurrent_items.max(1),
            run_timeout: config.run_timeout(),
            config_hash: None,
        })
    }

    /// Stores `hash` in every checkpoint and run record written
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Runs the crawl until the query space is exhausted or `cancel` fires
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The run completed or was interrupted cleanly
    /// * `Err(HarvestError)` - The sink stayed unavailable past the failure ceiling
    pub async fn run(self, cancel: CancellationToken) -> Result<CrawlReport> {
        let started = Instant::now();
        let mut manager = CheckpointManager::new(
            self.sink,
            self.batch_size,
            self.max_sink_failures,
            self.config_hash.clone(),
        );

        let targets = match manager
            .load()?
            .and_then(|checkpoint| checkpoint.last_completed_target)
        {
            Some(last) => {
                tracing::info!("Resuming after {}", last);
                self.space.resume_after(&last)
            }
            None => {
                tracing::info!(
                    "Starting from {} ({} targets)",
                    self.space.start(),
                    self.space.len_hint()
                );
                self.space.iter()
            }
        };

        manager.begin_run()?;

        let timeout_guard = self.run_timeout.map(|limit| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                tracing::warn!("Run timeout of {:?} reached, stopping", limit);
                cancel.cancel();
            })
        });

        let (events_tx, mut events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let ctx = Arc::new(CrawlContext {
            governor: Arc::clone(&self.governor),
            selector: self.selector,
            extractor: self.extractor,
            archive: self.archive,
            item_permits: Arc::new(Semaphore::new(self.max_concurrent_items)),
            events: events_tx,
            cancel: cancel.clone(),
        });
        let producer = tokio::spawn(dispatch_targets(ctx, targets, self.max_concurrent_targets));

        let mut report = CrawlReport::default();
        let mut fatal = None;

        while let Some(event) = events.recv().await {
            if let Err(e) = handle_event(event, &mut manager, &mut report) {
                fatal = Some(e);
                cancel.cancel();
                break;
            }
        }
        drop(events);

        if let Err(e) = producer.await {
            tracing::error!("Target producer panicked: {}", e);
        }
        if let Some(guard) = timeout_guard {
            guard.abort();
        }

        if let Some(e) = fatal {
            if let Err(finish_err) = manager.finish_run(RunStatus::Failed) {
                tracing::warn!("Could not mark run as failed: {}", finish_err);
            }
            return Err(e);
        }

        if let Err(e) = manager.flush_final().await {
            if let Err(finish_err) = manager.finish_run(RunStatus::Failed) {
                tracing::warn!("Could not mark run as failed: {}", finish_err);
            }
            return Err(e);
        }

        let status = if cancel.is_cancelled() {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        manager.finish_run(status)?;

        report.records_flushed = manager.flushed_total();
        report.checkpoint = manager.persisted().cloned();
        report.cancelled = cancel.is_cancelled();
        report.governor = self.governor.stats();
        report.elapsed = started.elapsed();

        tracing::info!(
            "Crawl {}: {} targets done ({} failed), {} records written, {} skipped in {:?}",
            if report.cancelled { "interrupted" } else { "completed" },
            report.targets_done(),
            report.targets_failed,
            report.records_flushed,
            report.total_skipped(),
            report.elapsed
        );

        Ok(report)
    }
}

/// Applies one worker event to the checkpoint manager
fn handle_event(
    event: CrawlEvent,
    manager: &mut CheckpointManager,
    report: &mut CrawlReport,
) -> Result<()> {
    match event {
        CrawlEvent::Record(record) => {
            report.records_accepted += 1;
            manager.accept(record);
            manager.flush_if_due()?;

            if report.records_accepted % PROGRESS_EVERY == 0 {
                tracing::info!(
                    "Progress: {} records accepted, {} written, {} targets done",
                    report.records_accepted,
                    manager.flushed_total(),
                    report.targets_done()
                );
            }
        }
        CrawlEvent::Skipped { url, reason } => {
            tracing::debug!("Skipped {}: {}", url, reason);
            *report.skipped.entry(reason.kind().to_string()).or_default() += 1;
        }
        CrawlEvent::TargetDone {
            seq,
            target,
            outcome,
        } => match outcome {
            TargetOutcome::Exhausted { pages, links } => {
                tracing::debug!("{} exhausted after {} pages, {} links", target, pages, links);
                report.targets_exhausted += 1;
                manager.mark_target_done(seq, target, None)?;
            }
            TargetOutcome::Failed { page, reason } => {
                tracing::warn!("{} failed on page {}: {}", target, page, reason);
                report.targets_failed += 1;
                let reason = format!("page {}: {}", page, reason);
                manager.mark_target_done(seq, target, Some(&reason))?;
            }
            TargetOutcome::Cancelled => {
                tracing::debug!("{} cancelled", target);
                report.targets_cancelled += 1;
            }
        },
    }
    Ok(())
}

/// Dispatches targets in canonical order, numbering them for the watermark
async fn dispatch_targets(ctx: Arc<CrawlContext>, targets: Targets, max_concurrent: usize) {
    let permits = Arc::new(Semaphore::new(max_concurrent));
    let mut workers = JoinSet::new();

    for (seq, target) in (0u64..).zip(targets) {
        let permit = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => permit,
        };
        let Ok(permit) = permit else {
            break;
        };

        let ctx = Arc::clone(&ctx);
        workers.spawn(async move {
            let _permit = permit;
            let outcome = PaginationController::new(Arc::clone(&ctx), target.clone())
                .run()
                .await;
            let done = CrawlEvent::TargetDone {
                seq,
                target,
                outcome,
            };
            if ctx.events.send(done).await.is_err() {
                tracing::debug!("Result loop closed before target completion was reported");
            }
        });

        // Reap finished workers so the set does not grow with the query space
        while let Some(joined) = workers.try_join_next() {
            if let Err(e) = joined {
                tracing::error!("Target worker panicked: {}", e);
            }
        }
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Target worker panicked: {}", e);
        }
    }
}

/// Runs a complete crawl with the production fetcher, selector and SQLite sink
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `config_hash` - Hash of the configuration file, stored with the checkpoint
/// * `fresh` - Discard any checkpoint and start from the first target
/// * `cancel` - Cancelled on Ctrl-C
pub async fn run_crawl(
    config: &Config,
    config_hash: &str,
    fresh: bool,
    cancel: CancellationToken,
) -> Result<CrawlReport> {
    let mut sink = crate::storage::open_sink(&config.output.database_path)?;
    if fresh {
        tracing::info!("Fresh run requested, clearing checkpoint");
        sink.clear_checkpoint()?;
    }

    let fetcher = ReqwestFetcher::new(&config.user_agent)?;
    let selector = CssSelector::new(config.selector_exprs())?;

    Coordinator::new(config, Box::new(sink), Arc::new(fetcher), Arc::new(selector))?
        .with_config_hash(config_hash)
        .run(cancel)
        .await
}
