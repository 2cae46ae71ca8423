//! Batched, crash-safe record flushing
//!
//! The manager is driven by a single writer (the coordinator's result loop).
//! Records are buffered until the batch size is reached; a flush writes the
//! buffer with one idempotent upsert, then any pending failed-target entries,
//! and only after both succeeded persists the completion watermark as the new
//! checkpoint.
//!
//! After a failed sink write further attempts wait out an exponential
//! backoff, so `max-sink-failures` bounds a span of time rather than a burst
//! of records.

use super::{Checkpoint, CompletionTracker};
use crate::extract::Record;
use crate::query::CrawlTarget;
use crate::storage::{RunStatus, Sink, StorageError};
use crate::{HarvestError, Result};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// First wait after a failed sink write
pub const DEFAULT_SINK_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Ceiling on the wait between sink attempts
const MAX_SINK_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Owns the record buffer, the completion watermark and the sink
pub struct CheckpointManager {
    sink: Box<dyn Sink>,
    buffer: Vec<Record>,
    batch_size: usize,
    max_sink_failures: u32,
    consecutive_failures: u32,
    retry_delay: Duration,
    retry_after: Option<Instant>,
    failed_pending: VecDeque<(CrawlTarget, String)>,
    tracker: CompletionTracker,
    persisted: Option<CrawlTarget>,
    config_hash: Option<String>,
    run_id: Option<i64>,
    flushed_total: u64,
}

impl CheckpointManager {
    /// Creates a manager writing to `sink`
    ///
    /// # Arguments
    ///
    /// * `sink` - Durable destination for records and the checkpoint
    /// * `batch_size` - Buffer length that triggers a flush
    /// * `max_sink_failures` - Consecutive failed sink writes tolerated before the run aborts
    /// * `config_hash` - Stored in every checkpoint written
    pub fn new(
        sink: Box<dyn Sink>,
        batch_size: usize,
        max_sink_failures: u32,
        config_hash: Option<String>,
    ) -> Self {
        Self {
            sink,
            buffer: Vec::with_capacity(batch_size),
            batch_size: batch_size.max(1),
            max_sink_failures,
            consecutive_failures: 0,
            retry_delay: DEFAULT_SINK_RETRY_DELAY,
            retry_after: None,
            failed_pending: VecDeque::new(),
            tracker: CompletionTracker::new(),
            persisted: None,
            config_hash,
            run_id: None,
            flushed_total: 0,
        }
    }

    /// Sets the first backoff step after a failed sink write
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Reads the persisted checkpoint and remembers its position
    ///
    /// Called once at startup; a checkpoint written under a different
    /// configuration is still honored but reported.
    pub fn load(&mut self) -> Result<Option<Checkpoint>> {
        let checkpoint = self.sink.read_checkpoint()?;

        if let Some(cp) = &checkpoint {
            match (&cp.config_hash, &self.config_hash) {
                (Some(stored), Some(current)) if stored != current => {
                    tracing::warn!(
                        "Checkpoint was written with a different configuration (hash {} vs {})",
                        stored,
                        current
                    );
                }
                _ => {}
            }
            self.persisted = cp.last_completed_target.clone();
        }

        Ok(checkpoint)
    }

    /// Starts a run record in the sink
    pub fn begin_run(&mut self) -> Result<i64> {
        let hash = self.config_hash.clone().unwrap_or_default();
        let run_id = self.sink.create_run(&hash)?;
        self.run_id = Some(run_id);
        tracing::info!("Started run {}", run_id);
        Ok(run_id)
    }

    /// Marks the current run as finished
    pub fn finish_run(&mut self, status: RunStatus) -> Result<()> {
        if let Some(run_id) = self.run_id {
            self.sink.finish_run(run_id, status)?;
        }
        Ok(())
    }

    /// Buffers a validated record
    pub fn accept(&mut self, record: Record) {
        self.buffer.push(record);
    }

    /// Flushes when the buffer has reached the batch size
    ///
    /// While backing off from a failed write nothing is attempted and the
    /// buffer keeps growing.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A batch was written
    /// * `Ok(false)` - Nothing due, backing off, or the write failed and the buffer was kept
    /// * `Err(HarvestError::SinkExhausted)` - Too many consecutive sink failures
    pub fn flush_if_due(&mut self) -> Result<bool> {
        if self.buffer.len() < self.batch_size || self.backing_off() {
            return Ok(false);
        }
        self.flush()
    }

    /// Writes the buffer, then the checkpoint
    ///
    /// On sink failure the buffer is retained so the next attempt re-delivers
    /// the same records.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.buffer.is_empty() {
            match self.sink.upsert_batch(&self.buffer) {
                Ok(written) => {
                    self.flushed_total += written as u64;
                    tracing::debug!(
                        "Flushed {} records ({} total)",
                        written,
                        self.flushed_total
                    );
                    self.buffer.clear();
                    self.register_success();
                }
                Err(e) => {
                    self.register_failure(e)?;
                    return Ok(false);
                }
            }
        }

        if !self.write_failed_targets()? {
            return Ok(false);
        }
        self.persist_watermark()
    }

    /// Final flush at shutdown, retrying with backoff until success or the failure ceiling
    pub async fn flush_final(&mut self) -> Result<()> {
        loop {
            if let Some(at) = self.retry_after {
                tokio::time::sleep(at.saturating_duration_since(Instant::now())).await;
            }
            if self.flush()? {
                return Ok(());
            }
        }
    }

    /// Records that the target dispatched as `seq` has finished
    ///
    /// All of the target's records must already have been accepted. A failed
    /// target is recorded in the sink and still counts as finished; the
    /// watermark never moves past it before that entry is written. When the
    /// buffer is empty the advanced watermark is persisted immediately.
    pub fn mark_target_done(
        &mut self,
        seq: u64,
        target: CrawlTarget,
        failure: Option<&str>,
    ) -> Result<()> {
        if let Some(reason) = failure {
            if self.run_id.is_some() {
                self.failed_pending
                    .push_back((target.clone(), reason.to_string()));
            }
        }

        self.tracker.complete(seq, target);
        if self.backing_off() {
            return Ok(());
        }

        if self.write_failed_targets()? && self.buffer.is_empty() {
            self.persist_watermark()?;
        }
        Ok(())
    }

    /// The last target known to be durably completed
    pub fn persisted(&self) -> Option<&CrawlTarget> {
        self.persisted.as_ref()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn flushed_total(&self) -> u64 {
        self.flushed_total
    }

    /// Failed targets not yet written to the sink
    pub fn failed_pending(&self) -> usize {
        self.failed_pending.len()
    }

    fn backing_off(&self) -> bool {
        self.retry_after.is_some_and(|at| Instant::now() < at)
    }

    fn write_failed_targets(&mut self) -> Result<bool> {
        let Some(run_id) = self.run_id else {
            return Ok(true);
        };

        while let Some((target, reason)) = self.failed_pending.front() {
            match self.sink.record_failed_target(target, reason, run_id) {
                Ok(()) => {
                    self.failed_pending.pop_front();
                    self.register_success();
                }
                Err(e) => {
                    self.register_failure(e)?;
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn persist_watermark(&mut self) -> Result<bool> {
        let Some(watermark) = self.tracker.watermark() else {
            return Ok(true);
        };
        if self.persisted.as_ref() == Some(watermark) {
            return Ok(true);
        }

        let checkpoint = Checkpoint::at(watermark.clone(), self.config_hash.clone());
        match self.sink.write_checkpoint(&checkpoint) {
            Ok(()) => {
                tracing::debug!("Checkpoint advanced to {}", watermark);
                self.persisted = Some(watermark.clone());
                self.register_success();
                Ok(true)
            }
            Err(e) => {
                self.register_failure(e)?;
                Ok(false)
            }
        }
    }

    fn register_success(&mut self) {
        self.consecutive_failures = 0;
        self.retry_after = None;
    }

    fn register_failure(&mut self, error: StorageError) -> Result<()> {
        self.consecutive_failures += 1;
        let wait = self
            .retry_delay
            .saturating_mul(1u32 << (self.consecutive_failures - 1).min(16))
            .min(MAX_SINK_RETRY_DELAY);
        self.retry_after = Some(Instant::now() + wait);

        if self.consecutive_failures > self.max_sink_failures {
            tracing::error!(
                "Sink failed {} consecutive times, {} records still buffered: {}",
                self.consecutive_failures,
                self.buffer.len(),
                error
            );
            return Err(HarvestError::SinkExhausted {
                attempts: self.consecutive_failures,
                last_error: error.to_string(),
            });
        }

        tracing::warn!(
            "Sink write failed (attempt {} of {}), keeping {} buffered records, retrying in {:?}: {}",
            self.consecutive_failures,
            self.max_sink_failures + 1,
            self.buffer.len(),
            wait,
            error
        );
        Ok(())
    }
}
