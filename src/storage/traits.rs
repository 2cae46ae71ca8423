//! Sink trait and error types
//!
//! This module defines the trait interface for record sinks and their
//! associated error types.

use crate::checkpoint::Checkpoint;
use crate::extract::Record;
use crate::query::CrawlTarget;
use crate::storage::{FailedTargetRecord, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during sink operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable destination for records and crawl progress
///
/// Only one logical writer uses a sink at a time, so methods take `&mut self`
/// rather than requiring internal synchronization.
pub trait Sink: Send {
    // ===== Records =====

    /// Inserts or replaces every record, keyed by `Record::id`
    ///
    /// Must be idempotent: delivering the same batch twice leaves the same
    /// logical state. Either the whole batch is stored or none of it is.
    ///
    /// # Returns
    ///
    /// The number of records written
    fn upsert_batch(&mut self, records: &[Record]) -> StorageResult<usize>;

    // ===== Checkpoint =====

    /// Reads the persisted checkpoint, if any
    fn read_checkpoint(&self) -> StorageResult<Option<Checkpoint>>;

    /// Persists the checkpoint, replacing any previous one
    fn write_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Removes the persisted checkpoint so the next run starts from the beginning
    fn clear_checkpoint(&mut self) -> StorageResult<()>;

    // ===== Run Management =====

    /// Creates a new crawl run and returns its id
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Marks a run as finished with the given status
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Failed Targets =====

    /// Records a target whose archive pages could not be fetched
    fn record_failed_target(
        &mut self,
        target: &CrawlTarget,
        reason: &str,
        run_id: i64,
    ) -> StorageResult<()>;

    /// Gets all recorded failed targets, most recent first
    fn get_failed_targets(&self) -> StorageResult<Vec<FailedTargetRecord>>;

    // ===== Statistics =====

    /// Gets the total record count
    fn count_records(&self) -> StorageResult<u64>;

    /// Gets record counts per category, sorted by category
    fn count_records_by_category(&self) -> StorageResult<Vec<(String, u64)>>;
}
