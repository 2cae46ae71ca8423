//! Storage module for persisting records and crawl progress
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Idempotent record upserts
//! - The single-row checkpoint
//! - Run tracking and failed-target bookkeeping

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteSink;
pub use traits::{Sink, StorageError, StorageResult};

use crate::HarvestError;

use std::path::Path;

/// Initializes or opens the SQLite sink
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteSink)` - Successfully initialized sink
/// * `Err(HarvestError)` - Failed to initialize the database
pub fn open_sink(path: &Path) -> Result<SqliteSink, HarvestError> {
    SqliteSink::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Represents a target recorded as failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTargetRecord {
    pub date: String,
    pub category: String,
    pub page: u32,
    pub reason: String,
    pub run_id: i64,
    pub failed_at: String,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }
}
