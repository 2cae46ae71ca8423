//! Checkpoint/resume: durable crawl cursor and batched record flushing
//!
//! # Components
//!
//! - `Checkpoint`: the persisted cursor, stored as JSON by the sink
//! - `CompletionTracker`: folds out-of-order target completion into a contiguous watermark
//! - `CheckpointManager`: buffers records and flushes them with the checkpoint

mod manager;
mod tracker;

pub use manager::CheckpointManager;
pub use tracker::CompletionTracker;

use crate::query::CrawlTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current checkpoint layout version
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    CHECKPOINT_SCHEMA_VERSION
}

/// Durable crawl progress
///
/// Unknown fields are ignored on read so that newer layouts stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Every target up to and including this one is finished and flushed
    #[serde(default)]
    pub last_completed_target: Option<CrawlTarget>,

    /// Hash of the configuration the checkpoint was written under
    #[serde(default)]
    pub config_hash: Option<String>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Creates a checkpoint positioned at `target`
    pub fn at(target: CrawlTarget, config_hash: Option<String>) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            last_completed_target: Some(target),
            config_hash,
            updated_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        let checkpoint: Self = serde_json::from_str(body)?;
        if checkpoint.schema_version > CHECKPOINT_SCHEMA_VERSION {
            tracing::warn!(
                "Checkpoint schema version {} is newer than {}, reading known fields only",
                checkpoint.schema_version,
                CHECKPOINT_SCHEMA_VERSION
            );
        }
        Ok(checkpoint)
    }
}
