//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from any [`Sink`].

use crate::query::CrawlTarget;
use crate::storage::{FailedTargetRecord, RunRecord, Sink};
use crate::Result;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Record counts per category, largest first
    pub records_by_category: Vec<(String, u64)>,

    /// Targets that failed, oldest first
    pub failed_targets: Vec<FailedTargetRecord>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,

    /// Last target covered by the checkpoint
    pub checkpoint: Option<CrawlTarget>,
}

/// Loads statistics from a sink
///
/// # Arguments
///
/// * `sink` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(sink: &dyn Sink) -> Result<HarvestStatistics> {
    let mut records_by_category = sink.count_records_by_category()?;
    records_by_category.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Ok(HarvestStatistics {
        total_records: sink.count_records()?,
        records_by_category,
        failed_targets: sink.get_failed_targets()?,
        latest_run: sink.get_latest_run()?,
        checkpoint: sink
            .read_checkpoint()?
            .and_then(|checkpoint| checkpoint.last_completed_target),
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    match &stats.checkpoint {
        Some(target) => println!("  Checkpoint: after {}", target),
        None => println!("  Checkpoint: none (next run starts from the beginning)"),
    }
    if let Some(run) = &stats.latest_run {
        println!(
            "  Latest run: #{} {:?}, started {}{}",
            run.id,
            run.status,
            run.started_at,
            run.finished_at
                .as_ref()
                .map(|f| format!(", finished {}", f))
                .unwrap_or_default()
        );
    }
    println!();

    if !stats.records_by_category.is_empty() {
        println!("Records by Category:");
        for (category, count) in &stats.records_by_category {
            let percentage = if stats.total_records > 0 {
                (*count as f64 / stats.total_records as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", category, count, percentage);
        }
        println!();
    }

    if !stats.failed_targets.is_empty() {
        println!("Failed Targets ({}):", stats.failed_targets.len());
        for failed in &stats.failed_targets {
            println!(
                "  - {} [{}] p{} (run {}): {}",
                failed.date, failed.category, failed.page, failed.run_id, failed.reason
            );
        }
        println!();
    }
}
