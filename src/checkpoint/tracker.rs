//! Contiguous completion watermark over out-of-order target completion

use crate::query::CrawlTarget;
use std::collections::BTreeMap;

/// Tracks which targets have finished and exposes the highest target `T`
/// such that every target up to and including `T` has finished
///
/// Targets are identified by the sequence number they were dispatched with,
/// which follows canonical enumeration order starting at 0.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    next_seq: u64,
    finished: BTreeMap<u64, CrawlTarget>,
    watermark: Option<CrawlTarget>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the target dispatched as `seq` as finished
    ///
    /// # Returns
    ///
    /// True if the watermark advanced
    pub fn complete(&mut self, seq: u64, target: CrawlTarget) -> bool {
        if seq < self.next_seq {
            tracing::debug!("Target {} (seq {}) completed twice", target, seq);
            return false;
        }
        self.finished.insert(seq, target);

        let mut advanced = false;
        while let Some(target) = self.finished.remove(&self.next_seq) {
            self.watermark = Some(target);
            self.next_seq += 1;
            advanced = true;
        }
        advanced
    }

    /// The last target of the contiguous finished prefix
    pub fn watermark(&self) -> Option<&CrawlTarget> {
        self.watermark.as_ref()
    }

    /// Number of finished targets still waiting on an earlier one
    pub fn pending(&self) -> usize {
        self.finished.len()
    }
}
