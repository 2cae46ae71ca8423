//! Date-major enumeration of first-page crawl targets
//!
//! The canonical order is: dates ascending by calendar day (outer), then
//! categories in configured order (inner). Every target has page 1.

use super::{CategoryId, CrawlTarget};
use crate::calendar::LocalDate;
use std::sync::Arc;

/// The configured (date range x category set) space of crawl targets
#[derive(Debug, Clone)]
pub struct QuerySpace {
    start: LocalDate,
    end: LocalDate,
    categories: Arc<[CategoryId]>,
}

impl QuerySpace {
    /// Creates a query space over the inclusive range `start..=end`
    ///
    /// A range with `start > end` is empty, not an error.
    pub fn new(start: LocalDate, end: LocalDate, categories: Vec<CategoryId>) -> Self {
        Self {
            start,
            end,
            categories: categories.into(),
        }
    }

    pub fn start(&self) -> LocalDate {
        self.start
    }

    pub fn end(&self) -> LocalDate {
        self.end
    }

    pub fn categories(&self) -> &[CategoryId] {
        &self.categories
    }

    /// Returns the full canonical sequence of targets
    pub fn iter(&self) -> Targets {
        self.cursor_at(self.start, 0)
    }

    /// Returns the targets from `(date, category)` onward, inclusive
    ///
    /// Every target strictly before the pair in canonical order is skipped.
    /// A category not in the configured set starts at the first category of
    /// `date`.
    pub fn starting_at(&self, date: LocalDate, category: &CategoryId) -> Targets {
        if date < self.start {
            return self.iter();
        }
        let index = self.category_index(category).unwrap_or(0);
        self.cursor_at(date, index)
    }

    /// Returns the targets strictly after `target`, used to resume from a checkpoint
    ///
    /// If the target's category is no longer configured, the whole date is
    /// crawled again rather than skipping anything.
    pub fn resume_after(&self, target: &CrawlTarget) -> Targets {
        if target.date < self.start {
            return self.iter();
        }
        match self.category_index(&target.category) {
            Some(index) => {
                let mut targets = self.cursor_at(target.date, index);
                targets.next();
                targets
            }
            None => {
                tracing::warn!(
                    "Checkpoint category '{}' is not configured, resuming at start of {}",
                    target.category,
                    target.date
                );
                self.cursor_at(target.date, 0)
            }
        }
    }

    /// Number of targets in the full sequence
    pub fn len_hint(&self) -> usize {
        if self.start > self.end {
            return 0;
        }
        match (self.start.to_gregorian(), self.end.to_gregorian()) {
            (Ok(first), Ok(last)) => {
                let days = (last - first).num_days() + 1;
                usize::try_from(days).unwrap_or(0) * self.categories.len()
            }
            _ => 0,
        }
    }

    fn category_index(&self, category: &CategoryId) -> Option<usize> {
        self.categories.iter().position(|c| c == category)
    }

    fn cursor_at(&self, date: LocalDate, index: usize) -> Targets {
        let date = if date <= self.end && !self.categories.is_empty() {
            Some(date)
        } else {
            None
        };
        Targets {
            space: self.clone(),
            date,
            index,
        }
    }
}

/// Lazy, finite iterator over a [`QuerySpace`]
///
/// Owns its data, so it can be moved into a producer task.
#[derive(Debug, Clone)]
pub struct Targets {
    space: QuerySpace,
    date: Option<LocalDate>,
    index: usize,
}

impl Iterator for Targets {
    type Item = CrawlTarget;

    fn next(&mut self) -> Option<Self::Item> {
        let date = self.date?;
        let category = self.space.categories.get(self.index)?.clone();

        self.index += 1;
        if self.index >= self.space.categories.len() {
            self.index = 0;
            self.date = date.succ().filter(|next| *next <= self.space.end);
        }

        Some(CrawlTarget::first_page(date, category))
    }
}
