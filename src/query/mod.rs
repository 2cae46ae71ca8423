//! Query space: crawl targets and their canonical enumeration order

mod enumerator;

pub use enumerator::{QuerySpace, Targets};

use crate::calendar::LocalDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of an archive category, as used in archive URLs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(String);

impl CategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One (date, category, page) unit of crawl work
///
/// Targets are never mutated; the next archive page is derived with
/// [`CrawlTarget::next_page`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub date: LocalDate,
    pub category: CategoryId,
    pub page: u32,
}

impl CrawlTarget {
    /// Creates the first-page target for a (date, category) cursor
    pub fn first_page(date: LocalDate, category: CategoryId) -> Self {
        Self {
            date,
            category,
            page: 1,
        }
    }

    /// Returns the target for the following archive page
    pub fn next_page(&self) -> Self {
        Self {
            date: self.date,
            category: self.category.clone(),
            page: self.page + 1,
        }
    }
}

impl fmt::Display for CrawlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] p{}", self.date, self.category, self.page)
    }
}
