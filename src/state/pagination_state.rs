/// Pagination state definitions for a single crawl target
///
/// A target starts `Active` on page 1, stays `Active` while further archive
/// pages are fetched, and ends in exactly one terminal state.
use crate::{HarvestError, Result};
use std::fmt;

/// Represents the state of one (date, category) pagination cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaginationState {
    /// Archive pages are still being fetched
    Active,

    // ===== Terminal States =====
    /// No more content: an empty page, no next-page signal, or the page ceiling
    Exhausted,

    /// An archive page fetch failed after retries; the target is skipped for this run
    Failed,
}

impl PaginationState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Validates a state transition and returns the new state
    ///
    /// `Active -> Active` is the page+1 transition. Terminal states never
    /// transition again.
    pub fn transition(self, to: Self) -> Result<Self> {
        if self.is_terminal() {
            return Err(HarvestError::InvalidTransition { from: self, to });
        }
        Ok(to)
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from its database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "exhausted" => Some(Self::Exhausted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PaginationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
