//! Archive-Harvester: a resumable, rate-governed archive crawler
//!
//! This crate walks a parametric query space (local calendar date x category x
//! archive page) of a paginated content archive, follows the item links found
//! on each archive page, extracts validated records and persists them in
//! batches with a crash-safe checkpoint.

pub mod calendar;
pub mod checkpoint;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod query;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Archive-Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Sink rejected {attempts} consecutive flushes, giving up: {last_error}")]
    SinkExhausted { attempts: u32, last_error: String },

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::PaginationState,
        to: state::PaginationState,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid date in config: {0}")]
    InvalidDate(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector '{expr}': {reason}")]
    InvalidSelector { expr: String, reason: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Calendar conversion and date parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("Invalid calendar date {year}/{month}/{day}")]
    InvalidCalendarDate { year: i32, month: u32, day: u32 },

    #[error("Cannot parse date from '{input}': {reason}")]
    Parse { input: String, reason: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Archive-Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for calendar operations
pub type CalendarResult<T> = std::result::Result<T, CalendarError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use calendar::{IsoDate, LocalDate};
pub use config::Config;
pub use query::{CategoryId, CrawlTarget};
pub use state::PaginationState;
pub use url::normalize_url;
