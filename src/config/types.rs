use crate::calendar::{DateFormat, LocalDate};
use crate::extract::{DateRule, Extractor, FieldSpec};
use crate::query::{CategoryId, QuerySpace};
use crate::{ConfigError, ConfigResult};
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Archive-Harvester
///
/// An immutable value built once at startup and passed into the coordinator.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    #[serde(rename = "category")]
    pub categories: Vec<CategoryEntry>,
    pub archive: ArchiveConfig,
    #[serde(rename = "field")]
    pub fields: Vec<FieldEntry>,
    pub date: DateConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Query range and progress configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// First local calendar date to crawl, `YYYY/MM/DD`
    #[serde(rename = "start-date")]
    pub start_date: String,

    /// Last local calendar date to crawl (inclusive), `YYYY/MM/DD`
    #[serde(rename = "end-date")]
    pub end_date: String,

    /// Hard ceiling on archive pages per (date, category). Default: 1
    #[serde(rename = "max-pages-per-target", default = "default_max_pages")]
    pub max_pages_per_target: u32,

    /// Records buffered before a flush. Default: 20
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Consecutive failed sink writes tolerated before the run aborts. Default: 3
    #[serde(rename = "max-sink-failures", default = "default_max_sink_failures")]
    pub max_sink_failures: u32,

    /// Wall-clock limit for the whole run; unset means no limit
    #[serde(rename = "run-timeout-secs", default)]
    pub run_timeout_secs: Option<u64>,
}

/// One archive category
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    /// Identifier substituted into the archive URL
    pub id: String,

    /// Human-readable name, for logs only
    #[serde(default)]
    pub name: Option<String>,
}

/// Archive index page configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// URL with `{year}`, `{month}`, `{day}`, `{date}`, `{category}` and `{page}` placeholders
    #[serde(rename = "url-template")]
    pub url_template: String,

    /// Selectors yielding item hrefs, tried in order
    #[serde(rename = "link-selectors")]
    pub link_selectors: Vec<String>,

    /// Selector whose presence signals another archive page
    #[serde(rename = "next-page-selector", default)]
    pub next_page_selector: Option<String>,

    /// Regex item links must match; links are cut at the end of the match
    #[serde(rename = "link-pattern", default)]
    pub link_pattern: Option<String>,
}

/// One output field of a record
#[derive(Debug, Clone, Deserialize)]
pub struct FieldEntry {
    pub name: String,

    /// Fallback selector expressions, tried in order
    pub selectors: Vec<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub multiple: bool,

    /// Regexes removed from the raw text before cleaning
    #[serde(rename = "strip-patterns", default)]
    pub strip_patterns: Vec<String>,
}

/// Publication date configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DateConfig {
    /// Name of the `[[field]]` holding the date text
    pub field: String,

    /// How that text is written. Default: local-numeric
    #[serde(default)]
    pub format: DateFormat,
}

/// Rate and concurrency governor configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Ceiling on concurrently in-flight fetches. Default: 8
    #[serde(rename = "max-in-flight")]
    pub max_in_flight: usize,

    /// Targets paginated concurrently. Default: 2
    #[serde(rename = "max-concurrent-targets")]
    pub max_concurrent_targets: usize,

    /// Item pages extracted concurrently. Default: 8
    #[serde(rename = "max-concurrent-items")]
    pub max_concurrent_items: usize,

    /// Steady-state concurrency the adaptive delay aims for. Default: 4.0
    #[serde(rename = "target-concurrency")]
    pub target_concurrency: f64,

    /// Lower bound and initial value of the dispatch delay. Default: 250
    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the dispatch delay and of retry backoff. Default: 10000
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Retries after the first attempt for transient failures. Default: 5
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First retry backoff, doubled per attempt. Default: 500
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    /// Per-attempt fetch timeout. Default: 30
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Responses slower than this slow the crawl down. Default: 5000
    #[serde(rename = "latency-threshold-ms")]
    pub latency_threshold_ms: u64,

    /// Failure share of recent outcomes that slows the crawl down. Default: 0.5
    #[serde(rename = "failure-rate-threshold")]
    pub failure_rate_threshold: f64,

    /// Number of recent outcomes the failure rate is computed over. Default: 20
    #[serde(rename = "failure-window")]
    pub failure_window: usize,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            max_concurrent_targets: 2,
            max_concurrent_items: 8,
            target_concurrency: 4.0,
            min_delay_ms: 250,
            max_delay_ms: 10_000,
            max_retries: 5,
            backoff_base_ms: 500,
            request_timeout_secs: 30,
            latency_threshold_ms: 5_000,
            failure_rate_threshold: 0.5,
            failure_window: 20,
        }
    }
}

impl GovernorConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "ArchiveHarvester".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/crawler".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: PathBuf,
}

fn default_max_pages() -> u32 {
    1
}

fn default_batch_size() -> usize {
    20
}

fn default_max_sink_failures() -> u32 {
    3
}

fn parse_config_date(key: &str, value: &str) -> ConfigResult<LocalDate> {
    value
        .parse::<LocalDate>()
        .map_err(|e| ConfigError::InvalidDate(format!("{} '{}': {}", key, value, e)))
}

fn compile_pattern(pattern: &str) -> ConfigResult<Regex> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

impl Config {
    pub fn start_date(&self) -> ConfigResult<LocalDate> {
        parse_config_date("start-date", &self.crawl.start_date)
    }

    pub fn end_date(&self) -> ConfigResult<LocalDate> {
        parse_config_date("end-date", &self.crawl.end_date)
    }

    /// Category ids in configured order
    pub fn category_ids(&self) -> Vec<CategoryId> {
        self.categories
            .iter()
            .map(|c| CategoryId::new(c.id.clone()))
            .collect()
    }

    /// Builds the query space described by `[crawl]` and `[[category]]`
    pub fn query_space(&self) -> ConfigResult<QuerySpace> {
        Ok(QuerySpace::new(
            self.start_date()?,
            self.end_date()?,
            self.category_ids(),
        ))
    }

    /// Compiles the optional item link pattern
    pub fn link_pattern(&self) -> ConfigResult<Option<Regex>> {
        self.archive
            .link_pattern
            .as_deref()
            .map(compile_pattern)
            .transpose()
    }

    /// Builds the field extraction contracts
    pub fn field_specs(&self) -> ConfigResult<Vec<FieldSpec>> {
        self.fields
            .iter()
            .map(|entry| {
                let strip_patterns = entry
                    .strip_patterns
                    .iter()
                    .map(|p| compile_pattern(p))
                    .collect::<ConfigResult<Vec<_>>>()?;
                Ok(FieldSpec {
                    name: entry.name.clone(),
                    selectors: entry.selectors.clone(),
                    required: entry.required,
                    multiple: entry.multiple,
                    strip_patterns,
                })
            })
            .collect()
    }

    /// Builds the record extractor
    pub fn extractor(&self) -> ConfigResult<Extractor> {
        Ok(Extractor::new(
            self.field_specs()?,
            DateRule {
                field: self.date.field.clone(),
                format: self.date.format,
            },
        ))
    }

    /// Every selector expression used by fields and link discovery
    pub fn selector_exprs(&self) -> Vec<&str> {
        let mut exprs: Vec<&str> = self
            .fields
            .iter()
            .flat_map(|f| f.selectors.iter().map(String::as_str))
            .collect();
        exprs.extend(self.archive.link_selectors.iter().map(String::as_str));
        if let Some(next) = &self.archive.next_page_selector {
            exprs.push(next.as_str());
        }
        exprs
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.crawl.run_timeout_secs.map(Duration::from_secs)
    }
}
