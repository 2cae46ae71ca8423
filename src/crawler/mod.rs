//! Crawler module: fetching, rate governance, pagination and orchestration
//!
//! - `fetcher`: the HTTP capability and its reqwest implementation
//! - `governor`: in-flight ceiling, adaptive pacing, retries and backoff
//! - `pagination`: one target's walk over its archive pages
//! - `coordinator`: the run loop tying targets, workers and checkpoints together

mod coordinator;
mod fetcher;
mod governor;
mod pagination;
mod throttle;

pub use coordinator::{run_crawl, Coordinator, CrawlEvent, CrawlReport};
pub use fetcher::{build_http_client, FetchResponse, Fetcher, NetworkError, ReqwestFetcher};
pub use governor::{classify_status, Classification, FetchFailure, Governor, GovernorStats};
pub use pagination::{ArchivePage, ArchiveSpec, CrawlContext, PaginationController, TargetOutcome};
pub use throttle::{Signal, Throttle};
