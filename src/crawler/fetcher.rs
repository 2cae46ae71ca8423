//! HTTP fetch capability
//!
//! The governor only sees the [`Fetcher`] trait, so tests can substitute a
//! scripted fetcher and the crawler never depends on a concrete client.
//! [`ReqwestFetcher`] is the production implementation.

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;

/// Maximum redirect hops followed for a single request
const MAX_REDIRECTS: usize = 10;

/// A response with any status code
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Decoded body text
    pub body: String,
    /// URL after redirects, used as the base for relative links
    pub final_url: String,
}

/// Network-level failure, before or while reading a response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connection reset: {0}")]
    Reset(String),

    #[error("body read interrupted: {0}")]
    Body(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl NetworkError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connect(_) | Self::Reset(_) | Self::Body(_)
        )
    }
}

/// Fetches a URL, returning whatever status the server answered with
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, NetworkError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use archive_harvester::config::UserAgentConfig;
/// use archive_harvester::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, NetworkError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(classify_reqwest_error)?;

        Ok(FetchResponse {
            status,
            body,
            final_url,
        })
    }
}

/// Maps a reqwest error onto the failure kinds the governor distinguishes
fn classify_reqwest_error(e: reqwest::Error) -> NetworkError {
    if e.is_timeout() {
        NetworkError::Timeout
    } else if e.is_connect() {
        NetworkError::Connect(e.to_string())
    } else if e.is_decode() || e.is_redirect() {
        NetworkError::Malformed(e.to_string())
    } else if e.is_body() {
        NetworkError::Body(e.to_string())
    } else if e.is_request() {
        // Request-phase errors after connecting are dropped or reset connections
        NetworkError::Reset(e.to_string())
    } else {
        NetworkError::Other(e.to_string())
    }
}
