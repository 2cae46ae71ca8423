//! Rate and concurrency governor
//!
//! Every request of a run goes through one [`Governor`]. It bounds the number
//! of in-flight fetches, spaces dispatches with the adaptive [`Throttle`],
//! applies the per-attempt timeout, classifies outcomes and retries
//! transient failures with exponential backoff.

use super::fetcher::{FetchResponse, Fetcher, NetworkError};
use super::throttle::{Signal, Throttle};
use crate::config::GovernorConfig;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Classification of one fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Transient,
    Permanent,
}

/// Classifies an HTTP status code
///
/// | Status | Classification |
/// |--------|----------------|
/// | 2xx | Success |
/// | 408, 429, 5xx | Transient |
/// | anything else | Permanent |
pub fn classify_status(status: u16) -> Classification {
    match status {
        200..=299 => Classification::Success,
        408 | 429 | 500..=599 => Classification::Transient,
        _ => Classification::Permanent,
    }
}

/// Why a governed fetch gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Transient failures persisted through every retry
    Transient { attempts: u32, last_error: String },
    /// The server or response ruled out success
    Permanent { status: Option<u16>, reason: String },
    /// The run was cancelled while the fetch was pending
    Cancelled,
}

impl FetchFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::Permanent { .. } => "permanent",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient {
                attempts,
                last_error,
            } => write!(f, "gave up after {} attempts: {}", attempts, last_error),
            Self::Permanent {
                status: Some(status),
                reason,
            } => write!(f, "HTTP {}: {}", status, reason),
            Self::Permanent { status: None, reason } => write!(f, "{}", reason),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Counters describing the governor's activity so far
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GovernorStats {
    pub requests: u64,
    pub retries: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub current_delay: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    retries: AtomicU64,
    transient_failures: AtomicU64,
    permanent_failures: AtomicU64,
}

/// A failed attempt, before retry policy is applied
struct AttemptError {
    transient: bool,
    status: Option<u16>,
    error: String,
}

/// Shared gate for every request of a run
pub struct Governor {
    fetcher: Arc<dyn Fetcher>,
    in_flight: Semaphore,
    throttle: Mutex<Throttle>,
    request_timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
    max_delay: Duration,
    counters: Counters,
}

impl Governor {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &GovernorConfig) -> Self {
        Self {
            fetcher,
            in_flight: Semaphore::new(config.max_in_flight.max(1)),
            throttle: Mutex::new(Throttle::new(config)),
            request_timeout: config.request_timeout(),
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            max_delay: config.max_delay(),
            counters: Counters::default(),
        }
    }

    /// Fetches `url`, retrying transient failures
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL to fetch
    /// * `cancel` - Aborts waiting and in-flight attempts when cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResponse)` - A 2xx response
    /// * `Err(FetchFailure)` - Permanent failure, exhausted retries, or cancellation
    pub async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchFailure> {
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchFailure::Cancelled);
            }
            attempts += 1;

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchFailure::Cancelled),
                attempt = self.attempt(url) => attempt,
            };

            let failure = match attempt {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            if !failure.transient {
                self.counters
                    .permanent_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Permanent failure for {}: {}", url, failure.error);
                return Err(FetchFailure::Permanent {
                    status: failure.status,
                    reason: failure.error,
                });
            }

            self.counters
                .transient_failures
                .fetch_add(1, Ordering::Relaxed);

            if attempts > self.max_retries {
                tracing::warn!(
                    "Giving up on {} after {} attempts: {}",
                    url,
                    attempts,
                    failure.error
                );
                return Err(FetchFailure::Transient {
                    attempts,
                    last_error: failure.error,
                });
            }

            let backoff = self.backoff_delay(attempts);
            tracing::debug!(
                "Transient failure for {} (attempt {}), retrying in {:?}: {}",
                url,
                attempts,
                backoff,
                failure.error
            );
            self.counters.retries.fetch_add(1, Ordering::Relaxed);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchFailure::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    /// Backoff before retry number `attempt` (1-based), capped at the maximum delay
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    pub fn stats(&self) -> GovernorStats {
        GovernorStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            transient_failures: self.counters.transient_failures.load(Ordering::Relaxed),
            permanent_failures: self.counters.permanent_failures.load(Ordering::Relaxed),
            current_delay: self.lock_throttle().current_delay(),
        }
    }

    /// One paced, bounded, timed attempt
    async fn attempt(&self, url: &str) -> Result<FetchResponse, AttemptError> {
        let _permit = self.in_flight.acquire().await.map_err(|_| AttemptError {
            transient: false,
            status: None,
            error: "governor closed".to_string(),
        })?;

        let slot = self.lock_throttle().reserve(Instant::now());
        tokio::time::sleep_until(slot).await;

        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.request_timeout,
            self.fetcher.fetch(url, self.request_timeout),
        )
        .await
        .unwrap_or(Err(NetworkError::Timeout));
        let latency = started.elapsed();

        let outcome = match result {
            Ok(response) => match classify_status(response.status) {
                Classification::Success => Ok(response),
                classification => Err(AttemptError {
                    transient: classification == Classification::Transient,
                    status: Some(response.status),
                    error: format!("unexpected status {}", response.status),
                }),
            },
            Err(e) => Err(AttemptError {
                transient: e.is_transient(),
                status: None,
                error: e.to_string(),
            }),
        };

        let signal = match &outcome {
            Err(AttemptError {
                transient: true,
                status: Some(429),
                ..
            }) => Signal::Throttled,
            Err(AttemptError {
                transient: true, ..
            }) => Signal::Failed,
            _ => Signal::Healthy,
        };
        self.lock_throttle().record(latency, signal);

        outcome
    }

    fn lock_throttle(&self) -> std::sync::MutexGuard<'_, Throttle> {
        self.throttle.lock().unwrap_or_else(|e| e.into_inner())
    }
}
