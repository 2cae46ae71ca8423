use crate::config::GovernorConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Floor used when doubling a zero delay
const MIN_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Adaptive dispatch pacing shared by every fetch of a run
///
/// Consecutive dispatches are spaced by the current delay. Healthy
/// responses move the delay halfway toward `latency / target_concurrency`;
/// failures, throttling, slow responses, or a high recent failure rate
/// double it. The delay always stays within `[min_delay, max_delay]`.
#[derive(Debug, Clone)]
pub struct Throttle {
    delay: Duration,
    min_delay: Duration,
    max_delay: Duration,
    target_concurrency: f64,
    latency_threshold: Duration,
    failure_rate_threshold: f64,
    window: VecDeque<bool>,
    window_size: usize,
    next_dispatch: Option<Instant>,
}

/// What a finished attempt tells the throttle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A usable response (2xx, or a permanent answer that is not overload)
    Healthy,
    /// The server asked us to slow down (429)
    Throttled,
    /// Transient failure: 5xx, 408, timeout, connection error
    Failed,
}

impl Throttle {
    pub fn new(config: &GovernorConfig) -> Self {
        Self {
            delay: config.min_delay(),
            min_delay: config.min_delay(),
            max_delay: config.max_delay(),
            target_concurrency: config.target_concurrency,
            latency_threshold: Duration::from_millis(config.latency_threshold_ms),
            failure_rate_threshold: config.failure_rate_threshold,
            window: VecDeque::with_capacity(config.failure_window),
            window_size: config.failure_window.max(1),
            next_dispatch: None,
        }
    }

    /// Reserves the next dispatch slot
    ///
    /// # Arguments
    ///
    /// * `now` - The current time instant
    ///
    /// # Returns
    ///
    /// The instant at which the caller may send its request. Each call
    /// pushes the following slot one delay further out.
    pub fn reserve(&mut self, now: Instant) -> Instant {
        let slot = match self.next_dispatch {
            Some(next) if next > now => next,
            _ => now,
        };
        self.next_dispatch = Some(slot + self.delay);
        slot
    }

    /// Feeds the outcome of one attempt back into the delay
    pub fn record(&mut self, latency: Duration, signal: Signal) {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(signal != Signal::Healthy);

        let healthy = signal == Signal::Healthy
            && latency <= self.latency_threshold
            && self.failure_rate() <= self.failure_rate_threshold;

        if healthy {
            let target = latency.div_f64(self.target_concurrency);
            self.delay = ((self.delay + target) / 2).clamp(self.min_delay, self.max_delay);
        } else {
            let doubled = (self.delay * 2).max(MIN_BACKOFF_STEP);
            self.delay = doubled.clamp(self.min_delay, self.max_delay);
            tracing::debug!(
                "Slowing down to {:?} between requests ({:?}, latency {:?})",
                self.delay,
                signal,
                latency
            );
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Share of failed outcomes in the recent window
    pub fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failed = self.window.iter().filter(|f| **f).count();
        failed as f64 / self.window.len() as f64
    }
}
