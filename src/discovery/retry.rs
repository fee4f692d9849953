//! Retry policy for category probes
//!
//! Transient failures (blocked, timeout, 5xx) are retried with capped
//! exponential backoff. Anything else is returned on first failure.

use crate::config::DiscoveryConfig;
use crate::probe::ProbeError;
use std::future::Future;
use std::time::Duration;

/// Backoff settings for retrying a probe or scrape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(
            config.max_probe_retries,
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    /// Delay before retry number `retry` (0-indexed): initial * 2^retry, capped
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(31));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(30))
    }
}

/// Runs `operation` until it succeeds, fails permanently, or retries run out
///
/// Returns the last error when giving up.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T, ProbeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProbeError>>,
{
    let mut retry = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && retry < policy.max_retries => {
                let delay = policy.calculate_delay(retry);
                tracing::debug!(
                    "Attempt {} failed: {}. Retrying in {:?}",
                    retry + 1,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
