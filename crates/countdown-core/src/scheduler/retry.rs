//! Retry policy: decides backoff delays.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::config::SchedulerConfig;
use crate::domain::StoreError;

/// Backoff for failed job attempts.
///
/// delay = min(base_delay * multiplier^(attempts - 1), max_delay) * (1 + jitter)
///
/// Example with base_delay=60s, multiplier=2.0, no jitter:
/// - attempt 1 (first failure): 60s
/// - attempt 2: 120s
/// - attempt 3: 240s
///
/// Jitter is applied after the cap, so jobs that have been failing for a long
/// time still spread out. Below the cap, `multiplier >= 2` and
/// `jitter_ratio < 1` keep successive delays from shrinking whatever the
/// jitter draws are; at the cap the delay never drops below `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Base delay for the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Cap on any single delay.
    pub max_delay: Duration,

    /// Jitter is drawn uniformly from `[0, jitter_ratio)`.
    pub jitter_ratio: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            base_delay: config.retry_delay,
            multiplier: 2.0,
            max_delay: config.retry_max_delay,
            jitter_ratio: config.retry_jitter_ratio,
        }
    }

    /// Delay after `attempts` failed attempts (1-indexed) for a given jitter draw.
    pub fn next_delay(&self, attempts: u32, jitter: f64) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_secs_f64();

        let capped = if raw.is_finite() { raw.min(cap) } else { cap };
        Duration::from_secs_f64((capped * (1.0 + jitter.max(0.0))).max(0.0))
    }

    /// Delay after `attempts` failed attempts, with a fresh jitter draw.
    pub fn sample_delay(&self, attempts: u32) -> Duration {
        let jitter = if self.jitter_ratio > 0.0 {
            rand::thread_rng().gen_range(0.0..self.jitter_ratio)
        } else {
            0.0
        };
        self.next_delay(attempts, jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

const STORE_RETRY_ATTEMPTS: u32 = 5;
const STORE_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(50);
const STORE_RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Run a job-store call, retrying while the store is unavailable.
///
/// Only `StoreError::Unavailable` is retried. Conflicts are answers, not
/// outages, and are returned straight away.
pub(crate) async fn with_store_retry<F, Fut, T>(operation: &'static str, call: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    retry_unavailable(operation, Some(STORE_RETRY_ATTEMPTS), call).await
}

/// Same as [`with_store_retry`], but keeps retrying for as long as the store
/// stays unavailable. Used where giving up would strand a job in RUNNING.
pub(crate) async fn until_stored<F, Fut, T>(operation: &'static str, call: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    retry_unavailable(operation, None, call).await
}

async fn retry_unavailable<F, Fut, T>(
    operation: &'static str,
    max_attempts: Option<u32>,
    mut call: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt: u32 = 0;
    let mut delay = STORE_RETRY_INITIAL_DELAY;

    loop {
        attempt = attempt.saturating_add(1);
        match call().await {
            Ok(value) => return Ok(value),
            Err(e @ StoreError::Unavailable(_)) if max_attempts.is_none_or(|max| attempt < max) => {
                if attempt == STORE_RETRY_ATTEMPTS {
                    error!(operation, attempt, error = %e, "job store still unavailable, still retrying");
                } else {
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "job store unavailable, retrying"
                    );
                }
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(STORE_RETRY_MAX_DELAY);
            }
            Err(e) => {
                if matches!(e, StoreError::Unavailable(_)) {
                    error!(operation, attempts = attempt, error = %e, "job store retries exhausted");
                }
                return Err(e);
            }
        }
    }
}
