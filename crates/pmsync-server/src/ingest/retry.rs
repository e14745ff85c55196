//! Bounded retry with exponential backoff

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Upper bound for a single backoff sleep
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Attempt budget and backoff curve
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000), 2.0)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            multiplier,
        }
    }

    /// Delay before retry number `retry` (1-based), capped at [`MAX_RETRY_DELAY`]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }

    /// Sum of every backoff sleep the policy can incur
    pub fn max_total_backoff(&self) -> Duration {
        let mut total = Duration::ZERO;
        for retry in 1..self.max_attempts {
            let delay = self.delay_for_retry(retry);
            if delay == MAX_RETRY_DELAY {
                // Every later delay is capped too
                let remaining = self.max_attempts - retry;
                return total.saturating_add(MAX_RETRY_DELAY.saturating_mul(remaining));
            }
            total = total.saturating_add(delay);
        }
        total
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are spent. Returns the last error on exhaustion.
///
/// `operation` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_retryable(&err) => {
                let delay = policy.delay_for_retry(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, backing off before retry"
                );
                sleep(delay).await;
                attempt += 1;
            },
            Err(err) => return Err(err),
        }
    }
}
