//! Bounded retry with linear backoff.
//!
//! Attempt `n` (1-based) of a retry sleeps `2n - 1` seconds first, so the
//! default policy of three retries waits 1s, 3s and 5s before giving up.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    max_retries: u32,
    unit: Duration,
}

impl Backoff {
    pub const fn new(max_retries: u32) -> Self {
        Self { max_retries, unit: Duration::from_secs(1) }
    }

    /// Scale the delays; tests use this to keep real-clock runs short.
    pub const fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Sleep before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.unit * (attempt.max(1) * 2 - 1)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. `op` receives the retry number (0 for the
    /// first attempt).
    pub async fn retry<T, E, F, Fut, R>(&self, what: &str, mut op: F, is_retryable: R) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = what,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}
