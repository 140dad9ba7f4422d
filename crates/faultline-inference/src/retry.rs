//! Bounded retry with exponential backoff for external inference calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use faultline_core::{Error, Result};

/// Retry policy for transient failures.
///
/// Only errors whose class is transient are retried; validation,
/// capacity, and configuration errors surface immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (budget of 2 means up to 3 calls).
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `base * 2^n`.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    /// Run `f` until it succeeds, a non-transient error occurs, or the
    /// budget is spent. Returns the last error when exhausted.
    pub async fn run<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff_base * 2u32.saturating_pow(attempt);
                    warn!(
                        subsystem = "inference",
                        component = "retry",
                        op = op,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 0 {
                        debug!(
                            subsystem = "inference",
                            component = "retry",
                            op = op,
                            attempt,
                            "Retry budget exhausted or non-retryable error"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: faultline_core::defaults::INFERENCE_MAX_RETRIES,
            backoff_base: Duration::from_millis(faultline_core::defaults::STAGE_BACKOFF_BASE_MS),
        }
    }
}
