//! Bounded retry with exponential backoff.
//!
//! DESIGN
//! ======
//! Attempts run strictly in sequence: `0..=attempts`. After a retryable
//! failure the loop sleeps `base_delay * 2^attempt` and tries again. A
//! non-retryable failure ends the loop immediately, even on attempt 0.
//! The sleep is an ordinary await point, so dropping the future (e.g. from
//! a caller's `tokio::time::timeout`) cancels the loop mid-backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::config::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_MS, LlmConfig};
use crate::error::{ErrorCode, GenerationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first try; total tries is `attempts + 1`.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: DEFAULT_RETRY_ATTEMPTS, base_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS) }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self { attempts: config.retry_attempts, base_delay: Duration::from_millis(config.retry_delay_ms) }
    }

    /// Backoff after the failed attempt numbered `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds, fails non-retryably, or the budget is spent.
    ///
    /// `op` receives the 0-indexed attempt number.
    ///
    /// # Errors
    ///
    /// Returns the error from the final attempt.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, GenerationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.retryable() || attempt >= self.attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        total = self.attempts.saturating_add(1),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        code = e.error_code(),
                        error = %e,
                        "llm: attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
