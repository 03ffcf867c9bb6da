//! Fixed-budget retry for per-record downloads

use std::time::Duration;

use crate::error::PipelineError;
use crate::stream::StreamError;

/// Default number of download attempts per record
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry budget for one record.
///
/// Every failed attempt consumes one unit. With no backoff the next
/// attempt is issued immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Option<Duration>,
}

impl RetryPolicy {
    /// Straight decrement-and-repeat, at least one attempt
    pub const fn fixed(max_attempts: u32) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            backoff_base: None,
        }
    }

    /// Sleep `base * 2^(n-1)` before the n-th retry
    pub const fn with_backoff(self, base: Duration) -> Self {
        Self {
            backoff_base: Some(base),
            ..self
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based), if backoff is enabled
    pub fn delay(&self, retry: u32) -> Option<Duration> {
        let base = self.backoff_base?;
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        Some(base.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Run `attempt_fn` until it succeeds or the budget is spent.
///
/// `attempt_fn` receives the 1-based attempt number. Each failure is
/// logged; exhaustion yields [`PipelineError::RetriesExhausted`] carrying
/// the last error.
pub fn retry<T>(
    id: &str,
    policy: &RetryPolicy,
    mut attempt_fn: impl FnMut(u32) -> Result<T, StreamError>,
) -> Result<T, PipelineError> {
    let max = policy.max_attempts();
    let mut attempt = 1u32;
    loop {
        match attempt_fn(attempt) {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max => {
                log::warn!("{id}: attempt {attempt}/{max} failed: {e}, retrying...");
                if let Some(delay) = policy.delay(attempt) {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(e) => {
                log::error!("{id}: failed permanently after {attempt} attempts: {e}");
                return Err(PipelineError::RetriesExhausted {
                    id: id.to_string(),
                    attempts: attempt,
                    last: e,
                });
            }
        }
    }
}
