use std::time::Duration;

use crate::error::CatalogError;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Bounded retry with linear backoff: attempt `n` (0-based) waits
/// `base_delay * (n + 1)` before the next try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }

    pub fn is_retryable_status(status: u16) -> bool {
        status >= 500
    }

    /// Whether a failure on `attempt` (0-based) should be followed by another try.
    pub fn should_retry(&self, err: &CatalogError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match err.http_status() {
            Some(status) => Self::is_retryable_status(status),
            None => err.is_retryable(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}
