//! Bounded retries for transient scraping failures

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::driver::DriverError;
use crate::ScrapeError;

/// Classifies an error as worth retrying
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for DriverError {
    fn is_transient(&self) -> bool {
        match self {
            DriverError::Timeout { .. }
            | DriverError::NotFound(_)
            | DriverError::ClickIntercepted(_)
            | DriverError::Navigation(_) => true,
            DriverError::Backend(_) => false,
        }
    }
}

impl Transient for ScrapeError {
    fn is_transient(&self) -> bool {
        match self {
            ScrapeError::CardNotFound(_)
            | ScrapeError::StaleView(_)
            | ScrapeError::ClickIntercepted(_) => true,
            ScrapeError::Driver(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Exponential backoff, doubling per attempt and capped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 4_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Delay before retry number `attempt` (1-based: after the first failure it is 1)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    /// Whether another attempt is allowed after `attempts_made` failures of `error`
    pub fn should_retry<E: Transient>(&self, attempts_made: u32, error: &E) -> bool {
        attempts_made < self.max_attempts && error.is_transient()
    }
}
