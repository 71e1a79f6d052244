//! Scraper configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::ScrapeError;

pub const DEFAULT_BASE_URL: &str = "https://www.google.com/travel/flights";

/// How the engine decides a page transition has settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    /// Wait for the expected selector to render
    Selector,
    /// Wait for the network to go idle
    NetworkIdle,
    /// Sleep for `settle_delay_ms`
    FixedDelay,
}

/// What happens to the browser once a run finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    CloseBrowser,
    KeepOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub base_url: String,
    pub headless: bool,
    pub wait_strategy: WaitStrategy,
    /// Upper bound on outbound flights walked per run
    pub max_combinations: usize,
    pub cleanup: CleanupPolicy,
    pub results_timeout_ms: u64,
    pub step_timeout_ms: u64,
    pub settle_delay_ms: u64,
    /// Cards taken from the first matching selector
    pub max_cards: usize,
    /// Re-reads of a results page whose container rendered before its cards
    pub results_retry: RetryPolicy,
    pub return_retry: RetryPolicy,
    /// Return option to pick (1-based, in price order); cheapest when unset
    pub return_index: Option<usize>,
    pub expand_details: bool,
    pub max_detail_expansions: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            headless: true,
            wait_strategy: WaitStrategy::Selector,
            max_combinations: 10,
            cleanup: CleanupPolicy::CloseBrowser,
            results_timeout_ms: 20_000,
            step_timeout_ms: 10_000,
            settle_delay_ms: 1_000,
            max_cards: 30,
            results_retry: RetryPolicy::default(),
            return_retry: RetryPolicy::default(),
            return_index: None,
            expand_details: false,
            max_detail_expansions: 3,
        }
    }
}

impl ScraperConfig {
    /// Load a (possibly partial) JSON config over the defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScrapeError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: ScraperConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.base_url.trim().is_empty() {
            return Err(ScrapeError::Config("base_url must not be empty".to_string()));
        }
        if self.results_timeout_ms == 0 || self.step_timeout_ms == 0 {
            return Err(ScrapeError::Config("timeouts must be greater than zero".to_string()));
        }
        if self.max_cards == 0 {
            return Err(ScrapeError::Config("max_cards must be greater than zero".to_string()));
        }
        if self.max_combinations == 0 {
            return Err(ScrapeError::Config(
                "max_combinations must be greater than zero".to_string(),
            ));
        }
        if self.results_retry.max_attempts == 0 || self.return_retry.max_attempts == 0 {
            return Err(ScrapeError::Config(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if self.return_index == Some(0) {
            return Err(ScrapeError::Config("return_index is 1-based".to_string()));
        }
        Ok(())
    }

    pub fn results_timeout(&self) -> Duration {
        Duration::from_millis(self.results_timeout_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
