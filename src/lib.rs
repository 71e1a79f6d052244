//! # Round-Trip Flights Library
//!
//! Searches Google Flights through a browser session and pairs outbound
//! flights with return flights into priced round-trip combinations.
//!
//! The browser is abstracted behind [`PageDriver`]; a chromiumoxide-backed
//! driver ships behind the `chromium` feature.

pub mod config;
pub mod driver;
pub mod engine;
pub mod extract;
pub mod form;
pub mod logging;
pub mod model;
pub mod parser;
pub mod retry;
pub mod select;
pub mod sink;
pub mod summary;

#[cfg(feature = "chromium")]
pub mod chromium;

use thiserror::Error;
use tracing::instrument;

// Re-export main types for convenience
pub use config::{CleanupPolicy, ScraperConfig, WaitStrategy};
pub use driver::{ClickStrategy, DriverError, Key, Locator, PageDriver, WaitCondition};
pub use engine::{RoundTripEngine, WalkState};
pub use form::SearchForm;
pub use model::*;
pub use parser::FlightCardParser;
pub use retry::{RetryPolicy, Transient};
pub use select::select_diverse_options;
pub use sink::{FlightSink, JsonLinesSink, MemorySink, NullSink, SinkError};
pub use summary::ResultAggregator;

/// Error types for the scraping pipeline
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Search submission failed: {0}")]
    SearchSubmission(String),

    #[error("Expected element never rendered: {0}")]
    CardNotFound(String),

    #[error("Page still shows the previous view: {0}")]
    StaleView(String),

    #[error("Click intercepted: {0}")]
    ClickIntercepted(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("HTML parsing failed: {0}")]
    ParseError(String),

    #[error("Invalid search parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Main public API function: run one round-trip search on the given page
#[instrument(level = "info", skip(driver, sink, config))]
pub async fn search_round_trips<D: PageDriver, S: FlightSink>(
    driver: &mut D,
    sink: &mut S,
    params: SearchParams,
    config: &ScraperConfig,
) -> SearchOutcome {
    match RoundTripEngine::new(config) {
        Ok(engine) => engine.run(driver, sink, &params).await,
        Err(e) => SearchOutcome::Failed(SearchFailure {
            search_params: params,
            reason: FailureReason::Configuration(e.to_string()),
            timestamp: chrono::Utc::now(),
        }),
    }
}
