//! Search form walk-through: origin, destination, dates, submit

use tracing::{debug, info, instrument, warn};

use crate::config::{ScraperConfig, WaitStrategy};
use crate::driver::{click_with_fallback, DriverError, Key, Locator, PageDriver, WaitCondition};
use crate::model::SearchParams;
use crate::parser::CARD_SELECTORS;
use crate::ScrapeError;

const ORIGIN_FIELD: (&str, &str) = ("combobox", "Where from?");
const DESTINATION_FIELD: (&str, &str) = ("combobox", "Where to?");
const AUTOCOMPLETE_OPTION: &str = r#"ul[role="listbox"] li[role="option"]"#;
const DEPARTURE_FIELD: &str = r#"input[aria-label="Departure"]"#;
const RETURN_FIELD: &str = r#"input[aria-label="Return"]"#;
const SEARCH_LABEL: &str = "Search";

/// Extra containers that mean the results page rendered, besides the cards themselves
const RESULTS_CONTAINERS: &[&str] = &[r#"div[role="main"] ul.Rk10dc"#, "div.FXkZv"];

/// Drives the search form and submits it
pub struct SearchForm<'a> {
    config: &'a ScraperConfig,
}

impl<'a> SearchForm<'a> {
    pub fn new(config: &'a ScraperConfig) -> Self {
        Self { config }
    }

    /// Fill and submit the form, returning the results page URL.
    ///
    /// Fails with `SearchSubmission` when the results never render within
    /// the results timeout. No internal retry.
    #[instrument(
        level = "info",
        skip(self, driver),
        fields(origin = %params.origin, destination = %params.destination)
    )]
    pub async fn submit_search<D: PageDriver>(
        &self,
        driver: &mut D,
        params: &SearchParams,
    ) -> Result<String, ScrapeError> {
        info!(url = %self.config.base_url, "Opening flight search page");
        driver.goto(&self.config.base_url).await.map_err(|e| {
            ScrapeError::SearchSubmission(format!("could not open search page: {}", e))
        })?;
        self.settle(driver).await;

        self.enter_airport(driver, ORIGIN_FIELD, &params.origin)
            .await
            .map_err(|e| ScrapeError::SearchSubmission(format!("origin entry failed: {}", e)))?;
        self.enter_airport(driver, DESTINATION_FIELD, &params.destination)
            .await
            .map_err(|e| {
                ScrapeError::SearchSubmission(format!("destination entry failed: {}", e))
            })?;

        self.enter_dates(driver, params)
            .await
            .map_err(|e| ScrapeError::SearchSubmission(format!("date entry failed: {}", e)))?;

        self.trigger_search(driver).await.map_err(|e| {
            ScrapeError::SearchSubmission(format!("could not trigger search: {}", e))
        })?;

        let mut ready: Vec<&str> = CARD_SELECTORS.to_vec();
        ready.extend_from_slice(RESULTS_CONTAINERS);
        driver
            .wait_for(&WaitCondition::any_of(&ready), self.config.results_timeout())
            .await
            .map_err(|e| {
                ScrapeError::SearchSubmission(format!("results page never appeared: {}", e))
            })?;

        let url = driver.current_url().await?;
        info!(results_url = %url, "Search submitted");
        Ok(url)
    }

    async fn enter_airport<D: PageDriver>(
        &self,
        driver: &mut D,
        (role, name): (&str, &str),
        text: &str,
    ) -> Result<(), DriverError> {
        let field = driver
            .locate(&Locator::role(role, name))
            .await?
            .ok_or_else(|| DriverError::NotFound(format!("{} field '{}'", role, name)))?;

        click_with_fallback(driver, &field, name).await?;
        driver.fill(&field, text).await?;
        self.settle(driver).await;

        // Suggestions do not always render
        match driver.locate(&Locator::css(AUTOCOMPLETE_OPTION)).await? {
            Some(option) => {
                debug!(field = name, "Confirming first autocomplete suggestion");
                click_with_fallback(driver, &option, "autocomplete option").await?;
            }
            None => {
                debug!(field = name, "No autocomplete suggestion, confirming with Enter");
                driver.press_key(Key::Enter).await?;
            }
        }
        self.settle(driver).await;
        Ok(())
    }

    async fn enter_dates<D: PageDriver>(
        &self,
        driver: &mut D,
        params: &SearchParams,
    ) -> Result<(), DriverError> {
        let departure = driver
            .locate(&Locator::css(DEPARTURE_FIELD))
            .await?
            .ok_or_else(|| DriverError::NotFound("departure date field".to_string()))?;
        driver.fill(&departure, &params.departure_date).await?;

        if let Some(return_date) = &params.return_date {
            let return_field = driver
                .locate(&Locator::css(RETURN_FIELD))
                .await?
                .ok_or_else(|| DriverError::NotFound("return date field".to_string()))?;
            driver.fill(&return_field, return_date).await?;
        }

        // Day selection, then calendar close
        driver.press_key(Key::Enter).await?;
        self.settle(driver).await;
        driver.press_key(Key::Enter).await?;
        self.settle(driver).await;
        Ok(())
    }

    async fn trigger_search<D: PageDriver>(&self, driver: &mut D) -> Result<(), DriverError> {
        for locator in [Locator::role("button", SEARCH_LABEL), Locator::text(SEARCH_LABEL)] {
            let Some(button) = driver.locate(&locator).await? else {
                continue;
            };
            match click_with_fallback(driver, &button, SEARCH_LABEL).await {
                Ok(_) => return Ok(()),
                Err(e) => warn!(?locator, error = %e, "Search button click failed, trying next"),
            }
        }

        debug!("No clickable search button, submitting with Enter");
        driver.press_key(Key::Enter).await
    }

    async fn settle<D: PageDriver>(&self, driver: &mut D) {
        match self.config.wait_strategy {
            WaitStrategy::NetworkIdle => {
                if let Err(e) = driver
                    .wait_for(&WaitCondition::NetworkIdle, self.config.step_timeout())
                    .await
                {
                    debug!(error = %e, "Network did not go idle, continuing");
                }
            }
            WaitStrategy::Selector | WaitStrategy::FixedDelay => {
                driver.pause(self.config.settle_delay()).await;
            }
        }
    }
}
