//! Round-trip combination engine
//!
//! Walks the results UI once per selected outbound flight:
//! results -> return selection -> booking summary -> back to results.
//! A failure inside one walk skips that outbound flight; only a failed
//! search submission ends the run early.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ScraperConfig, WaitStrategy};
use crate::driver::{click_with_fallback, PageDriver, WaitCondition};
use crate::extract::{extract_flight_details, extract_total_price};
use crate::form::SearchForm;
use crate::model::{
    FailureReason, FlightDetails, FlightOption, FlightOptionEntry, FlightSearchResult, OutboundLeg,
    ReturnFlightOption, ReturnLeg, RoundTripCombination, SearchFailure, SearchOutcome, SearchParams,
};
use crate::parser::{has_no_results_marker, FlightCardParser, ParsedCards, CARD_SELECTORS};
use crate::retry::Transient;
use crate::select::select_diverse_options;
use crate::sink::FlightSink;
use crate::summary::ResultAggregator;
use crate::ScrapeError;

/// Containers that mark the booking summary view
pub const BOOKING_SELECTORS: &[&str] = &[
    "div.TQqf0e",
    "div.SJ7Rgc",
    r#"[aria-label*="Booking options"]"#,
    r#"[role="main"] [data-booking-summary]"#,
];

/// Per-card button that expands segment details
pub const DETAIL_TOGGLE_SELECTOR: &str = r#"button[aria-label*="Flight details"]"#;

const RETURN_UNAVAILABLE_NOTE: &str = "Return flight details unavailable for this outbound option";
const ONE_WAY_NOTE: &str = "One-way search: no return flight";

/// Position in the per-outbound UI walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    AtResults,
    AtReturnSelection {
        outbound_index: usize,
    },
    AtBookingSummary {
        outbound_index: usize,
        return_index: usize,
    },
}

/// Price, airline, departure and arrival of one card
type CardFingerprint = (String, Option<String>, Option<String>, Option<String>);

/// Result of one completed walk
#[derive(Debug, Clone)]
struct WalkOutput {
    return_flight: ReturnFlightOption,
    total_price: Option<String>,
}

/// What the results page turned out to hold
enum ResultsPage {
    Cards {
        selector: String,
        options: Vec<FlightOption>,
    },
    NoFlights,
}

pub struct RoundTripEngine<'a> {
    config: &'a ScraperConfig,
    parser: FlightCardParser,
}

impl<'a> RoundTripEngine<'a> {
    pub fn new(config: &'a ScraperConfig) -> Result<Self, ScrapeError> {
        config.validate()?;
        let parser = FlightCardParser::new()?.with_max_cards(config.max_cards);
        Ok(Self { config, parser })
    }

    /// Run a complete search. Always returns an outcome; never panics on page trouble.
    #[instrument(
        level = "info",
        skip(self, driver, sink),
        fields(origin = %params.origin, destination = %params.destination)
    )]
    pub async fn run<D: PageDriver, S: FlightSink>(
        &self,
        driver: &mut D,
        sink: &mut S,
        params: &SearchParams,
    ) -> SearchOutcome {
        if let Err(e) = params.validate() {
            return failed(params, FailureReason::InvalidParams(e.to_string()));
        }

        let search_url = match SearchForm::new(self.config).submit_search(driver, params).await {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Search submission failed");
                return failed(params, FailureReason::SearchSubmission(e.to_string()));
            }
        };

        let origin = params.origin_code();
        let destination = params.destination_code();
        let parser = self
            .parser
            .clone()
            .with_known_route(origin.as_deref(), destination.as_deref());

        let (selector, outbound_options) = match self.read_results(driver, &parser).await {
            Ok(ResultsPage::Cards { selector, options }) => (selector, options),
            Ok(ResultsPage::NoFlights) => {
                info!("Search returned no flights");
                return completed(params, Vec::new(), Vec::new());
            }
            Err(e) => {
                warn!(error = %e, "No flight cards recognized on results page");
                return failed(params, FailureReason::PageNotRecognized(e.to_string()));
            }
        };
        info!(outbound_options = outbound_options.len(), "Outbound flights extracted");

        for option in &outbound_options {
            if let Err(e) = sink.record_option(option).await {
                warn!(index = option.index, error = %e, "Sink rejected outbound option");
            }
        }

        let results_fingerprint = outbound_fingerprint(&outbound_options);
        let limit = params.num_options.min(self.config.max_combinations);
        let selected = if limit < outbound_options.len() {
            select_diverse_options(&outbound_options, limit)
        } else {
            outbound_options
        };
        debug!(selected = selected.len(), limit, "Outbound flights selected");

        let mut details = if self.config.expand_details {
            self.expand_details(driver, &parser, &search_url, &selector, &selected)
                .await
        } else {
            HashMap::new()
        };

        let mut entries = Vec::with_capacity(selected.len());
        let mut combinations: Vec<RoundTripCombination> = Vec::new();
        let mut first_failure: Option<String> = None;

        for (position, outbound) in selected.iter().enumerate() {
            let option_number = position + 1;
            let card_details = details.remove(&outbound.card_position);

            if params.return_date.is_none() {
                let note = ReturnLeg::Note {
                    note: ONE_WAY_NOTE.to_string(),
                };
                entries.push(entry(option_number, outbound, note, None, card_details));
                continue;
            }

            let walked = self
                .walk(driver, &parser, &search_url, &selector, &results_fingerprint, outbound)
                .await;
            match walked {
                Ok(output) => {
                    let combination = RoundTripCombination {
                        combination_id: combinations.len() as u32 + 1,
                        outbound: outbound.clone(),
                        return_flight: output.return_flight.clone(),
                        total_price: output.total_price.clone(),
                        timestamp: Utc::now(),
                    };
                    info!(
                        combination_id = combination.combination_id,
                        outbound_index = outbound.index,
                        total_price = ?combination.total_price,
                        "Recorded round-trip combination"
                    );
                    if let Err(e) = sink.record_combination(&combination).await {
                        warn!(
                            combination_id = combination.combination_id,
                            error = %e,
                            "Sink rejected combination"
                        );
                    }
                    entries.push(entry(
                        option_number,
                        outbound,
                        ReturnLeg::Flight(output.return_flight),
                        output.total_price,
                        card_details,
                    ));
                    combinations.push(combination);
                }
                Err(e) => {
                    warn!(outbound_index = outbound.index, error = %e, "Skipping outbound flight");
                    first_failure.get_or_insert_with(|| e.to_string());
                    entries.push(entry(
                        option_number,
                        outbound,
                        ReturnLeg::Note {
                            note: RETURN_UNAVAILABLE_NOTE.to_string(),
                        },
                        None,
                        card_details,
                    ));
                }
            }
        }

        if combinations.is_empty() {
            if let Some(reason) = first_failure {
                error!(reason = %reason, "No outbound flight could be paired with a return");
                return failed(params, FailureReason::PageNotRecognized(reason));
            }
        }

        info!(
            entries = entries.len(),
            combinations = combinations.len(),
            "Round-trip search finished"
        );
        completed(params, entries, combinations)
    }

    /// Parse the results page, re-reading while its container shows but no cards do
    async fn read_results<D: PageDriver>(
        &self,
        driver: &mut D,
        parser: &FlightCardParser,
    ) -> Result<ResultsPage, ScrapeError> {
        let policy = &self.config.results_retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let html = driver.content().await?;
            match parser.parse_outbound(&html) {
                ParsedCards {
                    selector: Some(selector),
                    options,
                } if !options.is_empty() => return Ok(ResultsPage::Cards { selector, options }),
                _ if has_no_results_marker(&parser.page_text(&html)) => {
                    return Ok(ResultsPage::NoFlights)
                }
                _ => {
                    let e = ScrapeError::CardNotFound("no flight cards on results page".into());
                    if !policy.should_retry(attempt, &e) {
                        return Err(e);
                    }
                    let delay = policy.backoff(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Results container rendered without cards, reading again"
                    );
                    driver.pause(delay).await;
                }
            }
        }
    }

    /// One results -> return -> booking -> results cycle for a single outbound flight
    async fn walk<D: PageDriver>(
        &self,
        driver: &mut D,
        parser: &FlightCardParser,
        search_url: &str,
        selector: &str,
        results_fingerprint: &[CardFingerprint],
        outbound: &FlightOption,
    ) -> Result<WalkOutput, ScrapeError> {
        let mut state = WalkState::AtResults;
        let mut chosen: Option<ReturnFlightOption> = None;

        loop {
            debug!(?state, outbound_index = outbound.index, "Walk state");
            state = match state {
                WalkState::AtResults => {
                    // Card order and element handles do not survive interaction
                    self.open_results(driver, search_url).await?;
                    self.click_card(driver, selector, outbound.card_position, "outbound card")
                        .await?;
                    driver.pause(self.config.settle_delay()).await;
                    WalkState::AtReturnSelection {
                        outbound_index: outbound.index,
                    }
                }
                WalkState::AtReturnSelection { outbound_index } => {
                    let returns = self
                        .extract_returns(driver, parser, results_fingerprint)
                        .await?;
                    let return_selector = returns.selector.clone().ok_or_else(|| {
                        ScrapeError::CardNotFound("return flight list".to_string())
                    })?;
                    let choice = self.choose_return(returns.options)?;
                    self.click_card(driver, &return_selector, choice.card_position, "return card")
                        .await?;
                    let return_index = choice.index;
                    chosen = Some(choice);
                    WalkState::AtBookingSummary {
                        outbound_index,
                        return_index,
                    }
                }
                WalkState::AtBookingSummary { outbound_index, .. } => {
                    self.await_step(driver, BOOKING_SELECTORS).await?;
                    let html = driver.content().await?;
                    let total_price = extract_total_price(&parser.page_text(&html));
                    if total_price.is_none() {
                        warn!(outbound_index, "Total price unresolvable on booking summary");
                    }

                    self.leave_booking(driver).await;

                    let return_flight = chosen.take().ok_or_else(|| {
                        ScrapeError::CardNotFound("selected return flight".to_string())
                    })?;
                    return Ok(WalkOutput {
                        return_flight,
                        total_price,
                    });
                }
            };
        }
    }

    async fn open_results<D: PageDriver>(
        &self,
        driver: &mut D,
        search_url: &str,
    ) -> Result<(), ScrapeError> {
        driver.goto(search_url).await?;
        self.await_step(driver, CARD_SELECTORS).await
    }

    /// Re-locate the cards and click the one at `position`
    async fn click_card<D: PageDriver>(
        &self,
        driver: &mut D,
        selector: &str,
        position: usize,
        what: &str,
    ) -> Result<(), ScrapeError> {
        let cards = driver.locate_all(selector).await?;
        let card = cards.get(position).ok_or_else(|| {
            ScrapeError::CardNotFound(format!(
                "{} at position {} ({} cards present)",
                what,
                position,
                cards.len()
            ))
        })?;
        click_with_fallback(driver, card, what)
            .await
            .map_err(|e| ScrapeError::ClickIntercepted(e.to_string()))?;
        Ok(())
    }

    /// Parse the return list.
    ///
    /// An empty list is reloaded between attempts. A list identical to the
    /// outbound results means the page has not switched yet, so it is only
    /// read again after the backoff.
    async fn extract_returns<D: PageDriver>(
        &self,
        driver: &mut D,
        parser: &FlightCardParser,
        results_fingerprint: &[CardFingerprint],
    ) -> Result<ParsedCards<ReturnFlightOption>, ScrapeError> {
        let policy = &self.config.return_retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self
                .try_extract_returns(driver, parser, results_fingerprint)
                .await
            {
                Ok(returns) => return Ok(returns),
                Err(e) if policy.should_retry(attempt, &e) => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Return options not ready"
                    );
                    driver.pause(delay).await;
                    if !matches!(e, ScrapeError::StaleView(_)) {
                        let url = driver.current_url().await?;
                        driver.goto(&url).await?;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_extract_returns<D: PageDriver>(
        &self,
        driver: &mut D,
        parser: &FlightCardParser,
        results_fingerprint: &[CardFingerprint],
    ) -> Result<ParsedCards<ReturnFlightOption>, ScrapeError> {
        self.await_step(driver, CARD_SELECTORS).await?;
        let html = driver.content().await?;
        let returns = parser.parse_returns(&html);
        if returns.options.is_empty() {
            return Err(ScrapeError::CardNotFound("no return flight options".to_string()));
        }
        if return_fingerprint(&returns.options) == results_fingerprint {
            return Err(ScrapeError::StaleView(
                "return list still shows the outbound results".to_string(),
            ));
        }
        Ok(returns)
    }

    /// Caller-chosen return (1-based, price order) or the cheapest
    fn choose_return(
        &self,
        mut options: Vec<ReturnFlightOption>,
    ) -> Result<ReturnFlightOption, ScrapeError> {
        if let Some(wanted) = self.config.return_index {
            if wanted <= options.len() {
                return Ok(options.swap_remove(wanted - 1));
            }
            warn!(
                wanted,
                available = options.len(),
                "Requested return option missing, using cheapest"
            );
        }
        if options.is_empty() {
            return Err(ScrapeError::CardNotFound("no return flight options".to_string()));
        }
        Ok(options.swap_remove(0))
    }

    /// Two back-navigations undo the return and outbound selections
    async fn leave_booking<D: PageDriver>(&self, driver: &mut D) {
        for _ in 0..2 {
            if let Err(e) = driver.go_back().await {
                // The next walk reloads the results URL anyway
                debug!(error = %e, "Back navigation failed");
                break;
            }
        }
    }

    /// Bounded wait for a page transition, per the configured wait strategy
    async fn await_step<D: PageDriver>(
        &self,
        driver: &mut D,
        selectors: &[&str],
    ) -> Result<(), ScrapeError> {
        match self.config.wait_strategy {
            WaitStrategy::Selector => driver
                .wait_for(&WaitCondition::any_of(selectors), self.config.step_timeout())
                .await
                .map_err(|e| ScrapeError::CardNotFound(e.to_string())),
            WaitStrategy::NetworkIdle => driver
                .wait_for(&WaitCondition::NetworkIdle, self.config.step_timeout())
                .await
                .map_err(ScrapeError::from),
            WaitStrategy::FixedDelay => {
                driver.pause(self.config.settle_delay()).await;
                Ok(())
            }
        }
    }

    /// Expand, read and collapse the detail panel of up to `max_detail_expansions` cards
    async fn expand_details<D: PageDriver>(
        &self,
        driver: &mut D,
        parser: &FlightCardParser,
        search_url: &str,
        selector: &str,
        selected: &[FlightOption],
    ) -> HashMap<usize, FlightDetails> {
        let mut details = HashMap::new();

        if let Err(e) = self.open_results(driver, search_url).await {
            warn!(error = %e, "Could not reopen results for detail expansion");
            return details;
        }

        for outbound in selected.iter().take(self.config.max_detail_expansions) {
            match self
                .expand_one(driver, parser, selector, outbound.card_position)
                .await
            {
                Ok(found) => {
                    debug!(
                        outbound_index = outbound.index,
                        flight_numbers = found.flight_numbers.len(),
                        "Details extracted"
                    );
                    details.insert(outbound.card_position, found);
                }
                Err(e) if e.is_transient() => {
                    warn!(outbound_index = outbound.index, error = %e, "Detail expansion failed");
                }
                Err(e) => {
                    warn!(error = %e, "Detail expansion aborted");
                    break;
                }
            }
        }

        details
    }

    async fn expand_one<D: PageDriver>(
        &self,
        driver: &mut D,
        parser: &FlightCardParser,
        selector: &str,
        position: usize,
    ) -> Result<FlightDetails, ScrapeError> {
        self.click_card(driver, DETAIL_TOGGLE_SELECTOR, position, "detail toggle")
            .await?;
        driver.pause(self.config.settle_delay()).await;

        let html = driver.content().await?;
        let text = parser.card_text_at(&html, selector, position).unwrap_or_default();
        let found = extract_flight_details(&text);

        self.click_card(driver, DETAIL_TOGGLE_SELECTOR, position, "detail toggle")
            .await?;
        driver.pause(self.config.settle_delay()).await;
        Ok(found)
    }
}

fn outbound_fingerprint(options: &[FlightOption]) -> Vec<CardFingerprint> {
    options
        .iter()
        .map(|o| {
            (
                o.price.clone(),
                o.airline.clone(),
                o.departure_time.clone(),
                o.arrival_time.clone(),
            )
        })
        .collect()
}

fn return_fingerprint(options: &[ReturnFlightOption]) -> Vec<CardFingerprint> {
    options
        .iter()
        .map(|o| {
            (
                o.price.clone(),
                o.airline.clone(),
                o.departure_time.clone(),
                o.arrival_time.clone(),
            )
        })
        .collect()
}

fn entry(
    option_number: usize,
    outbound: &FlightOption,
    return_leg: ReturnLeg,
    total_price: Option<String>,
    details: Option<FlightDetails>,
) -> FlightOptionEntry {
    FlightOptionEntry {
        option_number,
        basic_info: outbound.clone(),
        outbound: OutboundLeg::from(outbound),
        return_leg,
        total_price,
        emissions: outbound.emissions.clone(),
        details,
    }
}

fn completed(
    params: &SearchParams,
    entries: Vec<FlightOptionEntry>,
    combinations: Vec<RoundTripCombination>,
) -> SearchOutcome {
    let basics: Vec<FlightOption> = entries.iter().map(|e| e.basic_info.clone()).collect();
    let combination_summary = if combinations.is_empty() {
        None
    } else {
        Some(ResultAggregator::summarize_combinations(&combinations))
    };
    SearchOutcome::Completed(FlightSearchResult {
        search_params: params.clone(),
        summary: ResultAggregator::summarize(&basics),
        combination_summary,
        flight_options: entries,
        combinations,
        timestamp: Utc::now(),
        error: None,
    })
}

fn failed(params: &SearchParams, reason: FailureReason) -> SearchOutcome {
    SearchOutcome::Failed(SearchFailure {
        search_params: params.clone(),
        reason,
        timestamp: Utc::now(),
    })
}
