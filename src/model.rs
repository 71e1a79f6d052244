//! Data model for outbound options, return options and round-trip combinations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::extract;
use crate::ScrapeError;

/// Price value used when a price string cannot be parsed. Sorts after every real price.
pub const UNKNOWN_PRICE: u32 = 999_999;

/// Stop count as shown on a flight card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stops {
    #[serde(rename = "Nonstop")]
    Nonstop,
    #[serde(rename = "1 stop")]
    OneStop,
    #[serde(rename = "2 stops")]
    TwoStops,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Stops {
    pub fn is_nonstop(&self) -> bool {
        matches!(self, Stops::Nonstop)
    }
}

impl fmt::Display for Stops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stops::Nonstop => "Nonstop",
            Stops::OneStop => "1 stop",
            Stops::TwoStops => "2 stops",
            Stops::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Connection wait at an intermediate airport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layover {
    pub duration: String,
    pub airport: String,
}

/// One outbound flight card, parsed from its rendered text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightOption {
    /// 1-based ordinal among the cards that carried a price
    pub index: usize,
    /// 0-based position of the card among all matched card elements
    pub card_position: usize,
    pub price: String,
    pub price_value: u32,
    pub airline: Option<String>,
    pub departure_time: Option<String>,
    pub arrival_time: Option<String>,
    pub duration: Option<String>,
    pub stops: Stops,
    pub origin_airport: Option<String>,
    pub destination_airport: Option<String>,
    pub layover: Option<Layover>,
    pub emissions: Option<String>,
}

impl FlightOption {
    /// Build an option from one card's visible text.
    ///
    /// Returns `None` when the text carries no price: a card without a price
    /// is not a bookable option.
    pub fn from_card_text(
        index: usize,
        card_position: usize,
        text: &str,
        known_origin: Option<&str>,
        known_destination: Option<&str>,
    ) -> Option<Self> {
        let price = extract::extract_price(text)?;
        let price_value = extract::extract_price_value(Some(&price));
        let (departure_time, arrival_time) = extract::extract_times(text);
        let (origin_airport, destination_airport) =
            extract::extract_airports(text, known_origin, known_destination);

        Some(Self {
            index,
            card_position,
            price,
            price_value,
            airline: extract::extract_airline(text),
            departure_time,
            arrival_time,
            duration: extract::extract_duration(text),
            stops: extract::extract_stops(text),
            origin_airport,
            destination_airport,
            layover: extract::extract_layover_info(text),
            emissions: extract::extract_emissions(text),
        })
    }

    /// Key used to tell effectively identical flights apart during selection
    pub fn dedup_key(&self) -> (Option<String>, Stops, u32) {
        (self.airline.clone(), self.stops, self.price_value)
    }
}

/// A return-leg card. Airports are implied by the search and not re-extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnFlightOption {
    pub index: usize,
    pub card_position: usize,
    pub price: String,
    pub price_value: u32,
    pub airline: Option<String>,
    pub departure_time: Option<String>,
    pub arrival_time: Option<String>,
    pub duration: Option<String>,
    pub stops: Stops,
    pub layover: Option<Layover>,
    pub emissions: Option<String>,
}

impl ReturnFlightOption {
    pub fn from_card_text(index: usize, card_position: usize, text: &str) -> Option<Self> {
        let price = extract::extract_price(text)?;
        let price_value = extract::extract_price_value(Some(&price));
        let (departure_time, arrival_time) = extract::extract_times(text);

        Some(Self {
            index,
            card_position,
            price,
            price_value,
            airline: extract::extract_airline(text),
            departure_time,
            arrival_time,
            duration: extract::extract_duration(text),
            stops: extract::extract_stops(text),
            layover: extract::extract_layover_info(text),
            emissions: extract::extract_emissions(text),
        })
    }
}

/// One outbound choice paired with one return choice
#[derive(Debug, Clone, Serialize)]
pub struct RoundTripCombination {
    /// Strictly increasing, 1-based, assigned when the pairing is recorded
    pub combination_id: u32,
    pub outbound: FlightOption,
    pub return_flight: ReturnFlightOption,
    pub total_price: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Search input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Free-text city or 3-letter airport code
    pub origin: String,
    pub destination: String,
    /// Human date string, e.g. "Aug 10, 2025"
    pub departure_date: String,
    pub return_date: Option<String>,
    pub num_options: usize,
}

impl SearchParams {
    pub const MAX_OPTIONS: usize = 30;

    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        departure_date: impl Into<String>,
        return_date: Option<String>,
        num_options: usize,
    ) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            departure_date: departure_date.into(),
            return_date,
            num_options,
        }
    }

    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.origin.trim().is_empty() {
            return Err(ScrapeError::InvalidParams("origin must not be empty".to_string()));
        }
        if self.destination.trim().is_empty() {
            return Err(ScrapeError::InvalidParams("destination must not be empty".to_string()));
        }
        if self.departure_date.trim().is_empty() {
            return Err(ScrapeError::InvalidParams("departure_date must not be empty".to_string()));
        }
        if self.num_options == 0 || self.num_options > Self::MAX_OPTIONS {
            return Err(ScrapeError::InvalidParams(format!(
                "num_options must be 1-{}, got {}",
                Self::MAX_OPTIONS,
                self.num_options
            )));
        }
        Ok(())
    }

    /// Airport code of the origin, when the caller passed one. Case-insensitive.
    pub fn origin_code(&self) -> Option<String> {
        as_airport_code(&self.origin)
    }

    pub fn destination_code(&self) -> Option<String> {
        as_airport_code(&self.destination)
    }
}

fn as_airport_code(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(trimmed.to_ascii_uppercase())
    } else {
        None
    }
}

/// Inclusive price range over parsed price values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceRange {
    pub min: u32,
    pub max: u32,
}

/// Presentation summary over a list of options or combinations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_options: usize,
    pub price_range: Option<PriceRange>,
    pub nonstop_available: bool,
    pub airlines_included: BTreeSet<String>,
}

/// Outbound fields repeated on each output entry
#[derive(Debug, Clone, Serialize)]
pub struct OutboundLeg {
    pub departure_time: Option<String>,
    pub arrival_time: Option<String>,
    pub duration: Option<String>,
    pub airline: Option<String>,
    pub stops: Stops,
    pub price: String,
}

impl From<&FlightOption> for OutboundLeg {
    fn from(option: &FlightOption) -> Self {
        Self {
            departure_time: option.departure_time.clone(),
            arrival_time: option.arrival_time.clone(),
            duration: option.duration.clone(),
            airline: option.airline.clone(),
            stops: option.stops,
            price: option.price.clone(),
        }
    }
}

/// Return side of an output entry: a selected flight, or a note explaining its absence
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReturnLeg {
    Flight(ReturnFlightOption),
    Note { note: String },
}

/// Expanded card information for one outbound flight
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlightDetails {
    pub flight_numbers: Vec<String>,
    pub aircraft: Vec<String>,
    pub layovers: Vec<Layover>,
}

/// One entry of the top-level result
#[derive(Debug, Clone, Serialize)]
pub struct FlightOptionEntry {
    pub option_number: usize,
    pub basic_info: FlightOption,
    pub outbound: OutboundLeg,
    #[serde(rename = "return")]
    pub return_leg: ReturnLeg,
    pub total_price: Option<String>,
    pub emissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<FlightDetails>,
}

/// Top-level result object
#[derive(Debug, Clone, Serialize)]
pub struct FlightSearchResult {
    pub search_params: SearchParams,
    pub flight_options: Vec<FlightOptionEntry>,
    pub combinations: Vec<RoundTripCombination>,
    pub summary: Summary,
    /// Summary over the recorded combinations; absent when none were recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combination_summary: Option<Summary>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a whole search produced nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The search form never led to a results page
    SearchSubmission(String),
    /// Results rendered but their structure was not recognized
    PageNotRecognized(String),
    InvalidParams(String),
    /// The engine could not be set up from its configuration
    Configuration(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::SearchSubmission(msg) => {
                write!(f, "search submission failed: {}", msg)
            }
            FailureReason::PageNotRecognized(msg) => {
                write!(f, "page structure not recognized: {}", msg)
            }
            FailureReason::InvalidParams(msg) => write!(f, "invalid search parameters: {}", msg),
            FailureReason::Configuration(msg) => {
                write!(f, "scraper configuration rejected: {}", msg)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchFailure {
    pub search_params: SearchParams,
    pub reason: FailureReason,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one engine run
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Completed(FlightSearchResult),
    Failed(SearchFailure),
}

impl SearchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SearchOutcome::Failed(_))
    }

    /// Flatten into the result object; failures carry `error` and no options.
    pub fn into_result(self) -> FlightSearchResult {
        match self {
            SearchOutcome::Completed(result) => result,
            SearchOutcome::Failed(failure) => FlightSearchResult {
                search_params: failure.search_params,
                flight_options: Vec::new(),
                combinations: Vec::new(),
                summary: Summary::default(),
                combination_summary: None,
                timestamp: failure.timestamp,
                error: Some(failure.reason.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SearchParams {
        SearchParams::new("SFO", "JFK", "Aug 10, 2025", Some("Aug 17, 2025".to_string()), 5)
    }

    #[test]
    fn test_search_params_validation() {
        assert!(params().validate().is_ok());

        let mut empty_origin = params();
        empty_origin.origin = "  ".to_string();
        assert!(empty_origin.validate().is_err());

        let mut zero = params();
        zero.num_options = 0;
        assert!(zero.validate().is_err());

        let mut too_many = params();
        too_many.num_options = 31;
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn test_airport_codes_from_params() {
        let p = params();
        assert_eq!(p.origin_code().as_deref(), Some("SFO"));
        assert_eq!(p.destination_code().as_deref(), Some("JFK"));

        let city = SearchParams::new("San Francisco", " jfk ", "Aug 10, 2025", None, 3);
        assert_eq!(city.origin_code(), None);
        assert_eq!(city.destination_code().as_deref(), Some("JFK"));

        let not_a_code = SearchParams::new("LA1", "Rome", "Aug 10, 2025", None, 3);
        assert_eq!(not_a_code.origin_code(), None);
        assert_eq!(not_a_code.destination_code(), None);
    }

    #[test]
    fn test_lowercase_codes_win_over_card_text() {
        let p = SearchParams::new("sfo", "jfk", "Aug 10, 2025", None, 3);
        let text = "8:00 AM – 4:30 PM United Nonstop OAK–EWR $300";
        let option = FlightOption::from_card_text(
            1,
            0,
            text,
            p.origin_code().as_deref(),
            p.destination_code().as_deref(),
        )
        .unwrap();
        assert_eq!(option.origin_airport.as_deref(), Some("SFO"));
        assert_eq!(option.destination_airport.as_deref(), Some("JFK"));
    }

    #[test]
    fn test_card_without_price_is_not_an_option() {
        let no_price = FlightOption::from_card_text(1, 0, "Nonstop 10:00 AM United", None, None);
        assert!(no_price.is_none());
        assert!(ReturnFlightOption::from_card_text(1, 0, "Delta 2 stops").is_none());
    }

    #[test]
    fn test_stops_serialization() {
        assert_eq!(serde_json::to_string(&Stops::Nonstop).unwrap(), "\"Nonstop\"");
        assert_eq!(serde_json::to_string(&Stops::OneStop).unwrap(), "\"1 stop\"");
        assert_eq!(Stops::TwoStops.to_string(), "2 stops");
    }

    #[test]
    fn test_failed_outcome_into_result() {
        let outcome = SearchOutcome::Failed(SearchFailure {
            search_params: params(),
            reason: FailureReason::SearchSubmission("results never appeared".to_string()),
            timestamp: Utc::now(),
        });
        assert!(outcome.is_failed());

        let result = outcome.into_result();
        assert!(result.flight_options.is_empty());
        assert_eq!(result.summary, Summary::default());
        assert!(result.error.unwrap().contains("results never appeared"));
    }

    #[test]
    fn test_return_leg_note_serializes_flat() {
        let leg = ReturnLeg::Note {
            note: "unavailable".to_string(),
        };
        assert_eq!(serde_json::to_string(&leg).unwrap(), r#"{"note":"unavailable"}"#);
    }
}
