//! Field extraction from the visible text of one flight card
//!
//! Every function here is total: malformed or empty text yields `None`,
//! `Stops::Unknown` or the unknown-price sentinel, never an error.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{FlightDetails, Layover, Stops, UNKNOWN_PRICE};

const CURRENCY_CODES: &[&str] = &["USD", "EUR", "GBP", "CAD", "AUD", "JPY", "INR", "CHF", "MXN"];

/// Full names come before their short forms so the longer match wins.
const KNOWN_AIRLINES: &[&str] = &[
    "United Airlines",
    "United",
    "American Airlines",
    "American",
    "Delta Air Lines",
    "Delta",
    "Southwest Airlines",
    "Southwest",
    "JetBlue Airways",
    "JetBlue",
    "Alaska Airlines",
    "Alaska",
    "Spirit Airlines",
    "Spirit",
    "Frontier Airlines",
    "Frontier",
    "Hawaiian Airlines",
    "Hawaiian",
    "Sun Country Airlines",
    "Sun Country",
    "Allegiant Air",
    "Allegiant",
    "Breeze Airways",
    "Breeze",
    "Air Canada",
    "WestJet",
    "British Airways",
    "Virgin Atlantic",
    "Lufthansa",
    "Air France",
    "KLM",
    "Emirates",
    "Qatar Airways",
    "Turkish Airlines",
    "Singapore Airlines",
    "Cathay Pacific",
    "Japan Airlines",
    "All Nippon Airways",
    "Qantas",
    "Aer Lingus",
    "Iberia",
    "Icelandair",
    "Finnair",
    "Scandinavian Airlines",
    "Swiss",
    "Aeromexico",
    "LATAM",
    "Avianca",
    "Copa Airlines",
    "Volaris",
    "Ryanair",
    "easyJet",
    "Norse Atlantic",
];

const AIRLINE_WORD_HINTS: &[&str] = &["air", "jet", "wings", "line", "way"];

// Amount with optional thousands separators and cents
const AMOUNT: &str = r"(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{1,2})?";

static SYMBOL_PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"[$€£¥₹]\s?{}", AMOUNT)).unwrap());
static CODE_PREFIX_PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b(?:{})\s?{}", CURRENCY_CODES.join("|"), AMOUNT)).unwrap()
});
static CODE_SUFFIX_PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b{}\s?(?:{})\b", AMOUNT, CURRENCY_CODES.join("|"))).unwrap()
});
static BARE_PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,3}(?:,\d{3})+|\d{3,})\b").unwrap());
static TOTAL_PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:round[\s-]?trip\s+total|total)\b[^$€£¥₹\d]{{0,40}}([$€£¥₹]\s?{})",
        AMOUNT
    ))
    .unwrap()
});
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2}:\d{2})[\s\u{202f}]?([AP]M)\b").unwrap());
static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+\s?(?:hr|h)\s*\d+\s?(?:min|m)\b").unwrap());
static LAYOVER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(\d+\s?(?:hr|h)(?:\s*\d+\s?(?:min|m))?|\d+\s?(?:min|m))\s+in\s+([A-Z]{3})\b",
    )
    .unwrap()
});
static ROUTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{3})\s*(?:to|–|-|→)\s*([A-Z]{3})\b").unwrap());
static AIRPORT_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{3}\b").unwrap());
static AIRLINE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][A-Za-z]+)\s+(Airlines|Airways|Air|Express)\b").unwrap());
static AIRLINE_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bAir\s+([A-Z][a-z]+)\b").unwrap());
static CAPITALIZED_PAIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-z]+)\s+([A-Z][A-Za-z]*)\b").unwrap());
static EMISSIONS_KG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\d[\d,]*\s?kg\s?CO2e?\b").unwrap());
static EMISSIONS_PCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[+-]?\d+%\s?emissions").unwrap());
static FLIGHT_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][A-Z0-9]|[0-9][A-Z])\s(\d{1,4})\b").unwrap());
static AIRCRAFT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Boeing|Airbus|Embraer|Bombardier|ATR)\s+[A-Z]?\d{2,3}[A-Za-z0-9-]*").unwrap()
});

/// First price-looking token in the text.
///
/// Currency-tagged amounts win over bare numbers; a bare integer needs at
/// least three digits (or thousands separators) to count.
pub fn extract_price(text: &str) -> Option<String> {
    [
        &*SYMBOL_PRICE_RE,
        &*CODE_PREFIX_PRICE_RE,
        &*CODE_SUFFIX_PRICE_RE,
        &*BARE_PRICE_RE,
    ]
    .iter()
    .find_map(|re| re.find(text))
    .map(|m| m.as_str().trim().to_string())
}

/// Integer value of a price string, `UNKNOWN_PRICE` when it does not parse
pub fn extract_price_value(price: Option<&str>) -> u32 {
    let Some(price) = price else {
        return UNKNOWN_PRICE;
    };

    let numeric: String = price
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    match numeric.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => {
            let truncated = value.trunc();
            if truncated >= UNKNOWN_PRICE as f64 {
                UNKNOWN_PRICE
            } else {
                truncated as u32
            }
        }
        _ => UNKNOWN_PRICE,
    }
}

/// Departure and arrival times, taken from the first two distinct `H:MM AM/PM` tokens
pub fn extract_times(text: &str) -> (Option<String>, Option<String>) {
    let mut seen: Vec<String> = Vec::new();
    for caps in TIME_RE.captures_iter(text) {
        let time = format!("{} {}", &caps[1], caps[2].to_uppercase());
        if !seen.contains(&time) {
            seen.push(time);
        }
        if seen.len() == 2 {
            break;
        }
    }

    let mut times = seen.into_iter();
    (times.next(), times.next())
}

pub fn extract_duration(text: &str) -> Option<String> {
    DURATION_RE.find(text).map(|m| m.as_str().to_string())
}

/// Airline name: known names first, then name-shaped heuristics
pub fn extract_airline(text: &str) -> Option<String> {
    if let Some(name) = KNOWN_AIRLINES.iter().find(|name| text.contains(*name)) {
        return Some(name.to_string());
    }

    if let Some(caps) = AIRLINE_SUFFIX_RE.captures(text) {
        return Some(format!("{} {}", &caps[1], &caps[2]));
    }
    if let Some(caps) = AIRLINE_PREFIX_RE.captures(text) {
        return Some(format!("Air {}", &caps[1]));
    }

    CAPITALIZED_PAIR_RE.captures_iter(text).find_map(|caps| {
        let second = caps[2].to_lowercase();
        AIRLINE_WORD_HINTS
            .iter()
            .any(|hint| second.contains(hint))
            .then(|| format!("{} {}", &caps[1], &caps[2]))
    })
}

pub fn extract_stops(text: &str) -> Stops {
    let lower = text.to_lowercase();
    if lower.contains("nonstop") || lower.contains("non-stop") {
        Stops::Nonstop
    } else if lower.contains("2 stop") {
        Stops::TwoStops
    } else if lower.contains("1 stop") {
        Stops::OneStop
    } else {
        Stops::Unknown
    }
}

/// First `"<duration> in <AAA>"` connection
pub fn extract_layover_info(text: &str) -> Option<Layover> {
    LAYOVER_RE.captures(text).map(|caps| Layover {
        duration: caps[1].trim().to_string(),
        airport: caps[2].to_string(),
    })
}

/// Origin and destination codes.
///
/// Codes the caller already knows from its own search take precedence;
/// the card text is only consulted for the ones it leaves out.
pub fn extract_airports(
    text: &str,
    known_origin: Option<&str>,
    known_destination: Option<&str>,
) -> (Option<String>, Option<String>) {
    if let (Some(origin), Some(destination)) = (known_origin, known_destination) {
        return (Some(origin.to_string()), Some(destination.to_string()));
    }

    let (found_origin, found_destination) = match ROUTE_RE.captures(text) {
        Some(caps) => (Some(caps[1].to_string()), Some(caps[2].to_string())),
        None => {
            let mut codes = AIRPORT_CODE_RE
                .find_iter(text)
                .map(|m| m.as_str())
                .filter(|code| !CURRENCY_CODES.contains(code));
            match (codes.next(), codes.next()) {
                (Some(a), Some(b)) => (Some(a.to_string()), Some(b.to_string())),
                _ => (None, None),
            }
        }
    };

    (
        known_origin.map(str::to_string).or(found_origin),
        known_destination.map(str::to_string).or(found_destination),
    )
}

pub fn extract_emissions(text: &str) -> Option<String> {
    EMISSIONS_KG_RE
        .find(text)
        .or_else(|| EMISSIONS_PCT_RE.find(text))
        .map(|m| m.as_str().to_string())
}

/// Combined round-trip price on a booking summary page.
///
/// Uses a "total"-labelled price when present, otherwise the largest
/// currency amount on the page. The fallback is a heuristic for layouts
/// where the combined total is unlabelled.
pub fn extract_total_price(text: &str) -> Option<String> {
    if let Some(caps) = TOTAL_PRICE_RE.captures(text) {
        return Some(caps[1].trim().to_string());
    }

    SYMBOL_PRICE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .max_by_key(|price| extract_price_value(Some(price)))
        .map(str::to_string)
}

/// Segment details from an expanded card
pub fn extract_flight_details(text: &str) -> FlightDetails {
    let mut details = FlightDetails::default();

    for caps in FLIGHT_NUMBER_RE.captures_iter(text) {
        if matches!(&caps[1], "AM" | "PM") {
            continue;
        }
        let number = format!("{} {}", &caps[1], &caps[2]);
        if !details.flight_numbers.contains(&number) {
            details.flight_numbers.push(number);
        }
    }

    for m in AIRCRAFT_RE.find_iter(text) {
        let aircraft = m.as_str().to_string();
        if !details.aircraft.contains(&aircraft) {
            details.aircraft.push(aircraft);
        }
    }

    details.layovers = LAYOVER_RE
        .captures_iter(text)
        .map(|caps| Layover {
            duration: caps[1].trim().to_string(),
            airport: caps[2].to_string(),
        })
        .collect();

    details
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNITED_CARD: &str = "Nonstop 10:00 AM – 1:15 PM 3h 15m United $245";

    #[test]
    fn test_full_card_extraction() {
        assert_eq!(extract_price(UNITED_CARD).as_deref(), Some("$245"));
        assert_eq!(extract_price_value(Some("$245")), 245);
        assert_eq!(
            extract_times(UNITED_CARD),
            (Some("10:00 AM".to_string()), Some("1:15 PM".to_string()))
        );
        assert_eq!(extract_duration(UNITED_CARD).as_deref(), Some("3h 15m"));
        assert_eq!(extract_airline(UNITED_CARD).as_deref(), Some("United"));
        assert_eq!(extract_stops(UNITED_CARD), Stops::Nonstop);
    }

    #[test]
    fn test_price_formats() {
        assert_eq!(extract_price("from €1,234 round trip").as_deref(), Some("€1,234"));
        assert_eq!(extract_price("£ 89.99").as_deref(), Some("£ 89.99"));
        assert_eq!(extract_price("USD 310 per person").as_deref(), Some("USD 310"));
        assert_eq!(extract_price("fare 1,050 EUR").as_deref(), Some("1,050 EUR"));
        assert_eq!(extract_price("price 2,345 total").as_deref(), Some("2,345"));
        assert_eq!(extract_price("no price here 12"), None);
        assert_eq!(extract_price(""), None);
    }

    #[test]
    fn test_symbol_price_preferred_over_bare_number() {
        assert_eq!(extract_price("210 kg CO2e $199").as_deref(), Some("$199"));
    }

    #[test]
    fn test_price_value_is_total() {
        assert_eq!(extract_price_value(None), UNKNOWN_PRICE);
        assert_eq!(extract_price_value(Some("")), UNKNOWN_PRICE);
        assert_eq!(extract_price_value(Some("garbage")), UNKNOWN_PRICE);
        assert_eq!(extract_price_value(Some("1.2.3")), UNKNOWN_PRICE);
        assert_eq!(extract_price_value(Some("$1,234.56")), 1234);
        assert_eq!(extract_price_value(Some("USD 99")), 99);
        assert_eq!(extract_price_value(Some("$0")), 0);
        assert_eq!(extract_price_value(Some("$12,000,000")), UNKNOWN_PRICE);
    }

    #[test]
    fn test_times_dedup_and_partial() {
        let text = "8:05 AM 8:05 AM – 11:40 PM+1";
        assert_eq!(
            extract_times(text),
            (Some("8:05 AM".to_string()), Some("11:40 PM".to_string()))
        );
        assert_eq!(extract_times("departs 6:30\u{202f}pm"), (Some("6:30 PM".to_string()), None));
        assert_eq!(extract_times("no times"), (None, None));
    }

    #[test]
    fn test_duration_styles() {
        assert_eq!(extract_duration("5 hr 20 min total").as_deref(), Some("5 hr 20 min"));
        assert_eq!(extract_duration("12h 5m").as_deref(), Some("12h 5m"));
        assert_eq!(extract_duration("about five hours"), None);
    }

    #[test]
    fn test_airline_heuristics() {
        assert_eq!(extract_airline("Delta Air Lines 1 stop").as_deref(), Some("Delta Air Lines"));
        assert_eq!(extract_airline("Contour Airlines $199").as_deref(), Some("Contour Airlines"));
        assert_eq!(extract_airline("operated by Air Tahiti $900").as_deref(), Some("Air Tahiti"));
        assert_eq!(extract_airline("1 stop Flair Jetline $150").as_deref(), Some("Flair Jetline"));
        assert_eq!(extract_airline("10:00 AM $245"), None);
    }

    #[test]
    fn test_stops_priority() {
        assert_eq!(extract_stops("NONSTOP"), Stops::Nonstop);
        assert_eq!(extract_stops("2 stops DEN, ORD"), Stops::TwoStops);
        assert_eq!(extract_stops("1 stop 1h 5m in ORD"), Stops::OneStop);
        assert_eq!(extract_stops("3 stops"), Stops::Unknown);
        assert_eq!(extract_stops(""), Stops::Unknown);
    }

    #[test]
    fn test_layover() {
        let layover = extract_layover_info("1 stop 1h 5m in ORD $310").unwrap();
        assert_eq!(layover.duration, "1h 5m");
        assert_eq!(layover.airport, "ORD");

        let layover = extract_layover_info("45 min in DEN").unwrap();
        assert_eq!(layover.duration, "45 min");
        assert!(extract_layover_info("Nonstop").is_none());
    }

    #[test]
    fn test_known_airports_take_precedence() {
        let text = "1 stop DEN to ORD";
        assert_eq!(
            extract_airports(text, Some("SFO"), Some("JFK")),
            (Some("SFO".to_string()), Some("JFK".to_string()))
        );
        assert_eq!(
            extract_airports(text, None, None),
            (Some("DEN".to_string()), Some("ORD".to_string()))
        );
        assert_eq!(
            extract_airports("SFO and LAX, USD 300", Some("OAK"), None),
            (Some("OAK".to_string()), Some("LAX".to_string()))
        );
        assert_eq!(extract_airports("only USD here", None, None), (None, None));
    }

    #[test]
    fn test_emissions() {
        assert_eq!(extract_emissions("210 kg CO2e -12% emissions").as_deref(), Some("210 kg CO2e"));
        assert_eq!(extract_emissions("+8% emissions").as_deref(), Some("+8% emissions"));
        assert_eq!(extract_emissions("nothing"), None);
    }

    #[test]
    fn test_total_price_labelled() {
        let text = "Outbound $180 Return $200 Lowest total price $395 Bag fee $1000";
        assert_eq!(extract_total_price(text).as_deref(), Some("$395"));
        assert_eq!(extract_total_price("Round trip total: $1,020").as_deref(), Some("$1,020"));
    }

    #[test]
    fn test_total_price_falls_back_to_largest() {
        assert_eq!(extract_total_price("Departing $180 Returning $460").as_deref(), Some("$460"));
        assert_eq!(extract_total_price("nothing priced"), None);
    }

    #[test]
    fn test_subtotal_is_not_the_total() {
        let text = "Departing $280 Returning $180 Subtotal $280 Taxes and fees $40 $460";
        assert_eq!(extract_total_price(text).as_deref(), Some("$460"));

        let labelled = "Subtotal $280 Taxes and fees $40 Total $320 Bag fee $1000";
        assert_eq!(extract_total_price(labelled).as_deref(), Some("$320"));
    }

    #[test]
    fn test_flight_details() {
        let text = "UA 1234 Boeing 737MAX 9 1h 5m in ORD UA 567 Airbus A320neo 10:00 AM 1:15 PM";
        let details = extract_flight_details(text);
        assert_eq!(details.flight_numbers, vec!["UA 1234".to_string(), "UA 567".to_string()]);
        assert_eq!(
            details.aircraft,
            vec!["Boeing 737MAX".to_string(), "Airbus A320neo".to_string()]
        );
        assert_eq!(details.layovers.len(), 1);
        assert_eq!(details.layovers[0].airport, "ORD");
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let text = "1 stop 7:15 AM – 4:50 PM 6 hr 35 min Alaska 2h in SEA $412 180 kg CO2e";
        let first = (
            extract_price(text),
            extract_times(text),
            extract_duration(text),
            extract_airline(text),
            extract_stops(text),
            extract_layover_info(text),
            extract_emissions(text),
        );
        let second = (
            extract_price(text),
            extract_times(text),
            extract_duration(text),
            extract_airline(text),
            extract_stops(text),
            extract_layover_info(text),
            extract_emissions(text),
        );
        assert_eq!(first, second);
    }
}
