//! HTML parser for flight result cards

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::model::{FlightOption, ReturnFlightOption};
use crate::ScrapeError;

/// Structural selectors for a single result card, most specific first.
///
/// These track the target site's markup and need updating when it changes.
pub const CARD_SELECTORS: &[&str] = &[
    "li.pIav2d",
    r#"div[jsname="IWWDBc"] ul.Rk10dc li"#,
    "ul.Rk10dc li",
    "div.yR1fYc",
    r#"[role="listitem"]"#,
];

/// Phrases the results page shows when a search legitimately has no flights
pub const NO_RESULTS_MARKERS: &[&str] = &[
    "No results returned",
    "No flights found",
    "No options matching your search",
];

pub const DEFAULT_MAX_CARDS: usize = 30;

/// Card texts matched by the first selector that found anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedCards {
    pub selector: String,
    /// (position among matched elements, normalized visible text)
    pub texts: Vec<(usize, String)>,
}

/// Parsed options plus the selector that located their cards
#[derive(Debug, Clone)]
pub struct ParsedCards<T> {
    pub selector: Option<String>,
    pub options: Vec<T>,
}

impl<T> ParsedCards<T> {
    fn empty() -> Self {
        Self {
            selector: None,
            options: Vec::new(),
        }
    }
}

/// Locates result cards in a page and turns each into a typed option
#[derive(Clone)]
pub struct FlightCardParser {
    card_selectors: Vec<(String, Selector)>,
    body_selector: Selector,
    max_cards: usize,
    known_origin: Option<String>,
    known_destination: Option<String>,
}

impl FlightCardParser {
    pub fn new() -> Result<Self, ScrapeError> {
        debug!("Initializing card parser with selectors");
        let card_selectors = CARD_SELECTORS
            .iter()
            .map(|raw| {
                Selector::parse(raw)
                    .map(|selector| (raw.to_string(), selector))
                    .map_err(|e| {
                        ScrapeError::ParseError(format!("Invalid card selector '{}': {}", raw, e))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            card_selectors,
            body_selector: Selector::parse("body")
                .map_err(|e| ScrapeError::ParseError(format!("Invalid body selector: {}", e)))?,
            max_cards: DEFAULT_MAX_CARDS,
            known_origin: None,
            known_destination: None,
        })
    }

    pub fn with_max_cards(mut self, max_cards: usize) -> Self {
        self.max_cards = max_cards;
        self
    }

    /// Airports the search was issued for; these win over codes seen in card text
    pub fn with_known_route(mut self, origin: Option<&str>, destination: Option<&str>) -> Self {
        self.known_origin = origin.map(str::to_string);
        self.known_destination = destination.map(str::to_string);
        self
    }

    /// Outbound options, cheapest first. An empty list is a valid outcome.
    pub fn parse(&self, html: &str) -> Vec<FlightOption> {
        self.parse_outbound(html).options
    }

    pub fn parse_outbound(&self, html: &str) -> ParsedCards<FlightOption> {
        let Some(matched) = self.match_cards(html) else {
            return ParsedCards::empty();
        };

        let mut options: Vec<FlightOption> = Vec::new();
        for (position, text) in &matched.texts {
            let index = options.len() + 1;
            match FlightOption::from_card_text(
                index,
                *position,
                text,
                self.known_origin.as_deref(),
                self.known_destination.as_deref(),
            ) {
                Some(option) => options.push(option),
                None => debug!(position, "Skipping card without a price"),
            }
        }

        // Stable: equal prices keep page order
        options.sort_by_key(|option| option.price_value);

        debug!(
            selector = %matched.selector,
            cards = matched.texts.len(),
            options = options.len(),
            "Outbound cards parsed"
        );

        ParsedCards {
            selector: Some(matched.selector),
            options,
        }
    }

    pub fn parse_returns(&self, html: &str) -> ParsedCards<ReturnFlightOption> {
        let Some(matched) = self.match_cards(html) else {
            return ParsedCards::empty();
        };

        let mut options: Vec<ReturnFlightOption> = Vec::new();
        for (position, text) in &matched.texts {
            let index = options.len() + 1;
            if let Some(option) = ReturnFlightOption::from_card_text(index, *position, text) {
                options.push(option);
            }
        }
        options.sort_by_key(|option| option.price_value);

        debug!(selector = %matched.selector, options = options.len(), "Return cards parsed");

        ParsedCards {
            selector: Some(matched.selector),
            options,
        }
    }

    /// Visible texts of the cards matched by the first selector with any hits
    pub fn match_cards(&self, html: &str) -> Option<MatchedCards> {
        let document = Html::parse_document(html);

        for (raw, selector) in &self.card_selectors {
            let elements: Vec<ElementRef> =
                document.select(selector).take(self.max_cards).collect();
            if elements.is_empty() {
                continue;
            }

            let texts = elements
                .into_iter()
                .enumerate()
                .map(|(position, element)| (position, visible_text(element)))
                .filter(|(_, text)| !text.is_empty())
                .collect();

            return Some(MatchedCards {
                selector: raw.clone(),
                texts,
            });
        }

        warn!("No flight cards matched any selector");
        None
    }

    /// Text of the card at `position` under a specific selector
    pub fn card_text_at(&self, html: &str, selector: &str, position: usize) -> Option<String> {
        let (_, compiled) = self.card_selectors.iter().find(|(raw, _)| raw == selector)?;
        let document = Html::parse_document(html);
        document.select(compiled).nth(position).map(visible_text)
    }

    /// Whole-page visible text, for booking summaries and result markers
    pub fn page_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        document
            .select(&self.body_selector)
            .next()
            .map(visible_text)
            .unwrap_or_default()
    }
}

/// Whether the page states outright that the search has no flights
pub fn has_no_results_marker(page_text: &str) -> bool {
    let lower = page_text.to_lowercase();
    NO_RESULTS_MARKERS
        .iter()
        .any(|marker| lower.contains(&marker.to_lowercase()))
}

/// Text nodes outside script/style, joined by single spaces
fn visible_text(element: ElementRef) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name()))
            .map(|name| matches!(name, "script" | "style" | "noscript"))
            .unwrap_or(false);
        if !hidden {
            parts.push(&**text);
        }
    }

    parts
        .iter()
        .flat_map(|part| part.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stops;

    fn card(price: &str, airline: &str) -> String {
        format!(
            r#"<li class="pIav2d"><div><span>8:00 AM</span> – <span>11:30 AM</span></div><div>{}</div><div>Nonstop</div><div>3h 30m</div><div class="price">{}</div></li>"#,
            airline, price
        )
    }

    fn page(cards: &[String]) -> String {
        format!("<html><body><ul>{}</ul></body></html>", cards.join(""))
    }

    #[test]
    fn test_parser_creation() {
        assert!(FlightCardParser::new().is_ok());
    }

    #[test]
    fn test_empty_page_yields_no_options() {
        let parser = FlightCardParser::new().unwrap();
        assert!(parser.parse("<html></html>").is_empty());
        assert!(parser.match_cards("<html><body><p>hi</p></body></html>").is_none());
    }

    #[test]
    fn test_sorted_by_price_with_stable_ties() {
        let parser = FlightCardParser::new().unwrap();
        let html = page(&[
            card("$420", "Delta"),
            card("$310", "United"),
            card("$550", "Alaska"),
            card("$310", "JetBlue"),
            card("$600", "Spirit"),
        ]);

        let options = parser.parse(&html);
        let prices: Vec<u32> = options.iter().map(|o| o.price_value).collect();
        assert_eq!(prices, vec![310, 310, 420, 550, 600]);
        assert_eq!(options[0].airline.as_deref(), Some("United"));
        assert_eq!(options[1].airline.as_deref(), Some("JetBlue"));
        assert_eq!(options[0].index, 2);
        assert_eq!(options[0].card_position, 1);
        assert_eq!(options[0].stops, Stops::Nonstop);
        assert_eq!(options[0].departure_time.as_deref(), Some("8:00 AM"));
    }

    #[test]
    fn test_card_without_price_skipped_and_index_not_consumed() {
        let parser = FlightCardParser::new().unwrap();
        let html = page(&[
            card("$200", "Delta"),
            r#"<li class="pIav2d">Nonstop Delta 9:00 AM – 12:00 PM</li>"#.to_string(),
            card("$150", "United"),
        ]);

        let options = parser.parse(&html);
        assert_eq!(options.len(), 2);
        let cheapest = &options[0];
        assert_eq!(cheapest.price, "$150");
        assert_eq!(cheapest.index, 2);
        assert_eq!(cheapest.card_position, 2);
    }

    #[test]
    fn test_fallback_selector_and_cap() {
        let cards: Vec<String> = (0..40)
            .map(|i| format!(r#"<div role="listitem">Nonstop ${}</div>"#, 100 + i))
            .collect();
        let html = format!("<html><body>{}</body></html>", cards.join(""));

        let parser = FlightCardParser::new().unwrap();
        let parsed = parser.parse_outbound(&html);
        assert_eq!(parsed.selector.as_deref(), Some(r#"[role="listitem"]"#));
        assert_eq!(parsed.options.len(), DEFAULT_MAX_CARDS);

        let small = FlightCardParser::new().unwrap().with_max_cards(5);
        assert_eq!(small.parse(&html).len(), 5);
    }

    #[test]
    fn test_known_route_applied() {
        let parser = FlightCardParser::new()
            .unwrap()
            .with_known_route(Some("SFO"), Some("JFK"));
        let card = r#"<li class="pIav2d">1 stop 1h 5m in ORD DEN to ORD $300</li>"#;
        let html = page(&[card.to_string()]);

        let option = &parser.parse(&html)[0];
        assert_eq!(option.origin_airport.as_deref(), Some("SFO"));
        assert_eq!(option.destination_airport.as_deref(), Some("JFK"));
        assert_eq!(option.layover.as_ref().map(|l| l.airport.as_str()), Some("ORD"));
    }

    #[test]
    fn test_page_text_skips_scripts() {
        let parser = FlightCardParser::new().unwrap();
        let html = r#"<html><body>
            <script>var price = "$9999";</script><p>Total</p><p>$460</p>
        </body></html>"#;
        assert_eq!(parser.page_text(html), "Total $460");
    }

    #[test]
    fn test_card_text_at_position() {
        let parser = FlightCardParser::new().unwrap();
        let html = page(&[card("$200", "Delta"), card("$150", "United")]);
        let text = parser.card_text_at(&html, "li.pIav2d", 1).unwrap();
        assert!(text.contains("United"));
        assert!(parser.card_text_at(&html, "li.unknown", 0).is_none());
    }

    #[test]
    fn test_no_results_marker() {
        assert!(has_no_results_marker("Sorry. No results returned for this search"));
        assert!(!has_no_results_marker("$310 Nonstop"));
    }
}
