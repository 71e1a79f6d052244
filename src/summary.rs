//! Presentation summaries over options and combinations

use std::collections::BTreeSet;

use crate::extract::extract_price_value;
use crate::model::{FlightOption, PriceRange, RoundTripCombination, Summary, UNKNOWN_PRICE};

pub struct ResultAggregator;

impl ResultAggregator {
    /// Price range, nonstop availability and airline set. Empty input gives an empty summary.
    pub fn summarize(options: &[FlightOption]) -> Summary {
        let airlines_included: BTreeSet<String> =
            options.iter().filter_map(|o| o.airline.clone()).collect();

        Summary {
            total_options: options.len(),
            price_range: price_range(options.iter().map(|o| o.price_value)),
            nonstop_available: options.iter().any(|o| o.stops.is_nonstop()),
            airlines_included,
        }
    }

    /// Same summary over combinations: the range covers resolved totals and a
    /// combination only counts as nonstop when both legs are.
    pub fn summarize_combinations(combinations: &[RoundTripCombination]) -> Summary {
        let airlines_included: BTreeSet<String> = combinations
            .iter()
            .flat_map(|c| [c.outbound.airline.clone(), c.return_flight.airline.clone()])
            .flatten()
            .collect();

        Summary {
            total_options: combinations.len(),
            price_range: price_range(
                combinations
                    .iter()
                    .map(|c| extract_price_value(c.total_price.as_deref())),
            ),
            nonstop_available: combinations
                .iter()
                .any(|c| c.outbound.stops.is_nonstop() && c.return_flight.stops.is_nonstop()),
            airlines_included,
        }
    }
}

// Unknown prices are left out of the range
fn price_range(values: impl Iterator<Item = u32>) -> Option<PriceRange> {
    values
        .filter(|value| *value != UNKNOWN_PRICE)
        .fold(None, |range: Option<PriceRange>, value| match range {
            None => Some(PriceRange { min: value, max: value }),
            Some(r) => Some(PriceRange {
                min: r.min.min(value),
                max: r.max.max(value),
            }),
        })
}
