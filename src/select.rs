//! Diversity selection over outbound flights
//!
//! Picks a representative subset (price, stops, time of day, airline)
//! instead of the N cheapest near-duplicates.

use chrono::{NaiveTime, Timelike};
use std::collections::HashSet;

use crate::model::{FlightOption, Stops};

const MORNING_HOURS: std::ops::Range<u32> = 5..12;
const AFTERNOON_HOURS: std::ops::Range<u32> = 12..18;

/// Hour (0-23) of an `H:MM AM/PM` time string
pub fn departure_hour(time: &str) -> Option<u32> {
    NaiveTime::parse_from_str(time.trim(), "%I:%M %p")
        .ok()
        .map(|t| t.hour())
}

fn departs_within(option: &FlightOption, hours: &std::ops::Range<u32>) -> bool {
    option
        .departure_time
        .as_deref()
        .and_then(departure_hour)
        .map(|hour| hours.contains(&hour))
        .unwrap_or(false)
}

struct Picker {
    limit: usize,
    picked: Vec<FlightOption>,
    keys: HashSet<(Option<String>, Stops, u32)>,
}

impl Picker {
    fn full(&self) -> bool {
        self.picked.len() >= self.limit
    }

    fn try_add(&mut self, option: &FlightOption) -> bool {
        if self.full() || !self.keys.insert(option.dedup_key()) {
            return false;
        }
        self.picked.push(option.clone());
        true
    }

    fn any(&self, pred: impl Fn(&FlightOption) -> bool) -> bool {
        self.picked.iter().any(pred)
    }
}

/// Representative subset of at most `limit` flights, cheapest first.
///
/// Priority: cheapest overall, cheapest nonstop, best morning departure,
/// best afternoon departure, one per unseen airline, a one-stop option when
/// everything so far is nonstop, then next-cheapest. Flights sharing an
/// (airline, stops, price) key are never both selected.
pub fn select_diverse_options(flights: &[FlightOption], limit: usize) -> Vec<FlightOption> {
    let mut by_price: Vec<&FlightOption> = flights.iter().collect();
    by_price.sort_by_key(|f| f.price_value);

    let mut picker = Picker {
        limit,
        picked: Vec::new(),
        keys: HashSet::new(),
    };

    if let Some(cheapest) = by_price.first() {
        picker.try_add(cheapest);
    }

    if !picker.any(|f| f.stops.is_nonstop()) {
        if let Some(nonstop) = by_price.iter().find(|f| f.stops.is_nonstop()) {
            picker.try_add(nonstop);
        }
    }

    for hours in [MORNING_HOURS, AFTERNOON_HOURS] {
        if !picker.any(|f| departs_within(f, &hours)) {
            if let Some(best) = by_price.iter().find(|f| departs_within(f, &hours)) {
                picker.try_add(best);
            }
        }
    }

    for flight in &by_price {
        if picker.full() {
            break;
        }
        if let Some(airline) = flight.airline.as_deref() {
            if !picker.any(|f| f.airline.as_deref() == Some(airline)) {
                picker.try_add(flight);
            }
        }
    }

    if !picker.picked.is_empty() && picker.picked.iter().all(|f| f.stops.is_nonstop()) {
        if let Some(one_stop) = by_price.iter().find(|f| f.stops == Stops::OneStop) {
            picker.try_add(one_stop);
        }
    }

    for flight in &by_price {
        if picker.full() {
            break;
        }
        picker.try_add(flight);
    }

    let mut selected = picker.picked;
    selected.sort_by_key(|f| f.price_value);
    selected
}
