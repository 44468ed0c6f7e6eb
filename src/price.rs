//! Nearest-date price lookup (§4.E).

use crate::model::PriceSeries;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Default search tolerance in calendar days.
pub const DEFAULT_MAX_DELTA: i64 = 5;

/// Resolve the price closest to `target`.
///
/// Checks the exact date first, then widens outward one day at a time up to
/// `max_delta`, checking `target - delta` before `target + delta` at each
/// step so that ties at equal delta prefer the earlier date. Returns `None`
/// if nothing is found within range.
pub fn nearest_price(series: &PriceSeries, target: NaiveDate, max_delta: i64) -> Option<Decimal> {
    if let Some(v) = series.get(&target) {
        return Some(*v);
    }
    for delta in 1..=max_delta {
        if let Some(v) = series.get(&(target - chrono::Duration::days(delta))) {
            return Some(*v);
        }
        if let Some(v) = series.get(&(target + chrono::Duration::days(delta))) {
            return Some(*v);
        }
    }
    None
}

/// [`nearest_price`] with the default ±5-day tolerance.
pub fn nearest_price_default(series: &PriceSeries, target: NaiveDate) -> Option<Decimal> {
    nearest_price(series, target, DEFAULT_MAX_DELTA)
}
