//! Per-lot Vorabpauschale allocation across completed tax years (§4.D).
//!
//! For every lot in a ledger this walks each completed calendar year from
//! the lot's purchase year up to (but excluding) the disposal/tax year,
//! computes that year's Vorabpauschale against the lot's own value, and
//! credits the gross result onto the lot so a later sale can net it out of
//! the taxable gain (§19 Abs. 1 Satz 3 InvStG).

use crate::error::Result;
use crate::ledger::FifoLedger;
use crate::model::{PriceSeries, Security};
use crate::params::TaxParameters;
use crate::price::nearest_price_default;
use crate::vorabpauschale;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Year -> total distributions received for one security.
pub type DistributionsByYear = HashMap<i32, Decimal>;

/// Applies completed-year Vorabpauschale credits to every lot in `ledger`.
///
/// Years are skipped (not treated as errors) when the tax-parameter table has
/// no entry, when the Basiszins for that year is negative, or when a 1
/// January / 31 December price cannot be resolved within tolerance — this
/// mirrors the source engine swallowing lookup misses per-year rather than
/// aborting the whole allocation.
pub fn apply_vorabpauschalen(
    params: &TaxParameters,
    ledger: &mut FifoLedger,
    security: &Security,
    prices: &PriceSeries,
    distributions: &DistributionsByYear,
    tax_year: i32,
) -> Result<()> {
    let total_units = ledger.total_units();
    if total_units <= Decimal::ZERO {
        return Ok(());
    }

    let lot_count = ledger.lots().len();
    for lot_idx in 0..lot_count {
        let (buy_date, units) = {
            let lot = &ledger.lots()[lot_idx];
            (lot.buy_date, lot.units_remaining)
        };
        let start_year = buy_date.year();
        let end_year = tax_year - 1;

        for year in start_year..=end_year {
            let basiszins = match params.basiszins_vorabpauschale(year) {
                Ok(v) => v,
                Err(_) => {
                    log::debug!("{security_uuid}: no Basiszins for {year}, skipping allocation", security_uuid = security.uuid);
                    continue;
                }
            };
            if basiszins < Decimal::ZERO {
                log::debug!("{security_uuid}: negative Basiszins in {year}, skipping allocation", security_uuid = security.uuid);
                continue;
            }

            let jan1 = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
            let dec31 = NaiveDate::from_ymd_opt(year, 12, 31).unwrap();
            let (Some(price_start), Some(price_end)) =
                (nearest_price_default(prices, jan1), nearest_price_default(prices, dec31))
            else {
                log::debug!("{security_uuid}: no price within tolerance for {year}, skipping allocation", security_uuid = security.uuid);
                continue;
            };

            let value_start = price_start * units;
            let value_end = price_end * units;

            let year_distributions_total = distributions.get(&year).copied().unwrap_or(Decimal::ZERO);
            let lot_distributions = if total_units > Decimal::ZERO {
                year_distributions_total * units / total_units
            } else {
                Decimal::ZERO
            };

            let buy_date_for_year = if buy_date.year() == year { Some(buy_date) } else { None };

            let erg = match vorabpauschale::calculate(
                params,
                security,
                year,
                value_start,
                value_end,
                lot_distributions,
                buy_date_for_year,
            ) {
                Ok(erg) => erg,
                Err(_) => continue,
            };

            if erg.vorabpauschale_gross > Decimal::ZERO {
                ledger.credit_accrued_to_lot(lot_idx, erg.vorabpauschale_gross);
            }
        }
    }

    Ok(())
}
