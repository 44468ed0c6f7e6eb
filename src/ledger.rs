//! Per-security FIFO lot ledger (§4.B).
//!
//! Mirrors the source engine's `FifoBestand`/`fifo.py` one to one: lots are
//! consumed head-first, a partial consumption scales the lot's accrued
//! advance lump sum by the surviving fraction, and `simulate_gain` is a
//! value-level clone of the lot vector run through the same `sell` logic
//! rather than a parallel read-only implementation.

use crate::error::{EngineError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single FIFO lot, owned by one ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub buy_date: NaiveDate,
    pub units_remaining: Decimal,
    pub entry_price: Decimal,
    pub accrued_advance_lump_sum: Decimal,
}

/// A realised slice produced by consuming (part of) a lot on sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoldSlice {
    pub buy_date: NaiveDate,
    pub sell_date: NaiveDate,
    pub units: Decimal,
    pub entry_price: Decimal,
    pub sell_price: Decimal,
    pub gross_gain: Decimal,
    pub credited_advance_lump_sum: Decimal,
}

impl SoldSlice {
    /// Gross gain minus the advance lump sum already credited for this slice.
    pub fn tax_relevant_gain(&self) -> Decimal {
        self.gross_gain - self.credited_advance_lump_sum
    }
}

/// Ordered FIFO lot sequence for one security.
#[derive(Debug, Clone)]
pub struct FifoLedger {
    security_uuid: String,
    lots: Vec<Lot>,
}

impl FifoLedger {
    pub fn new(security_uuid: impl Into<String>) -> Self {
        Self {
            security_uuid: security_uuid.into(),
            lots: Vec::new(),
        }
    }

    pub fn security_uuid(&self) -> &str {
        &self.security_uuid
    }

    /// Appends a fresh lot with zero accrued advance lump sum.
    pub fn buy(&mut self, date: NaiveDate, units: Decimal, unit_price: Decimal) {
        self.lots.push(Lot {
            buy_date: date,
            units_remaining: units,
            entry_price: unit_price,
            accrued_advance_lump_sum: Decimal::ZERO,
        });
    }

    /// Total units across all live lots.
    pub fn total_units(&self) -> Decimal {
        self.lots.iter().map(|l| l.units_remaining).sum()
    }

    /// Immutable view of the current lot sequence, oldest first.
    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    /// Consumes `units` from the head of the lot sequence, oldest first.
    pub fn sell(&mut self, date: NaiveDate, units: Decimal, unit_price: Decimal) -> Result<Vec<SoldSlice>> {
        let total = self.total_units();
        if units > total {
            return Err(EngineError::InsufficientUnits {
                requested: units,
                available: total,
            });
        }

        let mut remaining = units;
        let mut slices = Vec::new();
        let mut fully_consumed = 0usize;

        for lot in self.lots.iter_mut() {
            if remaining <= Decimal::ZERO {
                break;
            }
            let consumed = remaining.min(lot.units_remaining);
            let fraction = if lot.units_remaining > Decimal::ZERO {
                consumed / lot.units_remaining
            } else {
                Decimal::ONE
            };

            let gross_gain = consumed * (unit_price - lot.entry_price);
            let credited = lot.accrued_advance_lump_sum * fraction;

            slices.push(SoldSlice {
                buy_date: lot.buy_date,
                sell_date: date,
                units: consumed,
                entry_price: lot.entry_price,
                sell_price: unit_price,
                gross_gain,
                credited_advance_lump_sum: credited,
            });

            if consumed >= lot.units_remaining {
                fully_consumed += 1;
            } else {
                let surviving_fraction = (lot.units_remaining - consumed) / lot.units_remaining;
                lot.accrued_advance_lump_sum *= surviving_fraction;
                lot.units_remaining -= consumed;
            }

            remaining -= consumed;
        }

        self.lots.drain(0..fully_consumed);
        Ok(slices)
    }

    /// Gross gain minus credited accrued lump sum for a hypothetical sale,
    /// without mutating this ledger. Implemented as a value-level clone run
    /// through `sell` so it can never drift from the real consumption logic.
    /// The sell date is a fixed placeholder — `sell` never reads it back out
    /// of the returned slices in a way that affects the summed gain — which
    /// keeps this a pure function of the ledger's own state.
    pub fn simulate_gain(&self, units: Decimal, unit_price: Decimal) -> Result<Decimal> {
        let mut shadow = self.clone();
        let slices = shadow.sell(NaiveDate::MAX, units, unit_price)?;
        Ok(slices.iter().map(|s| s.tax_relevant_gain()).sum())
    }

    /// Spreads `amount` proportionally to unit count across all live lots.
    pub fn credit_accrued_total(&mut self, amount: Decimal) {
        let total = self.total_units();
        if total <= Decimal::ZERO {
            return;
        }
        for lot in self.lots.iter_mut() {
            let share = lot.units_remaining / total;
            lot.accrued_advance_lump_sum += amount * share;
        }
    }

    /// Adds `amount` to a single lot identified by its index in `lots()`.
    pub fn credit_accrued_to_lot(&mut self, index: usize, amount: Decimal) {
        if let Some(lot) = self.lots.get_mut(index) {
            lot.accrued_advance_lump_sum += amount;
        }
    }
}
