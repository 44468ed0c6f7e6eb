//! Rounding primitives.
//!
//! All documented rounding boundaries in the engine go through one of these
//! two functions. Intermediate ratios and per-unit values are left at full
//! `Decimal` precision; only totals and results displayed to the caller get
//! quantised.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round to two fractional digits, half-away-from-zero. Used for every
/// monetary total emitted by the engine.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Round to eight fractional digits, half-away-from-zero. Used for per-unit
/// ratios (unit counts, per-unit gains) that still need a concrete quantity.
pub fn round8(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(8, RoundingStrategy::MidpointAwayFromZero)
}

/// Round up (away from zero, toward positive infinity for non-negative
/// inputs) at the eighth fractional digit. The net-payout planner uses this
/// deliberate over-rounding so a unit count never falls short of the
/// requested net amount by a rounding hair.
pub fn ceil8(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(8, RoundingStrategy::AwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round2_half_away_from_zero() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn ceil8_rounds_up_past_exact_division() {
        let value = dec!(1) / dec!(3);
        let rounded = ceil8(value);
        assert!(rounded >= value);
        assert_eq!(rounded, dec!(0.33333334));
    }
}
