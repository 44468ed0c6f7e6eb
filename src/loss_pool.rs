//! §20 Abs. 6 EStG loss-offsetting pools (§4.I).
//!
//! Two pools are kept: a general pool (fund disposals, most capital income)
//! and an equity-only pool (direct share disposals), which can only offset
//! gains from direct share disposals. Equity gains are netted against the
//! equity pool first, then any remainder against the general pool. Loss
//! offsetting happens before the Sparerpauschbetrag is applied.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Year-end snapshot of one pool pair, with the next year's carry-forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LossPoolReport {
    pub loss_general: Decimal,
    pub loss_equity: Decimal,
    pub offset_general: Decimal,
    pub offset_equity: Decimal,
    pub carryforward_general: Decimal,
    pub carryforward_equity: Decimal,
}

/// Stateful loss-offsetting pools for one filer across a tax year.
#[derive(Debug, Clone, Default)]
pub struct LossPools {
    loss_general: Decimal,
    loss_equity: Decimal,
    offset_general: Decimal,
    offset_equity: Decimal,
}

impl LossPools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the pools from a prior year's carry-forward.
    pub fn with_carryforward(loss_general: Decimal, loss_equity: Decimal) -> Self {
        Self {
            loss_general,
            loss_equity,
            offset_general: Decimal::ZERO,
            offset_equity: Decimal::ZERO,
        }
    }

    pub fn carryforward_general(&self) -> Decimal {
        self.loss_general
    }

    pub fn carryforward_equity(&self) -> Decimal {
        self.loss_equity
    }

    /// Adds a loss to the relevant pool. `amount` is taken as an absolute value.
    pub fn add_loss(&mut self, amount: Decimal, is_equity: bool) {
        let amount = amount.abs();
        if is_equity {
            self.loss_equity += amount;
        } else {
            self.loss_general += amount;
        }
    }

    /// Adds a gain, offsetting it against the available pools, and returns
    /// the taxable remainder after offsetting.
    ///
    /// Equity gains are offset against the equity pool first, then against
    /// the general pool for whatever remains; general gains go straight to
    /// the general pool.
    pub fn add_gain(&mut self, amount: Decimal, is_equity: bool) -> Decimal {
        let mut remaining = amount.abs();

        if is_equity && self.loss_equity > Decimal::ZERO {
            let offset = remaining.min(self.loss_equity);
            self.loss_equity -= offset;
            self.offset_equity += offset;
            remaining -= offset;
        }

        if remaining > Decimal::ZERO && self.loss_general > Decimal::ZERO {
            let offset = remaining.min(self.loss_general);
            self.loss_general -= offset;
            self.offset_general += offset;
            remaining -= offset;
        }

        remaining
    }

    /// Closes the tax year: reports totals and offsets, resets the offset
    /// counters, and preserves the remaining carry-forward for the next year.
    pub fn year_end(&mut self) -> LossPoolReport {
        let report = LossPoolReport {
            loss_general: self.loss_general + self.offset_general,
            loss_equity: self.loss_equity + self.offset_equity,
            offset_general: self.offset_general,
            offset_equity: self.offset_equity,
            carryforward_general: self.loss_general,
            carryforward_equity: self.loss_equity,
        };
        self.offset_general = Decimal::ZERO;
        self.offset_equity = Decimal::ZERO;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn equity_gain_offsets_equity_pool_first() {
        let mut pools = LossPools::new();
        pools.add_loss(dec!(100), true);
        pools.add_loss(dec!(50), false);
        let taxable = pools.add_gain(dec!(80), true);
        assert_eq!(taxable, Decimal::ZERO);
        assert_eq!(pools.carryforward_equity(), dec!(20));
        assert_eq!(pools.carryforward_general(), dec!(50));
    }

    #[test]
    fn equity_gain_spills_into_general_pool() {
        let mut pools = LossPools::new();
        pools.add_loss(dec!(30), true);
        pools.add_loss(dec!(100), false);
        let taxable = pools.add_gain(dec!(80), true);
        assert_eq!(taxable, Decimal::ZERO);
        assert_eq!(pools.carryforward_equity(), Decimal::ZERO);
        assert_eq!(pools.carryforward_general(), dec!(50));
    }

    #[test]
    fn general_gain_never_touches_equity_pool() {
        let mut pools = LossPools::new();
        pools.add_loss(dec!(100), true);
        let taxable = pools.add_gain(dec!(40), false);
        assert_eq!(taxable, dec!(40));
        assert_eq!(pools.carryforward_equity(), dec!(100));
    }

    #[test]
    fn year_end_reports_totals_and_resets_offset_counters() {
        let mut pools = LossPools::new();
        pools.add_loss(dec!(100), false);
        pools.add_gain(dec!(30), false);
        let report = pools.year_end();
        assert_eq!(report.loss_general, dec!(100));
        assert_eq!(report.offset_general, dec!(30));
        assert_eq!(report.carryforward_general, dec!(70));

        // Offset counters reset; carry-forward persists into the next year.
        let taxable = pools.add_gain(dec!(10), false);
        assert_eq!(taxable, Decimal::ZERO);
        let report2 = pools.year_end();
        assert_eq!(report2.offset_general, dec!(10));
        assert_eq!(report2.carryforward_general, dec!(60));
    }

    #[test]
    fn carryforward_seeds_a_fresh_instance() {
        let mut pools = LossPools::with_carryforward(dec!(60), dec!(20));
        assert_eq!(pools.carryforward_general(), dec!(60));
        let taxable = pools.add_gain(dec!(25), true);
        assert_eq!(taxable, dec!(5));
        assert_eq!(pools.carryforward_equity(), Decimal::ZERO);
    }
}
