//! Sparerpauschbetrag (allowance) optimiser (§4.F).
//!
//! The lot-level variant below is the primary, specified algorithm. A
//! security-level variant, `optimise_by_security`, mirrors the source
//! engine's own `freibetrag.py` exactly; it is kept as a documented,
//! non-default fallback (see DESIGN.md) and is not wired into the CLI.

use crate::config::{Config, FilingStatus};
use crate::ledger::FifoLedger;
use crate::legacy::is_legacy_exempt;
use crate::loss_pool::LossPools;
use crate::model::Security;
use crate::money::{round2, round8};
use crate::params::TaxParameters;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One recommended disposal, within or just under the allowance band (§6.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleProposal {
    pub security_uuid: String,
    pub security_name: String,
    pub isin: Option<String>,
    pub units: Decimal,
    pub buy_date: NaiveDate,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub gross_proceeds: Decimal,
    pub gross_gain: Decimal,
    pub partial_exemption_rate: Decimal,
    pub taxable_gain: Decimal,
    pub tax: Decimal,
    pub net_proceeds: Decimal,
    pub legacy_exempt: bool,
}

/// Result of an allowance-optimisation query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceOptimisationResult {
    pub year: i32,
    pub total_allowance: Decimal,
    pub already_used: Decimal,
    pub remaining_allowance: Decimal,
    pub proposals: Vec<SaleProposal>,
}

struct LotCandidate {
    security_uuid: String,
    security_name: String,
    isin: Option<String>,
    lot_index: usize,
    buy_date: NaiveDate,
    entry_price: Decimal,
    units: Decimal,
    per_unit_taxable_gain: Decimal,
    per_unit_gross_gain: Decimal,
    tfs: Decimal,
}

/// Per-unit tax-relevant/taxable gain for a lot, shared by the optimiser and
/// the payout planner (§4.F step 2, §4.G step 2).
pub fn per_unit_gains(
    entry_price: Decimal,
    current_price: Decimal,
    accrued: Decimal,
    units: Decimal,
    tfs: Decimal,
) -> (Decimal, Decimal) {
    let gross = current_price - entry_price;
    let credited = if units > Decimal::ZERO { accrued / units } else { Decimal::ZERO };
    let tax_relevant = gross - credited;
    let taxable = tax_relevant * (Decimal::ONE - tfs);
    (gross, taxable)
}

/// Lot-level allowance optimisation (§4.F), the specified default.
///
/// When `loss_pools` is supplied, each candidate's taxable gain is first run
/// through loss offsetting (§4.I) before being weighed against the
/// remaining allowance, so losses are absorbed ahead of the allowance rather
/// than alongside it.
pub fn optimise(
    params: &TaxParameters,
    config: &Config,
    ledgers: &HashMap<String, FifoLedger>,
    current_prices: &HashMap<String, Decimal>,
    securities: &HashMap<String, Security>,
    mut loss_pools: Option<&mut LossPools>,
) -> crate::error::Result<AllowanceOptimisationResult> {
    let year = config.year;
    let total_allowance = params.sparerpauschbetrag(year, config.filing_status.param_key())?;
    let mut remaining = (total_allowance - config.allowance_already_used).max(Decimal::ZERO);

    if remaining <= Decimal::ZERO {
        return Ok(AllowanceOptimisationResult {
            year,
            total_allowance,
            already_used: config.allowance_already_used,
            remaining_allowance: Decimal::ZERO,
            proposals: Vec::new(),
        });
    }

    let mut candidates = Vec::new();
    for (uuid, ledger) in ledgers {
        let Some(security) = securities.get(uuid) else { continue };
        let Some(&price) = current_prices.get(uuid) else { continue };
        let tfs = params.teilfreistellung(year, security.fund_type.param_key())?;

        for (lot_index, lot) in ledger.lots().iter().enumerate() {
            if is_legacy_exempt(lot.buy_date, security.is_fund) {
                continue;
            }
            let (gross, mut taxable) =
                per_unit_gains(lot.entry_price, price, lot.accrued_advance_lump_sum, lot.units_remaining, tfs);

            if let Some(pools) = loss_pools.as_deref_mut() {
                if taxable > Decimal::ZERO {
                    let total_taxable = taxable * lot.units_remaining;
                    let residual = pools.add_gain(total_taxable, !security.is_fund);
                    taxable = if lot.units_remaining > Decimal::ZERO {
                        residual / lot.units_remaining
                    } else {
                        Decimal::ZERO
                    };
                }
            }

            if taxable <= Decimal::ZERO {
                continue;
            }
            candidates.push(LotCandidate {
                security_uuid: uuid.clone(),
                security_name: security.name.clone(),
                isin: security.isin.clone(),
                lot_index,
                buy_date: lot.buy_date,
                entry_price: lot.entry_price,
                units: lot.units_remaining,
                per_unit_taxable_gain: taxable,
                per_unit_gross_gain: gross,
                tfs,
            });
        }
    }

    candidates.sort_by(|a, b| {
        b.per_unit_taxable_gain
            .cmp(&a.per_unit_taxable_gain)
            .then_with(|| a.security_uuid.cmp(&b.security_uuid))
            .then_with(|| a.lot_index.cmp(&b.lot_index))
    });

    let mut proposals = Vec::new();
    for candidate in candidates {
        if remaining <= Decimal::ZERO {
            break;
        }
        let price = current_prices[&candidate.security_uuid];
        let units_needed = round8(remaining / candidate.per_unit_taxable_gain);
        let units = units_needed.min(candidate.units);

        let gross_proceeds = round2(units * price);
        let gross_gain = round2(units * candidate.per_unit_gross_gain);
        let taxable_gain = round2(units * candidate.per_unit_taxable_gain);

        proposals.push(SaleProposal {
            security_uuid: candidate.security_uuid,
            security_name: candidate.security_name,
            isin: candidate.isin,
            units,
            buy_date: candidate.buy_date,
            entry_price: candidate.entry_price,
            current_price: price,
            gross_proceeds,
            gross_gain,
            partial_exemption_rate: candidate.tfs,
            taxable_gain,
            tax: Decimal::ZERO,
            net_proceeds: gross_proceeds,
            // Legacy-exempt lots are filtered out above this loop, so every
            // candidate reaching here is taxable.
            legacy_exempt: false,
        });

        remaining -= taxable_gain;
    }

    Ok(AllowanceOptimisationResult {
        year,
        total_allowance,
        already_used: config.allowance_already_used,
        remaining_allowance: remaining.max(Decimal::ZERO),
        proposals,
    })
}

/// Security-level allowance optimisation — the non-default fallback variant
/// mirroring the source engine's `freibetrag.py` one-to-one. Simulates a
/// full-position sale per security rather than reasoning lot-by-lot.
pub fn optimise_by_security(
    params: &TaxParameters,
    config: &Config,
    ledgers: &HashMap<String, FifoLedger>,
    current_prices: &HashMap<String, Decimal>,
    securities: &HashMap<String, Security>,
) -> crate::error::Result<AllowanceOptimisationResult> {
    let year = config.year;
    let total_allowance = params.sparerpauschbetrag(year, config.filing_status.param_key())?;
    let mut remaining = (total_allowance - config.allowance_already_used).max(Decimal::ZERO);

    if remaining <= Decimal::ZERO {
        return Ok(AllowanceOptimisationResult {
            year,
            total_allowance,
            already_used: config.allowance_already_used,
            remaining_allowance: Decimal::ZERO,
            proposals: Vec::new(),
        });
    }

    struct SecCandidate {
        uuid: String,
        security_name: String,
        isin: Option<String>,
        // The oldest (FIFO-first) lot stands in for the whole position, since
        // this variant simulates a sale across the entire ledger rather than
        // reasoning lot-by-lot.
        buy_date: NaiveDate,
        entry_price: Decimal,
        legacy_exempt: bool,
        per_unit_taxable: Decimal,
        tfs: Decimal,
    }

    let mut candidates = Vec::new();
    for (uuid, ledger) in ledgers {
        let total_units = ledger.total_units();
        let Some(security) = securities.get(uuid) else { continue };
        let Some(&price) = current_prices.get(uuid) else { continue };
        if total_units <= Decimal::ZERO {
            continue;
        }
        let Some(oldest_lot) = ledger.lots().first() else { continue };
        let tfs = params.teilfreistellung(year, security.fund_type.param_key())?;
        let gross_gain = ledger.simulate_gain(total_units, price)?;
        if gross_gain <= Decimal::ZERO {
            continue;
        }
        let per_unit_taxable = (gross_gain / total_units) * (Decimal::ONE - tfs);
        candidates.push(SecCandidate {
            uuid: uuid.clone(),
            security_name: security.name.clone(),
            isin: security.isin.clone(),
            buy_date: oldest_lot.buy_date,
            entry_price: oldest_lot.entry_price,
            legacy_exempt: is_legacy_exempt(oldest_lot.buy_date, security.is_fund),
            per_unit_taxable,
            tfs,
        });
    }

    candidates.sort_by(|a, b| b.per_unit_taxable.cmp(&a.per_unit_taxable).then_with(|| a.uuid.cmp(&b.uuid)));

    let mut proposals = Vec::new();
    for candidate in candidates {
        if remaining <= Decimal::ZERO {
            break;
        }
        let ledger = &ledgers[&candidate.uuid];
        let price = current_prices[&candidate.uuid];
        let units_needed = round8(remaining / candidate.per_unit_taxable);
        let units = units_needed.min(ledger.total_units());

        let gross_gain = ledger.simulate_gain(units, price)?;
        let taxable_gain = round2(gross_gain * (Decimal::ONE - candidate.tfs));
        let gross_proceeds = round2(units * price);

        proposals.push(SaleProposal {
            security_uuid: candidate.uuid,
            security_name: candidate.security_name,
            isin: candidate.isin,
            units,
            buy_date: candidate.buy_date,
            entry_price: candidate.entry_price,
            current_price: price,
            gross_proceeds,
            gross_gain: round2(gross_gain),
            partial_exemption_rate: candidate.tfs,
            taxable_gain,
            tax: Decimal::ZERO,
            net_proceeds: gross_proceeds,
            legacy_exempt: candidate.legacy_exempt,
        });

        remaining -= taxable_gain;
    }

    Ok(AllowanceOptimisationResult {
        year,
        total_allowance,
        already_used: config.allowance_already_used,
        remaining_allowance: remaining.max(Decimal::ZERO),
        proposals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FundType;
    use crate::params::tax_parameters;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (HashMap<String, FifoLedger>, HashMap<String, Decimal>, HashMap<String, Security>) {
        let mut ledgers = HashMap::new();
        let mut ledger = FifoLedger::new("s1");
        ledger.buy(date(2020, 1, 1), dec!(100), dec!(50));
        ledgers.insert("s1".to_string(), ledger);

        let mut prices = HashMap::new();
        prices.insert("s1".to_string(), dec!(80));

        let mut securities = HashMap::new();
        securities.insert("s1".to_string(), Security::new("s1", "Test", FundType::Sonstige, false));

        (ledgers, prices, securities)
    }

    #[test]
    fn empty_remaining_allowance_returns_no_proposals() {
        let params = tax_parameters();
        let (ledgers, prices, securities) = setup();
        let mut cfg = Config::new(2023, FilingStatus::Single);
        cfg.allowance_already_used = dec!(1000);
        let result = optimise(params, &cfg, &ledgers, &prices, &securities, None).unwrap();
        assert!(result.proposals.is_empty());
        assert_eq!(result.remaining_allowance, Decimal::ZERO);
    }

    #[test]
    fn proposes_units_covering_remaining_allowance() {
        let params = tax_parameters();
        let (ledgers, prices, securities) = setup();
        let cfg = Config::new(2023, FilingStatus::Single);
        let result = optimise(params, &cfg, &ledgers, &prices, &securities, None).unwrap();
        assert_eq!(result.proposals.len(), 1);
        let proposal = &result.proposals[0];
        // gain per unit = 30, no exemption (Sonstige) -> taxable per unit 30.
        // allowance 1000 / 30 = 33.33333333 units.
        assert_eq!(proposal.units, dec!(33.33333333));
        assert_eq!(proposal.tax, Decimal::ZERO);
    }

    #[test]
    fn legacy_exempt_lot_is_skipped() {
        let params = tax_parameters();
        let mut ledgers = HashMap::new();
        let mut ledger = FifoLedger::new("s1");
        ledger.buy(date(2005, 1, 1), dec!(100), dec!(50));
        ledgers.insert("s1".to_string(), ledger);

        let mut prices = HashMap::new();
        prices.insert("s1".to_string(), dec!(80));

        let mut securities = HashMap::new();
        securities.insert("s1".to_string(), Security::new("s1", "Test", FundType::Sonstige, false));

        let cfg = Config::new(2023, FilingStatus::Single);
        let result = optimise(params, &cfg, &ledgers, &prices, &securities, None).unwrap();
        assert!(result.proposals.is_empty());
    }

    #[test]
    fn loss_pool_reduces_taxable_gain_before_allowance() {
        let params = tax_parameters();
        let (ledgers, prices, securities) = setup();
        let mut pools = LossPools::new();
        pools.add_loss(dec!(2000), true);
        let cfg = Config::new(2023, FilingStatus::Single);
        let result = optimise(params, &cfg, &ledgers, &prices, &securities, Some(&mut pools)).unwrap();
        // All taxable gain (100 units * 30 = 3000) cannot be fully absorbed by
        // a 2000 loss, so 1000 of taxable gain remains, landing exactly in the
        // remaining allowance; the candidate should still surface.
        assert_eq!(result.proposals.len(), 1);
    }

    #[test]
    fn optimise_by_security_mirrors_whole_position_sale() {
        let params = tax_parameters();
        let (ledgers, prices, securities) = setup();
        let cfg = Config::new(2023, FilingStatus::Single);
        let result = optimise_by_security(params, &cfg, &ledgers, &prices, &securities).unwrap();
        assert_eq!(result.proposals.len(), 1);
        assert_eq!(result.proposals[0].units, dec!(33.33333333));
    }
}
