//! Net-payout planner (§4.G): a deterministic, per-lot greedy algorithm that
//! proposes disposals reaching a target net amount while consuming the
//! allowance before the taxed band, mirroring the source engine's
//! `verkauf.py::plane_netto_verkauf`.

use crate::allowance::per_unit_gains;
use crate::config::Config;
use crate::ledger::FifoLedger;
use crate::legacy::is_legacy_exempt;
use crate::loss_pool::LossPools;
use crate::model::Security;
use crate::money::{ceil8, round2};
use crate::params::TaxParameters;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One lot-level disposal within the payout plan (§6.3's `SaleProposal` shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutProposal {
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

/// Full net-payout plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetPayoutPlan {
    pub target_net: Decimal,
    pub achieved_net: Decimal,
    pub gross_total: Decimal,
    pub tax_total: Decimal,
    pub allowance_consumed: Decimal,
    pub proposals: Vec<PayoutProposal>,
}

/// Cheap reachability pre-check: is the portfolio's total current value at
/// least the requested net target? Mirrors the source engine's
/// `pruefe_erreichbarkeit`, dropped from the distilled specification but
/// useful as a guard before running the full planner.
pub fn is_reachable(
    target_net: Decimal,
    ledgers: &HashMap<String, FifoLedger>,
    current_prices: &HashMap<String, Decimal>,
) -> bool {
    let total_value: Decimal = ledgers
        .iter()
        .filter_map(|(uuid, ledger)| current_prices.get(uuid).map(|&price| ledger.total_units() * price))
        .sum();
    total_value >= target_net
}

/// Plans disposals to reach `target_net` (§4.G).
///
/// When `loss_pools` is supplied, each lot's taxable gain is first offset
/// against the pools before being split into allowance/taxed bands, per the
/// Open Question 5 wiring decision.
pub fn plan_net_payout(
    params: &TaxParameters,
    config: &Config,
    target_net: Decimal,
    ledgers: &HashMap<String, FifoLedger>,
    current_prices: &HashMap<String, Decimal>,
    securities: &HashMap<String, Security>,
    mut loss_pools: Option<&mut LossPools>,
) -> crate::error::Result<NetPayoutPlan> {
    let year = config.year;
    let rate = params.combined_tax_rate(year, config.church_tax, &config.church_tax_region)?;
    let total_allowance = params.sparerpauschbetrag(year, config.filing_status.param_key())?;
    let mut remaining_allowance = (total_allowance - config.allowance_already_used).max(Decimal::ZERO);
    let mut need = target_net;

    let mut proposals = Vec::new();
    let mut gross_total = Decimal::ZERO;
    let mut tax_total = Decimal::ZERO;
    let mut allowance_consumed = Decimal::ZERO;

    let mut security_uuids: Vec<&String> = ledgers.keys().collect();
    security_uuids.sort();

    'securities: for uuid in security_uuids {
        if need <= Decimal::ZERO {
            break;
        }
        let ledger = &ledgers[uuid];
        if ledger.total_units() <= Decimal::ZERO {
            continue;
        }
        let Some(&price) = current_prices.get(uuid) else { continue };
        let Some(security) = securities.get(uuid) else { continue };
        let tfs = params.teilfreistellung(year, security.fund_type.param_key())?;

        for lot in ledger.lots() {
            if need <= Decimal::ZERO {
                break 'securities;
            }
            if lot.units_remaining <= Decimal::ZERO {
                continue;
            }

            let legacy_exempt = is_legacy_exempt(lot.buy_date, security.is_fund);

            let (gross_per_unit, mut taxable_per_unit) = if legacy_exempt {
                (price - lot.entry_price, Decimal::ZERO)
            } else {
                per_unit_gains(lot.entry_price, price, lot.accrued_advance_lump_sum, lot.units_remaining, tfs)
            };

            if let Some(pools) = loss_pools.as_deref_mut() {
                if !legacy_exempt && taxable_per_unit > Decimal::ZERO {
                    let lot_total_taxable = taxable_per_unit * lot.units_remaining;
                    let residual = pools.add_gain(lot_total_taxable, !security.is_fund);
                    taxable_per_unit = residual / lot.units_remaining;
                }
            }

            let tax_per_unit = if legacy_exempt {
                Decimal::ZERO
            } else if taxable_per_unit > Decimal::ZERO {
                round2(taxable_per_unit * rate)
            } else {
                Decimal::ZERO
            };

            let units_free = if !legacy_exempt && taxable_per_unit > Decimal::ZERO && remaining_allowance > Decimal::ZERO
            {
                (remaining_allowance / taxable_per_unit).min(lot.units_remaining)
            } else {
                Decimal::ZERO
            };

            let mut units_taken = Decimal::ZERO;

            if units_free > Decimal::ZERO && need > Decimal::ZERO {
                let n_free = units_free.min(ceil8(need / price)).min(lot.units_remaining);
                units_taken += n_free;
                let net_free = round2(n_free * price);
                need -= net_free;
                let allowance_used = round2(n_free * taxable_per_unit);
                remaining_allowance -= allowance_used;
                allowance_consumed += allowance_used;
            }

            let remaining_in_lot = lot.units_remaining - units_taken;
            let mut lot_tax = Decimal::ZERO;
            if need > Decimal::ZERO && remaining_in_lot > Decimal::ZERO {
                let net_per_unit_taxed = price - tax_per_unit;
                let n_taxed = if net_per_unit_taxed > Decimal::ZERO {
                    remaining_in_lot.min(ceil8(need / net_per_unit_taxed))
                } else {
                    remaining_in_lot
                };
                let n_taxed = n_taxed.min(remaining_in_lot);
                units_taken += n_taxed;
                lot_tax = round2(n_taxed * tax_per_unit);
                let net_taxed = round2(n_taxed * price - lot_tax);
                need -= net_taxed;
            }

            if units_taken > Decimal::ZERO {
                let gross_proceeds = round2(units_taken * price);
                let gross_gain = round2(units_taken * gross_per_unit);
                let taxable_gain = round2(units_taken * taxable_per_unit);

                proposals.push(PayoutProposal {
                    security_uuid: uuid.clone(),
                    security_name: security.name.clone(),
                    isin: security.isin.clone(),
                    units: units_taken,
                    buy_date: lot.buy_date,
                    entry_price: lot.entry_price,
                    current_price: price,
                    gross_proceeds,
                    gross_gain,
                    partial_exemption_rate: tfs,
                    taxable_gain,
                    tax: lot_tax,
                    net_proceeds: round2(gross_proceeds - lot_tax),
                    legacy_exempt,
                });
                gross_total += gross_proceeds;
                tax_total += lot_tax;
            }
        }
    }

    let achieved_net = round2(gross_total - tax_total);

    Ok(NetPayoutPlan {
        target_net,
        achieved_net,
        gross_total,
        tax_total,
        allowance_consumed,
        proposals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilingStatus;
    use crate::model::FundType;
    use crate::params::tax_parameters;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn reachability_checks_total_value() {
        let mut ledgers = HashMap::new();
        let mut ledger = FifoLedger::new("s1");
        ledger.buy(date(2020, 1, 1), dec!(100), dec!(50));
        ledgers.insert("s1".to_string(), ledger);
        let mut prices = HashMap::new();
        prices.insert("s1".to_string(), dec!(80));

        assert!(is_reachable(dec!(5000), &ledgers, &prices));
        assert!(!is_reachable(dec!(9000), &ledgers, &prices));
    }

    #[test]
    fn plan_stops_once_target_reached_within_allowance() {
        let params = tax_parameters();
        let mut ledgers = HashMap::new();
        let mut ledger = FifoLedger::new("s1");
        ledger.buy(date(2020, 1, 1), dec!(100), dec!(50));
        ledgers.insert("s1".to_string(), ledger);

        let mut prices = HashMap::new();
        prices.insert("s1".to_string(), dec!(80));

        let mut securities = HashMap::new();
        securities.insert("s1".to_string(), Security::new("s1", "Test", FundType::Sonstige, false));

        let cfg = Config::new(2023, FilingStatus::Single);
        let plan = plan_net_payout(params, &cfg, dec!(1000), &ledgers, &prices, &securities, None).unwrap();
        assert!(plan.achieved_net >= dec!(1000) || plan.gross_total > Decimal::ZERO);
        assert_eq!(plan.tax_total, Decimal::ZERO, "target reachable fully within allowance band");
    }

    #[test]
    fn legacy_exempt_lot_is_entirely_tax_free() {
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
        let plan = plan_net_payout(params, &cfg, dec!(8000), &ledgers, &prices, &securities, None).unwrap();
        assert_eq!(plan.tax_total, Decimal::ZERO);
        assert_eq!(plan.allowance_consumed, Decimal::ZERO);
        assert!(plan.proposals[0].legacy_exempt);
    }

    #[test]
    fn large_target_spills_into_taxed_band() {
        let params = tax_parameters();
        let mut ledgers = HashMap::new();
        let mut ledger = FifoLedger::new("s1");
        ledger.buy(date(2020, 1, 1), dec!(1000), dec!(50));
        ledgers.insert("s1".to_string(), ledger);

        let mut prices = HashMap::new();
        prices.insert("s1".to_string(), dec!(80));

        let mut securities = HashMap::new();
        securities.insert("s1".to_string(), Security::new("s1", "Test", FundType::Sonstige, false));

        let cfg = Config::new(2023, FilingStatus::Single);
        let plan = plan_net_payout(params, &cfg, dec!(50000), &ledgers, &prices, &securities, None).unwrap();
        assert!(plan.tax_total > Decimal::ZERO);
        assert!(plan.achieved_net <= plan.target_net || (plan.achieved_net - plan.target_net).abs() < dec!(1));
    }
}
