//! Ledger-construction helper (§2 component M, §9 design notes).
//!
//! Bridges the plain [`Transaction`] stream the parser hands over and the
//! per-security [`FifoLedger`]s the rest of the engine operates on: sorts
//! transactions into non-decreasing date order (§5's ordering guarantee),
//! builds one ledger per security, and applies dividend totals per year for
//! use by [`crate::allocator`]. Historical replay is forgiving: an ingested
//! sell that exceeds the ledger's current units (the dataset may predate our
//! earliest known buy) is logged and dropped rather than treated as fatal,
//! per §7's propagation policy — a caller-originated sell through
//! [`FifoLedger::sell`] directly still propagates [`EngineError::InsufficientUnits`].

use crate::allocator::DistributionsByYear;
use crate::error::Result;
use crate::ledger::FifoLedger;
use crate::model::{Transaction, TransactionKind};
use chrono::Datelike;
use std::collections::HashMap;

/// Transactions belonging to `portfolio_uuid`, plus those with no portfolio
/// (which belong to "all portfolios", §3). `None` returns every transaction.
pub fn transactions_for_portfolio<'a>(transactions: &'a [Transaction], portfolio_uuid: Option<&str>) -> Vec<&'a Transaction> {
    match portfolio_uuid {
        None => transactions.iter().collect(),
        Some(target) => transactions
            .iter()
            .filter(|t| t.portfolio_uuid.is_none() || t.portfolio_uuid.as_deref() == Some(target))
            .collect(),
    }
}

/// Sorts transactions into non-decreasing date order (stable, so same-date
/// transactions keep their relative input order — this is what gives BUYs on
/// the same date their insertion-order tie-break in the ledger, §3).
fn sorted_by_date<'a>(transactions: &[&'a Transaction]) -> Vec<&'a Transaction> {
    let mut sorted = transactions.to_vec();
    sorted.sort_by_key(|t| t.date);
    sorted
}

/// Builds one [`FifoLedger`] per security referenced in `transactions`.
///
/// BUY and DELIVERY_IN append lots; SELL and DELIVERY_OUT consume them.
/// DIVIDEND transactions are ignored here (see [`distributions_by_year`]).
/// A SELL/DELIVERY_OUT that exceeds the ledger's current units is logged at
/// `warn` and dropped, not propagated — the dataset may predate the earliest
/// known buy for that security.
pub fn build_ledgers(transactions: &[Transaction], portfolio_uuid: Option<&str>) -> HashMap<String, FifoLedger> {
    let scoped = transactions_for_portfolio(transactions, portfolio_uuid);
    let ordered = sorted_by_date(&scoped);

    let mut ledgers: HashMap<String, FifoLedger> = HashMap::new();
    for tx in ordered {
        let ledger = ledgers
            .entry(tx.security_uuid.clone())
            .or_insert_with(|| FifoLedger::new(tx.security_uuid.clone()));

        match tx.kind {
            TransactionKind::Buy | TransactionKind::DeliveryIn => {
                ledger.buy(tx.date, tx.units, tx.effective_unit_price());
            }
            TransactionKind::Sell | TransactionKind::DeliveryOut => {
                if let Err(err) = ledger.sell(tx.date, tx.units, tx.effective_unit_price()) {
                    log::warn!(
                        "dropping historical sell for security {} on {}: {}",
                        tx.security_uuid,
                        tx.date,
                        err
                    );
                }
            }
            TransactionKind::Dividend => {}
        }
    }

    ledgers
}

/// Like [`build_ledgers`], but propagates [`crate::error::EngineError::InsufficientUnits`]
/// instead of swallowing it. Intended for caller-originated replay (e.g. a
/// test harness validating a hand-built transaction list) where a sell that
/// does not fit the known lots is a bug, not a dataset artifact.
pub fn build_ledgers_strict(transactions: &[Transaction], portfolio_uuid: Option<&str>) -> Result<HashMap<String, FifoLedger>> {
    let scoped = transactions_for_portfolio(transactions, portfolio_uuid);
    let ordered = sorted_by_date(&scoped);

    let mut ledgers: HashMap<String, FifoLedger> = HashMap::new();
    for tx in ordered {
        let ledger = ledgers
            .entry(tx.security_uuid.clone())
            .or_insert_with(|| FifoLedger::new(tx.security_uuid.clone()));

        match tx.kind {
            TransactionKind::Buy | TransactionKind::DeliveryIn => {
                ledger.buy(tx.date, tx.units, tx.effective_unit_price());
            }
            TransactionKind::Sell | TransactionKind::DeliveryOut => {
                ledger.sell(tx.date, tx.units, tx.effective_unit_price())?;
            }
            TransactionKind::Dividend => {}
        }
    }

    Ok(ledgers)
}

/// Sums DIVIDEND gross amounts per security, per calendar year, for use by
/// [`crate::allocator::apply_vorabpauschalen`].
pub fn distributions_by_year(transactions: &[Transaction]) -> HashMap<String, DistributionsByYear> {
    let mut by_security: HashMap<String, DistributionsByYear> = HashMap::new();
    for tx in transactions {
        if tx.kind != TransactionKind::Dividend {
            continue;
        }
        let by_year = by_security.entry(tx.security_uuid.clone()).or_default();
        *by_year.entry(tx.date.year()).or_default() += tx.gross_amount;
    }
    by_security
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx(date_: chrono::NaiveDate, kind: TransactionKind, units: Decimal, price: Decimal, portfolio: Option<&str>) -> Transaction {
        Transaction {
            date: date_,
            kind,
            security_uuid: "s1".to_string(),
            units,
            unit_price: price,
            gross_amount: units * price,
            fees: Decimal::ZERO,
            taxes: Decimal::ZERO,
            portfolio_uuid: portfolio.map(|s| s.to_string()),
        }
    }

    #[test]
    fn builds_ledger_sorted_by_date_regardless_of_input_order() {
        let txs = vec![
            tx(date(2023, 1, 1), TransactionKind::Buy, dec!(10), dec!(60), None),
            tx(date(2022, 1, 1), TransactionKind::Buy, dec!(10), dec!(50), None),
        ];
        let ledgers = build_ledgers(&txs, None);
        let ledger = &ledgers["s1"];
        assert_eq!(ledger.lots()[0].buy_date, date(2022, 1, 1));
        assert_eq!(ledger.lots()[1].buy_date, date(2023, 1, 1));
    }

    #[test]
    fn historical_insufficient_sell_is_swallowed() {
        let txs = vec![tx(date(2023, 1, 1), TransactionKind::Sell, dec!(10), dec!(60), None)];
        let ledgers = build_ledgers(&txs, None);
        assert_eq!(ledgers["s1"].total_units(), Decimal::ZERO);
    }

    #[test]
    fn strict_construction_propagates_insufficient_units() {
        let txs = vec![tx(date(2023, 1, 1), TransactionKind::Sell, dec!(10), dec!(60), None)];
        let err = build_ledgers_strict(&txs, None).unwrap_err();
        assert!(matches!(err, crate::error::EngineError::InsufficientUnits { .. }));
    }

    #[test]
    fn portfolio_scoping_includes_unassigned_transactions() {
        let txs = vec![
            tx(date(2023, 1, 1), TransactionKind::Buy, dec!(10), dec!(50), Some("p1")),
            tx(date(2023, 1, 2), TransactionKind::Buy, dec!(5), dec!(50), Some("p2")),
            tx(date(2023, 1, 3), TransactionKind::Buy, dec!(2), dec!(50), None),
        ];
        let scoped = transactions_for_portfolio(&txs, Some("p1"));
        assert_eq!(scoped.len(), 2);
    }

    #[test]
    fn distributions_are_summed_per_security_per_year() {
        let mut txs = vec![tx(date(2023, 3, 1), TransactionKind::Dividend, dec!(1), dec!(50), None)];
        txs.push(tx(date(2023, 9, 1), TransactionKind::Dividend, dec!(1), dec!(30), None));
        let by_sec = distributions_by_year(&txs);
        assert_eq!(by_sec["s1"][&2023], dec!(80));
    }
}
