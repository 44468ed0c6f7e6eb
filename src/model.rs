//! External value objects (§6.1 / §6.3 of the design).
//!
//! These are the plain types the engine consumes from — and returns to —
//! its collaborators (the portfolio-file parser, the renderer). The engine
//! never mutates a `Security`, `Price`, or `Portfolio` after construction.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fund-type classification, used to resolve the Teilfreistellung ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundType {
    Aktienfonds,
    Mischfonds,
    ImmobilienfondsInland,
    ImmobilienfondsAusland,
    Sonstige,
}

impl FundType {
    /// The key this variant resolves to in the `teilfreistellung` parameter table.
    pub fn param_key(&self) -> &'static str {
        match self {
            FundType::Aktienfonds => "aktienfonds",
            FundType::Mischfonds => "mischfonds",
            FundType::ImmobilienfondsInland => "immobilienfonds_inland",
            FundType::ImmobilienfondsAusland => "immobilienfonds_ausland",
            FundType::Sonstige => "sonstige",
        }
    }
}

/// A security (stock, ETF, fund) as supplied by the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    pub uuid: String,
    pub name: String,
    pub isin: Option<String>,
    pub wkn: Option<String>,
    pub fund_type: FundType,
    /// False for direct equities; drives the Bestandsschutz legacy exemption.
    pub is_fund: bool,
}

impl Security {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, fund_type: FundType, is_fund: bool) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            isin: None,
            wkn: None,
            fund_type,
            is_fund,
        }
    }
}

/// Transaction kind (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Buy,
    Sell,
    DeliveryIn,
    DeliveryOut,
    Dividend,
}

impl TransactionKind {
    /// Whether this kind adds units to a FIFO ledger (vs. consuming them).
    pub fn is_purchase(&self) -> bool {
        matches!(self, TransactionKind::Buy | TransactionKind::DeliveryIn)
    }

    /// Whether this kind consumes units from a FIFO ledger.
    pub fn is_disposal(&self) -> bool {
        matches!(self, TransactionKind::Sell | TransactionKind::DeliveryOut)
    }
}

/// An immutable transaction, as supplied by the parser (§3, §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub date: NaiveDate,
    pub kind: TransactionKind,
    pub security_uuid: String,
    pub units: Decimal,
    pub unit_price: Decimal,
    pub gross_amount: Decimal,
    #[serde(default)]
    pub fees: Decimal,
    #[serde(default)]
    pub taxes: Decimal,
    pub portfolio_uuid: Option<String>,
}

impl Transaction {
    /// Per-unit price, derived as gross/units when not already known and units > 0.
    pub fn effective_unit_price(&self) -> Decimal {
        if self.unit_price != Decimal::ZERO {
            self.unit_price
        } else if self.units > Decimal::ZERO {
            self.gross_amount / self.units
        } else {
            Decimal::ZERO
        }
    }
}

/// A historical price point (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub security_uuid: String,
    pub date: NaiveDate,
    pub unit_price: Decimal,
}

/// Per-security price series: calendar date -> value. Duplicate dates
/// overwrite, as `BTreeMap::insert` does.
pub type PriceSeries = BTreeMap<NaiveDate, Decimal>;

/// Build one price series per security from a flat list of price points.
pub fn price_series_by_security(prices: &[Price]) -> std::collections::HashMap<String, PriceSeries> {
    let mut map: std::collections::HashMap<String, PriceSeries> = std::collections::HashMap::new();
    for p in prices {
        map.entry(p.security_uuid.clone())
            .or_default()
            .insert(p.date, p.unit_price);
    }
    map
}

/// A securities portfolio (Depot) (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub uuid: String,
    pub name: String,
    pub reference_account_uuid: Option<String>,
}
