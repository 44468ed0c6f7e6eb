//! Caller-facing settings threaded into the allowance optimiser and the
//! net-payout planner. The Rust analogue of the source engine's `AppConfig`
//! dataclass — there is no file-backed configuration to load; this simply
//! groups the filer-level knobs the query-boundary functions need.

use serde::{Deserialize, Serialize};

/// German joint-assessment vs. single-assessment filing status, which
/// determines the Sparerpauschbetrag band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    Single,
    Joint,
}

impl FilingStatus {
    /// The key this variant resolves to in the `sparerpauschbetrag` parameter table.
    pub fn param_key(&self) -> &'static str {
        match self {
            FilingStatus::Single => "single",
            FilingStatus::Joint => "joint",
        }
    }
}

/// Filer-level settings for one tax-year query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub year: i32,
    pub filing_status: FilingStatus,
    pub church_tax: bool,
    pub church_tax_region: String,
    pub allowance_already_used: rust_decimal::Decimal,
}

impl Config {
    pub fn new(year: i32, filing_status: FilingStatus) -> Self {
        Self {
            year,
            filing_status,
            church_tax: false,
            church_tax_region: "default".to_string(),
            allowance_already_used: rust_decimal::Decimal::ZERO,
        }
    }
}
