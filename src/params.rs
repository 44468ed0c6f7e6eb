//! Year-indexed tax-parameter lookup (§4.A).
//!
//! The table is loaded once per process from the bundled
//! `data/tax_parameters.json` and cached behind a [`once_cell::sync::Lazy`] —
//! in a single-threaded engine this is simply the cheapest correct one-shot
//! initialiser available.

use crate::error::{EngineError, Result};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;

const RAW_TAX_PARAMETERS: &str = include_str!("../data/tax_parameters.json");

static TAX_PARAMETERS: Lazy<TaxParameters> =
    Lazy::new(|| TaxParameters::from_json_str(RAW_TAX_PARAMETERS).expect("bundled tax_parameters.json is malformed"));

/// A single parameter's year-keyed step table.
#[derive(Debug, Clone)]
struct StepTable(BTreeMap<i32, Value>);

impl StepTable {
    /// Value for the greatest stored year <= `year`, if any.
    fn lookup(&self, year: i32) -> Option<&Value> {
        self.0.range(..=year).next_back().map(|(_, v)| v)
    }
}

/// The process-wide tax-parameter table (§4.A).
#[derive(Debug, Clone)]
pub struct TaxParameters {
    params: BTreeMap<String, StepTable>,
}

impl TaxParameters {
    fn from_json_str(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        let root: BTreeMap<String, Value> = serde_json::from_str(raw)?;
        let mut params = BTreeMap::new();
        for (name, value) in root {
            if name == "_comment" {
                continue;
            }
            let Value::Object(years) = value else { continue };
            let mut table = BTreeMap::new();
            for (key, v) in years {
                if key == "_comment" {
                    continue;
                }
                if let Ok(year) = key.parse::<i32>() {
                    if year > 0 {
                        table.insert(year, v);
                    }
                }
            }
            params.insert(name, StepTable(table));
        }
        Ok(TaxParameters { params })
    }

    /// Raw JSON lookup: §4.A's `get_param(name, year)`.
    pub fn get_raw(&self, name: &str, year: i32) -> Result<&Value> {
        let table = self
            .params
            .get(name)
            .ok_or_else(|| EngineError::UnknownParameter(name.to_string()))?;
        table.lookup(year).ok_or_else(|| EngineError::NoValidEntry {
            param: name.to_string(),
            year,
        })
    }

    fn get_decimal(&self, name: &str, year: i32) -> Result<Decimal> {
        let raw = self.get_raw(name, year)?;
        json_to_decimal(raw)
    }

    pub fn abgeltungssteuer_satz(&self, year: i32) -> Result<Decimal> {
        self.get_decimal("abgeltungssteuer_satz", year)
    }

    pub fn solidaritaetszuschlag_satz(&self, year: i32) -> Result<Decimal> {
        self.get_decimal("solidaritaetszuschlag_satz", year)
    }

    pub fn kirchensteuer_satz(&self, year: i32, region: &str) -> Result<Decimal> {
        let raw = self.get_raw("kirchensteuer_saetze", year)?;
        let obj = raw.as_object().ok_or_else(|| EngineError::NoValidEntry {
            param: "kirchensteuer_saetze".to_string(),
            year,
        })?;
        let value = obj.get(region).or_else(|| obj.get("default")).ok_or_else(|| EngineError::NoValidEntry {
            param: "kirchensteuer_saetze".to_string(),
            year,
        })?;
        json_to_decimal(value)
    }

    pub fn sparerpauschbetrag(&self, year: i32, filing_status: &str) -> Result<Decimal> {
        let raw = self.get_raw("sparerpauschbetrag", year)?;
        let obj = raw.as_object().ok_or_else(|| EngineError::NoValidEntry {
            param: "sparerpauschbetrag".to_string(),
            year,
        })?;
        let value = obj.get(filing_status).ok_or_else(|| EngineError::NoValidEntry {
            param: "sparerpauschbetrag".to_string(),
            year,
        })?;
        json_to_decimal(value)
    }

    pub fn basiszins_vorabpauschale(&self, year: i32) -> Result<Decimal> {
        self.get_decimal("basiszins_vorabpauschale", year)
    }

    pub fn vorabpauschale_faktor(&self, year: i32) -> Result<Decimal> {
        self.get_decimal("vorabpauschale_faktor", year)
    }

    pub fn teilfreistellung(&self, year: i32, fund_type_key: &str) -> Result<Decimal> {
        let raw = self.get_raw("teilfreistellung", year)?;
        let obj = raw.as_object().ok_or_else(|| EngineError::NoValidEntry {
            param: "teilfreistellung".to_string(),
            year,
        })?;
        let value = obj.get(fund_type_key).ok_or_else(|| EngineError::NoValidEntry {
            param: "teilfreistellung".to_string(),
            year,
        })?;
        json_to_decimal(value)
    }

    /// Combined capital-gains tax rate (§4.A).
    ///
    /// Without church tax: `e + e*s`. With church tax (§32d Abs.1 Satz 3 EStG),
    /// the base rate is reduced first: `e_eff = e / (1 + k*e)`, then
    /// `e_eff + e_eff*s + e_eff*k`.
    pub fn combined_tax_rate(&self, year: i32, church: bool, region: &str) -> Result<Decimal> {
        let e = self.abgeltungssteuer_satz(year)?;
        let s = self.solidaritaetszuschlag_satz(year)?;
        if !church {
            return Ok(e + e * s);
        }
        let k = self.kirchensteuer_satz(year, region)?;
        let e_eff = e / (Decimal::ONE + k * e);
        Ok(e_eff + e_eff * s + e_eff * k)
    }
}

fn json_to_decimal(value: &Value) -> Result<Decimal> {
    match value {
        Value::Number(n) => Decimal::try_from(n.as_f64().unwrap_or_default())
            .map_err(|_| EngineError::MalformedAmount(n.to_string())),
        Value::String(s) => s.parse::<Decimal>().map_err(|_| EngineError::MalformedAmount(s.clone())),
        other => Err(EngineError::MalformedAmount(other.to_string())),
    }
}

/// Borrow the process-wide, lazily-initialised tax-parameter table.
pub fn tax_parameters() -> &'static TaxParameters {
    &TAX_PARAMETERS
}
