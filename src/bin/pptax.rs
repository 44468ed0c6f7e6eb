//! `pptax` — the bulk-evaluation CLI collaborator described in spec §6.6.
//!
//! Reads a pre-parsed JSON ingest document (a stand-in for the real
//! XStream-XML/protobuf portfolio parser, which stays an external
//! collaborator per spec §1's non-goals) plus the bundled tax-parameter
//! table, and prints one of: a Vorabpauschale report, an
//! allowance-optimisation recommendation, or a net-payout plan.
//!
//! Exit code 0 on success; non-zero with a human-readable message on
//! failure, matching §6.6.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pptax_engine::allocator::{self, DistributionsByYear};
use pptax_engine::allowance;
use pptax_engine::config::{Config, FilingStatus as EngineFilingStatus};
use pptax_engine::construct;
use pptax_engine::error::EngineError;
use pptax_engine::ledger::FifoLedger;
use pptax_engine::model::{self, FundType, Portfolio, Price, Security, Transaction, TransactionKind};
use pptax_engine::params::tax_parameters;
use pptax_engine::payout;
use pptax_engine::vorabpauschale;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(err) = run() {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(name = "pptax", version, about = "German capital-gains tax engine for brokerage portfolios")]
struct Cli {
    /// Path to the JSON ingest document (securities, transactions, prices).
    #[arg(short, long, global = true)]
    ingest: PathBuf,

    /// Tax year to evaluate.
    #[arg(short, long, global = true)]
    year: i32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report the Vorabpauschale (advance lump sum) owed per fund holding.
    Vorabpauschale(VorabpauschaleArgs),
    /// Recommend lots to sell to exactly exhaust the remaining allowance.
    Allowance(FilingArgs),
    /// Plan a lot-by-lot sale reaching a requested net payout.
    Payout(PayoutArgs),
}

#[derive(Args, Debug)]
struct VorabpauschaleArgs {
    /// Restrict the report to one security UUID; default is every security in the ingest.
    #[arg(long)]
    security: Option<String>,
}

#[derive(Args, Debug)]
struct FilingArgs {
    #[command(flatten)]
    filing: FilingOpts,
}

#[derive(Args, Debug)]
struct PayoutArgs {
    /// Requested net payout amount.
    #[arg(short, long)]
    target: Decimal,

    #[command(flatten)]
    filing: FilingOpts,
}

#[derive(Args, Debug)]
struct FilingOpts {
    #[arg(long, value_enum, default_value = "single")]
    filing_status: FilingStatusArg,

    /// Allowance already consumed elsewhere this year.
    #[arg(long, default_value = "0")]
    already_used: Decimal,

    /// Apply church tax.
    #[arg(long, default_value_t = false)]
    church: bool,

    /// Church-tax region key (falls back to "default").
    #[arg(long, default_value = "default")]
    region: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FilingStatusArg {
    Single,
    Joint,
}

impl From<FilingStatusArg> for EngineFilingStatus {
    fn from(v: FilingStatusArg) -> Self {
        match v {
            FilingStatusArg::Single => EngineFilingStatus::Single,
            FilingStatusArg::Joint => EngineFilingStatus::Joint,
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let raw = std::fs::read_to_string(&cli.ingest)?;
    let doc: RawIngestDocument = serde_json::from_str(&raw)?;
    let ingest = doc.parse()?;

    match &cli.command {
        Command::Vorabpauschale(args) => report_vorabpauschale(&ingest, cli.year, args.security.as_deref()),
        Command::Allowance(args) => report_allowance(&ingest, cli.year, &args.filing),
        Command::Payout(args) => report_payout(&ingest, cli.year, args.target, &args.filing),
    }
}

/// The engine's plain value objects, decoded from the raw JSON ingest
/// document. Dates and decimal amounts arrive as strings in the ingest
/// format (§6.4: `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM`, or `YYYY-MM-DDTHH:MM:SS`),
/// narrowed/parsed here rather than by `serde`'s default `NaiveDate`/`Decimal`
/// impls, so that a malformed value surfaces as [`EngineError::UnparseableDate`]
/// or [`EngineError::MalformedAmount`] exactly as spec §7 describes: these two
/// error kinds belong to the ingest boundary, not the core engine types.
struct Ingest {
    securities: HashMap<String, Security>,
    transactions: Vec<Transaction>,
    prices: HashMap<String, model::PriceSeries>,
    current_prices: HashMap<String, Decimal>,
}

#[derive(Deserialize)]
struct RawIngestDocument {
    securities: Vec<RawSecurity>,
    transactions: Vec<RawTransaction>,
    prices: Vec<RawPrice>,
    #[serde(default)]
    current_prices: HashMap<String, String>,
    /// Accepted for forward compatibility with per-portfolio scoping; the
    /// CLI currently evaluates across all portfolios (§3's "all portfolios").
    #[serde(default)]
    #[allow(dead_code)]
    portfolios: Vec<Portfolio>,
}

#[derive(Deserialize)]
struct RawSecurity {
    #[serde(default)]
    uuid: Option<String>,
    name: String,
    isin: Option<String>,
    wkn: Option<String>,
    fund_type: FundType,
    is_fund: bool,
}

/// Synthesises a fresh identifier for an ingest record that didn't carry one
/// (a hand-written fixture, typically) rather than rejecting the document.
fn default_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Deserialize)]
struct RawTransaction {
    date: String,
    kind: TransactionKind,
    security_uuid: String,
    units: String,
    unit_price: String,
    gross_amount: String,
    #[serde(default)]
    fees: Option<String>,
    #[serde(default)]
    taxes: Option<String>,
    #[serde(default)]
    portfolio_uuid: Option<String>,
}

#[derive(Deserialize)]
struct RawPrice {
    security_uuid: String,
    date: String,
    unit_price: String,
}

impl RawIngestDocument {
    fn parse(self) -> Result<Ingest, EngineError> {
        let mut securities = HashMap::new();
        for s in self.securities {
            let uuid = s.uuid.unwrap_or_else(default_uuid);
            securities.insert(
                uuid.clone(),
                Security {
                    uuid,
                    name: s.name,
                    isin: s.isin,
                    wkn: s.wkn,
                    fund_type: s.fund_type,
                    is_fund: s.is_fund,
                },
            );
        }

        let mut transactions = Vec::with_capacity(self.transactions.len());
        for t in self.transactions {
            let units = parse_decimal(&t.units)?;
            let unit_price = parse_decimal(&t.unit_price)?;
            transactions.push(Transaction {
                date: parse_ingest_date(&t.date)?,
                kind: t.kind,
                security_uuid: t.security_uuid,
                units,
                unit_price,
                gross_amount: parse_decimal(&t.gross_amount)?,
                fees: t.fees.as_deref().map(parse_decimal).transpose()?.unwrap_or(Decimal::ZERO),
                taxes: t.taxes.as_deref().map(parse_decimal).transpose()?.unwrap_or(Decimal::ZERO),
                portfolio_uuid: t.portfolio_uuid,
            });
        }

        let mut flat_prices = Vec::with_capacity(self.prices.len());
        for p in self.prices {
            flat_prices.push(Price {
                security_uuid: p.security_uuid,
                date: parse_ingest_date(&p.date)?,
                unit_price: parse_decimal(&p.unit_price)?,
            });
        }
        let prices = model::price_series_by_security(&flat_prices);

        let mut current_prices = HashMap::new();
        for (uuid, raw) in self.current_prices {
            current_prices.insert(uuid, parse_decimal(&raw)?);
        }

        Ok(Ingest {
            securities,
            transactions,
            prices,
            current_prices,
        })
    }
}

/// Parses one of the three date-string shapes §6.4 accepts, narrowed to a
/// calendar date.
fn parse_ingest_date(raw: &str) -> Result<NaiveDate, EngineError> {
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return Ok(dt.date());
    }
    Err(EngineError::UnparseableDate(raw.to_string()))
}

fn parse_decimal(raw: &str) -> Result<Decimal, EngineError> {
    raw.trim().parse::<Decimal>().map_err(|_| EngineError::MalformedAmount(raw.to_string()))
}

fn build_ledgers(ingest: &Ingest) -> HashMap<String, FifoLedger> {
    construct::build_ledgers(&ingest.transactions, None)
}

fn distributions(ingest: &Ingest) -> HashMap<String, DistributionsByYear> {
    construct::distributions_by_year(&ingest.transactions)
}

fn report_vorabpauschale(ingest: &Ingest, year: i32, only_security: Option<&str>) -> anyhow::Result<()> {
    let params = tax_parameters();
    let mut ledgers = build_ledgers(ingest);
    let distributions_by_security = distributions(ingest);

    let mut securities: Vec<&String> = ingest.securities.keys().collect();
    securities.sort();

    for uuid in securities {
        if let Some(only) = only_security {
            if uuid != only {
                continue;
            }
        }
        let security = &ingest.securities[uuid];
        let Some(ledger) = ledgers.get_mut(uuid) else { continue };
        let empty = DistributionsByYear::new();
        let security_distributions = distributions_by_security.get(uuid).unwrap_or(&empty);
        let Some(prices) = ingest.prices.get(uuid) else { continue };

        allocator::apply_vorabpauschalen(params, ledger, security, prices, security_distributions, year)?;

        for (lot_idx, lot) in ledger.lots().iter().enumerate() {
            let Some(&current_price) = ingest.current_prices.get(uuid) else { continue };
            let buy_date = if lot.buy_date.year() == year { Some(lot.buy_date) } else { None };
            // Value at year start: the lot's own entry price if bought this
            // year, otherwise the nearest price around that year's Jan 1st.
            let start_price = if buy_date.is_some() {
                lot.entry_price
            } else {
                let jan1 = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
                match pptax_engine::price::nearest_price_default(prices, jan1) {
                    Some(p) => p,
                    None => continue,
                }
            };
            let value_start = start_price * lot.units_remaining;
            let value_end = current_price * lot.units_remaining;
            let result = vorabpauschale::calculate(
                params,
                security,
                year,
                value_start,
                value_end,
                Decimal::ZERO,
                buy_date,
            )?;
            println!(
                "{security} lot#{lot_idx} [{name}] year={year} basisertrag={basisertrag} gross={gross} taxable={taxable} tax={tax}",
                security = uuid,
                name = security.name,
                basisertrag = result.basisertrag,
                gross = result.vorabpauschale_gross,
                taxable = result.vorabpauschale_taxable,
                tax = result.tax,
            );
        }
    }

    Ok(())
}

fn report_allowance(ingest: &Ingest, year: i32, filing: &FilingOpts) -> anyhow::Result<()> {
    let params = tax_parameters();
    let ledgers = build_ledgers(ingest);
    let mut config = Config::new(year, filing.filing_status.into());
    config.allowance_already_used = filing.already_used;
    config.church_tax = filing.church;
    config.church_tax_region = filing.region.clone();

    let result = allowance::optimise(params, &config, &ledgers, &ingest.current_prices, &ingest.securities, None)?;

    println!(
        "allowance {year}: total={total} already_used={used} remaining={remaining}",
        total = result.total_allowance,
        used = result.already_used,
        remaining = result.remaining_allowance,
    );
    for p in &result.proposals {
        println!(
            "  sell {units} of {security} at {price} -> taxable_gain={taxable} tax={tax} net={net}",
            units = p.units,
            security = p.security_uuid,
            price = p.current_price,
            taxable = p.taxable_gain,
            tax = p.tax,
            net = p.net_proceeds,
        );
    }

    Ok(())
}

fn report_payout(ingest: &Ingest, year: i32, target: Decimal, filing: &FilingOpts) -> anyhow::Result<()> {
    let params = tax_parameters();
    let ledgers = build_ledgers(ingest);
    let mut config = Config::new(year, filing.filing_status.into());
    config.allowance_already_used = filing.already_used;
    config.church_tax = filing.church;
    config.church_tax_region = filing.region.clone();

    if !payout::is_reachable(target, &ledgers, &ingest.current_prices) {
        log::warn!("requested net payout {target} exceeds the portfolio's total current value");
    }

    let plan = payout::plan_net_payout(params, &config, target, &ledgers, &ingest.current_prices, &ingest.securities, None)?;

    println!(
        "payout plan: target={target} achieved={achieved} gross={gross} tax={tax} allowance_consumed={allowance}",
        target = plan.target_net,
        achieved = plan.achieved_net,
        gross = plan.gross_total,
        tax = plan.tax_total,
        allowance = plan.allowance_consumed,
    );
    for p in &plan.proposals {
        println!(
            "  sell {units} of {security} at {price} -> gross={gross} tax={tax} net={net}",
            units = p.units,
            security = p.security_uuid,
            price = p.current_price,
            gross = p.gross_proceeds,
            tax = p.tax,
            net = p.net_proceeds,
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ingest_dates_in_all_three_accepted_shapes() {
        assert!(parse_ingest_date("2023-05-01").is_ok());
        assert!(parse_ingest_date("2023-05-01T10:15:00").is_ok());
        assert!(parse_ingest_date("2023-05-01T10:15").is_ok());
        assert!(matches!(parse_ingest_date("not-a-date"), Err(EngineError::UnparseableDate(_))));
    }

    #[test]
    fn malformed_amount_is_rejected_at_the_ingest_boundary() {
        assert!(matches!(parse_decimal("not-a-number"), Err(EngineError::MalformedAmount(_))));
    }

    #[test]
    fn security_with_no_uuid_gets_one_synthesised() {
        let doc = RawIngestDocument {
            securities: vec![RawSecurity {
                uuid: None,
                name: "Fixture AG".to_string(),
                isin: None,
                wkn: None,
                fund_type: FundType::Sonstige,
                is_fund: false,
            }],
            transactions: vec![],
            prices: vec![],
            current_prices: HashMap::new(),
            portfolios: vec![],
        };
        let ingest = doc.parse().unwrap();
        assert_eq!(ingest.securities.len(), 1);
        let (uuid, security) = ingest.securities.iter().next().unwrap();
        assert!(!uuid.is_empty());
        assert_eq!(&security.uuid, uuid);
    }
}
