//! Vorabpauschale (advance lump sum) calculation per §18 InvStG (§4.C).

use crate::model::{FundType, Security};
use crate::money::round2;
use crate::params::TaxParameters;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Full breakdown of one security's Vorabpauschale for one tax year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VorabpauschaleResult {
    pub security_uuid: String,
    pub year: i32,
    pub value_start: Decimal,
    pub value_end: Decimal,
    pub basiszins: Decimal,
    pub basisertrag: Decimal,
    pub value_increase: Decimal,
    pub distributions: Decimal,
    pub vorabpauschale_gross: Decimal,
    pub teilfreistellung_satz: Decimal,
    pub vorabpauschale_taxable: Decimal,
    pub tax: Decimal,
}

fn zero_result(
    security: &Security,
    year: i32,
    value_start: Decimal,
    value_end: Decimal,
    basiszins: Decimal,
    tfs: Decimal,
    distributions: Decimal,
) -> VorabpauschaleResult {
    VorabpauschaleResult {
        security_uuid: security.uuid.clone(),
        year,
        value_start,
        value_end,
        basiszins,
        basisertrag: Decimal::ZERO,
        value_increase: value_end - value_start,
        distributions,
        vorabpauschale_gross: Decimal::ZERO,
        teilfreistellung_satz: tfs,
        vorabpauschale_taxable: Decimal::ZERO,
        tax: Decimal::ZERO,
    }
}

/// Computes the Vorabpauschale for one security and tax year, following the
/// eight numbered rules of §18 InvStG.
///
/// `buy_date`, when it falls within `year`, scales the gross amount down to
/// the number of full months remaining after the purchase month (rule 6a).
pub fn calculate(
    params: &TaxParameters,
    security: &Security,
    year: i32,
    value_start: Decimal,
    value_end: Decimal,
    distributions: Decimal,
    buy_date: Option<NaiveDate>,
) -> crate::error::Result<VorabpauschaleResult> {
    let basiszins = params.basiszins_vorabpauschale(year)?;
    let faktor = params.vorabpauschale_faktor(year)?;
    let tfs = fund_type_tfs(params, security.fund_type, year)?;

    // Rule: negative Basiszins -> Vorabpauschale is zero.
    if basiszins < Decimal::ZERO {
        return Ok(zero_result(security, year, value_start, value_end, basiszins, tfs, distributions));
    }

    // 1. Basisertrag = value at 1 Jan * Basiszins * 0.7
    let basisertrag = round2(value_start * basiszins * faktor);

    // 2. Value increase across the year.
    let value_increase = value_end - value_start;

    // 3. Non-positive increase -> Vorabpauschale is zero.
    if value_increase <= Decimal::ZERO {
        return Ok(zero_result(security, year, value_start, value_end, basiszins, tfs, distributions));
    }

    // 4. Gross Vorabpauschale = min(Basisertrag, value increase).
    let mut vp_gross = basisertrag.min(value_increase);

    // 5. Deduct distributions already received during the year.
    vp_gross -= distributions;

    // 6. Floor at zero.
    vp_gross = vp_gross.max(Decimal::ZERO);

    // In-year purchase: scale by full months remaining after the buy month.
    if let Some(bd) = buy_date {
        if bd.year() == year {
            let full_months_before_buy = Decimal::from(bd.month() as i64 - 1);
            let scale = (Decimal::from(12) - full_months_before_buy) / Decimal::from(12);
            vp_gross = round2(vp_gross * scale);
        }
    }

    // 7. Taxable portion after Teilfreistellung.
    let vp_taxable = round2(vp_gross * (Decimal::ONE - tfs));

    // 8. Tax owed at the combined capital-gains rate. Church tax is applied
    // by the caller via `params.combined_tax_rate`, passed in separately
    // where a filer's church-tax status is known; here the tax column uses
    // the secular rate, matching the unqualified `Gesamtsteuersatz` call the
    // per-security computation makes before any filer-level adjustment.
    let rate = params.combined_tax_rate(year, false, "default")?;
    let tax = round2(vp_taxable * rate);

    Ok(VorabpauschaleResult {
        security_uuid: security.uuid.clone(),
        year,
        value_start,
        value_end,
        basiszins,
        basisertrag,
        value_increase,
        distributions,
        vorabpauschale_gross: vp_gross,
        teilfreistellung_satz: tfs,
        vorabpauschale_taxable: vp_taxable,
        tax,
    })
}

fn fund_type_tfs(params: &TaxParameters, fund_type: FundType, year: i32) -> crate::error::Result<Decimal> {
    params.teilfreistellung(year, fund_type.param_key())
}

use chrono::Datelike;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::tax_parameters;
    use rust_decimal_macros::dec;

    fn aktienfonds() -> Security {
        Security::new("test", "Test", FundType::Aktienfonds, true)
    }

    #[test]
    fn fall1_normal_positive_increase() {
        let params = tax_parameters();
        let sec = aktienfonds();
        let erg = calculate(params, &sec, 2023, dec!(10000), dec!(12000), Decimal::ZERO, None).unwrap();
        assert_eq!(erg.basisertrag, dec!(178.50));
        assert_eq!(erg.vorabpauschale_gross, dec!(178.50));
        assert_eq!(erg.vorabpauschale_taxable, dec!(124.95));
        assert_eq!(erg.tax, dec!(32.96));
    }

    #[test]
    fn fall2_increase_smaller_than_basisertrag() {
        let params = tax_parameters();
        let sec = aktienfonds();
        let erg = calculate(params, &sec, 2023, dec!(10000), dec!(10100), Decimal::ZERO, None).unwrap();
        assert_eq!(erg.vorabpauschale_gross, dec!(100));
    }

    #[test]
    fn fall3_negative_basiszins_is_zero() {
        let params = tax_parameters();
        let sec = aktienfonds();
        let erg = calculate(params, &sec, 2021, dec!(10000), dec!(12000), Decimal::ZERO, None).unwrap();
        assert_eq!(erg.vorabpauschale_gross, Decimal::ZERO);
        assert_eq!(erg.tax, Decimal::ZERO);
    }

    #[test]
    fn fall4_value_loss_is_zero() {
        let params = tax_parameters();
        let sec = aktienfonds();
        let erg = calculate(params, &sec, 2023, dec!(10000), dec!(9000), Decimal::ZERO, None).unwrap();
        assert_eq!(erg.vorabpauschale_gross, Decimal::ZERO);
        assert_eq!(erg.tax, Decimal::ZERO);
    }

    #[test]
    fn fall5_full_distribution_offset() {
        let params = tax_parameters();
        let sec = aktienfonds();
        let erg = calculate(params, &sec, 2023, dec!(10000), dec!(12000), dec!(200), None).unwrap();
        assert_eq!(erg.vorabpauschale_gross, Decimal::ZERO);
    }

    #[test]
    fn fall5_partial_distribution_offset() {
        let params = tax_parameters();
        let sec = aktienfonds();
        let erg = calculate(params, &sec, 2023, dec!(10000), dec!(12000), dec!(100), None).unwrap();
        assert_eq!(erg.vorabpauschale_gross, dec!(78.50));
    }

    #[test]
    fn fall6_in_year_purchase_in_march() {
        let params = tax_parameters();
        let sec = aktienfonds();
        let buy = NaiveDate::from_ymd_opt(2023, 3, 15).unwrap();
        let erg = calculate(params, &sec, 2023, dec!(10000), dec!(12000), Decimal::ZERO, Some(buy)).unwrap();
        assert_eq!(erg.vorabpauschale_gross, dec!(148.75));
    }

    #[test]
    fn fall7_mischfonds_teilfreistellung() {
        let params = tax_parameters();
        let sec = Security::new("test", "Test", FundType::Mischfonds, true);
        let erg = calculate(params, &sec, 2023, dec!(10000), dec!(12000), Decimal::ZERO, None).unwrap();
        assert_eq!(erg.teilfreistellung_satz, dec!(0.15));
        assert_eq!(erg.vorabpauschale_taxable, dec!(151.73));
    }

    #[test]
    fn fall7_sonstige_no_exemption() {
        let params = tax_parameters();
        let sec = Security::new("test", "Test", FundType::Sonstige, true);
        let erg = calculate(params, &sec, 2023, dec!(10000), dec!(12000), Decimal::ZERO, None).unwrap();
        assert_eq!(erg.teilfreistellung_satz, Decimal::ZERO);
        assert_eq!(erg.vorabpauschale_taxable, erg.vorabpauschale_gross);
    }
}
