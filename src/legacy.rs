//! Legacy (Bestandsschutz) exemption for pre-2009 direct equities (§4.H).

use chrono::NaiveDate;
use once_cell::sync::Lazy;

/// Cut-off date: positions acquired strictly before this date are
/// legacy-exempt, if they are direct equities.
pub static CUTOFF: Lazy<NaiveDate> = Lazy::new(|| NaiveDate::from_ymd_opt(2009, 1, 1).unwrap());

/// A lot is legacy-exempt iff it was bought strictly before 2009-01-01 and
/// the security is not a fund. The comparison is strict: 2009-01-01 itself
/// is not exempt.
pub fn is_legacy_exempt(buy_date: NaiveDate, is_fund: bool) -> bool {
    buy_date < *CUTOFF && !is_fund
}
