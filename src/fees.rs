//! Late fee policy.
//!
//! The first week overdue costs $0.50 per day, every later day $1.00, and a
//! single loan never accrues more than $15.00.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};

pub const LOAN_PERIOD_DAYS: i64 = 14;

const TIER_ONE_DAYS: i64 = 7;
const TIER_ONE_DAILY: Cents = Cents(50);
const TIER_TWO_DAILY: Cents = Cents(100);
pub const MAX_LATE_FEE: Cents = Cents(1500);

/// A currency amount in whole cents. Serialized as a dollar value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    /// Converts a dollar amount, rounding to the nearest cent.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_dollars(dollars: f64) -> Self {
        Cents((dollars * 100.0).round() as i64)
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::Add for Cents {
    type Output = Cents;

    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Cents {
        iter.fold(Cents::ZERO, |acc, c| acc + c)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Cents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_dollars())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LateFee {
    pub fee_amount: Cents,
    pub days_overdue: i64,
}

impl LateFee {
    pub const NONE: LateFee = LateFee {
        fee_amount: Cents::ZERO,
        days_overdue: 0,
    };
}

/// Outcome of a late fee lookup. `NotImplemented` means fees are switched off,
/// which is distinct from a computed zero fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeLookup {
    Computed(LateFee),
    NotImplemented,
}

#[must_use]
pub fn due_date_for(borrow_date: DateTime<Utc>) -> DateTime<Utc> {
    borrow_date + Duration::days(LOAN_PERIOD_DAYS)
}

/// Whole days elapsed from `due_date` to `reference`, floored at zero.
#[must_use]
pub fn days_overdue(due_date: DateTime<Utc>, reference: DateTime<Utc>) -> i64 {
    (reference - due_date).num_days().max(0)
}

#[must_use]
pub fn fee_for_days(days_overdue: i64) -> Cents {
    let days = days_overdue.max(0);
    let first = days.min(TIER_ONE_DAYS) * TIER_ONE_DAILY.0;
    let rest = (days - TIER_ONE_DAYS).max(0) * TIER_TWO_DAILY.0;
    Cents((first + rest).min(MAX_LATE_FEE.0))
}

/// Late fee for a loan due at `due_date`, as of `reference` (the return date,
/// or "now" for a loan that is still open).
#[must_use]
pub fn calculate_late_fee(due_date: DateTime<Utc>, reference: DateTime<Utc>) -> LateFee {
    let days_overdue = days_overdue(due_date, reference);
    LateFee {
        fee_amount: fee_for_days(days_overdue),
        days_overdue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn on_time_return_is_free() {
        assert_eq!(calculate_late_fee(due(), due()), LateFee::NONE);
        assert_eq!(
            calculate_late_fee(due(), due() - Duration::days(3)),
            LateFee::NONE
        );
    }

    #[test]
    fn partial_days_do_not_count() {
        let fee = calculate_late_fee(due(), due() + Duration::hours(23));
        assert_eq!(fee.days_overdue, 0);
        assert!(fee.fee_amount.is_zero());
    }

    #[test]
    fn tiers_and_cap() {
        assert_eq!(fee_for_days(3), Cents(150));
        assert_eq!(fee_for_days(7), Cents(350));
        assert_eq!(fee_for_days(10), Cents(650));
        assert_eq!(fee_for_days(18), Cents(1450));
        assert_eq!(fee_for_days(19), Cents(1500));
        assert_eq!(fee_for_days(40), MAX_LATE_FEE);
    }

    #[test]
    fn cents_display_and_json() {
        assert_eq!(Cents(650).to_string(), "$6.50");
        assert_eq!(serde_json::to_string(&Cents(650)).unwrap(), "6.5");
        assert_eq!(Cents::from_dollars(2.5), Cents(250));
    }
}
