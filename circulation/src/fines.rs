//! Overdue fine computation and aggregation.
//!
//! Dates are calendar dates. Timestamps are truncated to dates before they
//! reach this module, so a return one minute after midnight on the day after
//! the due date already counts as one overdue day.

use crate::types::{BorrowingRecord, Money, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whole days `returned` lies after `due`; zero when on time.
#[must_use]
pub fn overdue_days(due: NaiveDate, returned: NaiveDate) -> u64 {
    let days = (returned - due).num_days();
    u64::try_from(days).unwrap_or(0)
}

/// Fine for returning on `returned` an item due on `due`.
#[must_use]
pub fn compute_fine(due: NaiveDate, returned: NaiveDate, fine_per_day: Money) -> Money {
    fine_per_day.saturating_mul(overdue_days(due, returned))
}

/// Fine an open record would be charged if it came back `today`.
#[must_use]
pub fn accrued_fine(record: &BorrowingRecord, today: NaiveDate, fine_per_day: Money) -> Money {
    if record.is_open() {
        compute_fine(record.due_date, today, fine_per_day)
    } else {
        Money::ZERO
    }
}

/// Sum of assessed fines across a user's records.
///
/// Every record with a positive fine counts, whether or not it has been
/// settled; the ledger keeps fines as a running balance.
#[must_use]
pub fn total_outstanding<'a, I>(records: I) -> Money
where
    I: IntoIterator<Item = &'a BorrowingRecord>,
{
    records
        .into_iter()
        .filter(|r| !r.fine_amount.is_zero())
        .map(|r| r.fine_amount)
        .sum()
}

/// Fine total for one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineSummary {
    /// Member
    pub user_id: UserId,
    /// Sum of positive fines
    pub total: Money,
    /// How many records carry a fine
    pub fined_records: u64,
}

impl FineSummary {
    /// Aggregate `records` (already restricted to `user_id`).
    #[must_use]
    pub fn for_user<'a, I>(user_id: UserId, records: I) -> Self
    where
        I: IntoIterator<Item = &'a BorrowingRecord>,
    {
        let fined: Vec<&BorrowingRecord> = records
            .into_iter()
            .filter(|r| r.user_id == user_id && !r.fine_amount.is_zero())
            .collect();
        Self {
            user_id,
            total: total_outstanding(fined.iter().copied()),
            fined_records: fined.len() as u64,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{BookId, BorrowingId, BorrowingStatus};
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn returned(user_id: UserId, fine: u64) -> BorrowingRecord {
        BorrowingRecord {
            id: BorrowingId::new(),
            book_id: BookId::new(),
            user_id,
            borrowed_date: day(2024, 1, 1),
            due_date: day(2024, 1, 15),
            return_date: Some(day(2024, 1, 20)),
            status: BorrowingStatus::Returned,
            fine_amount: Money::from_cents(fine),
            issued_by: None,
            returned_to: None,
        }
    }

    #[test]
    fn five_days_late_at_five_per_day() {
        let fine = compute_fine(day(2024, 1, 10), day(2024, 1, 15), Money::from_cents(500));
        assert_eq!(fine, Money::from_cents(2500));
        assert_eq!(fine.to_string(), "25.00");
    }

    #[test]
    fn on_time_and_early_returns_are_free() {
        let rate = Money::from_cents(500);
        assert_eq!(compute_fine(day(2024, 1, 10), day(2024, 1, 10), rate), Money::ZERO);
        assert_eq!(compute_fine(day(2024, 1, 10), day(2024, 1, 2), rate), Money::ZERO);
    }

    #[test]
    fn crossing_month_boundary_counts_calendar_days() {
        assert_eq!(overdue_days(day(2024, 2, 28), day(2024, 3, 1)), 2);
    }

    #[test]
    fn aggregation_counts_only_fined_records() {
        let member = UserId::new();
        let other = UserId::new();
        let records = [
            returned(member, 2500),
            returned(member, 0),
            returned(member, 750),
            returned(other, 10_000),
        ];

        let summary = FineSummary::for_user(member, &records);
        assert_eq!(summary.total, Money::from_cents(3250));
        assert_eq!(summary.fined_records, 2);
    }

    #[test]
    fn accrued_fine_ignores_closed_records() {
        let record = returned(UserId::new(), 0);
        assert_eq!(
            accrued_fine(&record, day(2024, 6, 1), Money::from_cents(500)),
            Money::ZERO
        );
    }

    proptest! {
        #[test]
        fn fine_is_days_late_times_rate(late in 0i64..400, rate in 0u64..10_000) {
            let due = day(2024, 1, 10);
            let ret = due + chrono::Duration::days(late);
            let fine = compute_fine(due, ret, Money::from_cents(rate));
            prop_assert_eq!(fine.cents(), rate * late as u64);
        }

        #[test]
        fn returns_on_or_before_due_are_never_fined(early in 0i64..400, rate in 0u64..10_000) {
            let due = day(2024, 6, 30);
            let ret = due - chrono::Duration::days(early);
            prop_assert!(compute_fine(due, ret, Money::from_cents(rate)).is_zero());
        }
    }
}
