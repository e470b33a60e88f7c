//! Circulation reports: the summary dashboard and the overdue list.

use crate::fines;
use crate::types::{BookId, BorrowingRecord, Money};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How many titles the summary lists as most borrowed.
pub const TOP_BOOKS: u32 = 10;

/// Raw ledger totals as counted by a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounts {
    /// Every record ever opened
    pub total_borrowings: u64,
    /// Open records
    pub currently_borrowed: u64,
    /// Closed records
    pub returned: u64,
    /// Open records past due
    pub overdue: u64,
    /// Sum of assessed fines
    pub total_fines: Money,
    /// Records carrying a fine
    pub fined_records: u64,
    /// Distinct users with at least one fine
    pub users_with_fines: u64,
}

/// A title and how often it has been lent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularBook {
    /// Book
    pub book_id: BookId,
    /// Title
    pub title: String,
    /// Records referencing the book
    pub borrow_count: u64,
}

/// A loan joined with the names a report shows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanView {
    /// The record
    #[serde(flatten)]
    pub record: BorrowingRecord,
    /// Title of the borrowed book
    pub book_title: String,
    /// Borrower's username
    pub username: String,
    /// Borrower's full name
    pub full_name: String,
}

/// Dashboard figures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySummary {
    /// Day the figures were computed for
    pub as_of: NaiveDate,
    /// Raw totals
    #[serde(flatten)]
    pub counts: LedgerCounts,
    /// Mean fine across fined records
    pub average_fine: Money,
    /// Most borrowed titles, most popular first
    pub most_borrowed: Vec<PopularBook>,
}

impl LibrarySummary {
    /// Assemble the summary from store totals.
    #[must_use]
    pub fn new(as_of: NaiveDate, counts: LedgerCounts, most_borrowed: Vec<PopularBook>) -> Self {
        let average_fine = counts
            .total_fines
            .average_over(counts.fined_records)
            .unwrap_or(Money::ZERO);
        Self {
            as_of,
            counts,
            average_fine,
            most_borrowed,
        }
    }
}

/// One line of the overdue report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueLoan {
    /// The open loan
    #[serde(flatten)]
    pub loan: LoanView,
    /// Whole days past due
    pub days_overdue: u64,
    /// Fine if returned today at the current rate
    pub accrued_fine: Money,
}

/// Build the overdue report from open loans past due, most overdue first.
#[must_use]
pub fn overdue_report(loans: Vec<LoanView>, today: NaiveDate, fine_per_day: Money) -> Vec<OverdueLoan> {
    let mut report: Vec<OverdueLoan> = loans
        .into_iter()
        .filter(|loan| loan.record.is_overdue(today))
        .map(|loan| OverdueLoan {
            days_overdue: fines::overdue_days(loan.record.due_date, today),
            accrued_fine: fines::accrued_fine(&loan.record, today, fine_per_day),
            loan,
        })
        .collect();
    report.sort_by(|a, b| {
        b.days_overdue
            .cmp(&a.days_overdue)
            .then_with(|| a.loan.book_title.cmp(&b.loan.book_title))
    });
    report
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{BorrowingId, BorrowingStatus, UserId};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).expect("valid date")
    }

    fn loan(title: &str, due: u32, status: BorrowingStatus) -> LoanView {
        LoanView {
            record: BorrowingRecord {
                id: BorrowingId::new(),
                book_id: BookId::new(),
                user_id: UserId::new(),
                borrowed_date: day(1),
                due_date: day(due),
                return_date: (status != BorrowingStatus::Borrowed).then_some(day(20)),
                status,
                fine_amount: Money::ZERO,
                issued_by: None,
                returned_to: None,
            },
            book_title: title.to_string(),
            username: "reader".to_string(),
            full_name: "A Reader".to_string(),
        }
    }

    #[test]
    fn overdue_report_lists_open_past_due_loans() {
        let loans = vec![
            loan("Beloved", 10, BorrowingStatus::Borrowed),
            loan("Ulysses", 5, BorrowingStatus::Borrowed),
            loan("Walden", 25, BorrowingStatus::Borrowed),
            loan("Emma", 2, BorrowingStatus::Returned),
        ];

        let report = overdue_report(loans, day(15), Money::from_cents(100));

        assert_eq!(report.len(), 2);
        assert_eq!(report[0].loan.book_title, "Ulysses");
        assert_eq!(report[0].days_overdue, 10);
        assert_eq!(report[0].accrued_fine, Money::from_cents(1000));
        assert_eq!(report[1].loan.book_title, "Beloved");
    }

    #[test]
    fn summary_average_covers_fined_records_only() {
        let counts = LedgerCounts {
            total_borrowings: 3,
            returned: 3,
            total_fines: Money::from_cents(3250),
            fined_records: 2,
            users_with_fines: 1,
            ..LedgerCounts::default()
        };
        let summary = LibrarySummary::new(day(1), counts, Vec::new());
        assert_eq!(summary.average_fine, Money::from_cents(1625));

        let empty = LibrarySummary::new(day(1), LedgerCounts::default(), Vec::new());
        assert!(empty.average_fine.is_zero());
    }
}
