//! Read-side ledger queries and report aggregates.

use super::rows::{
    BORROWING_COLUMNS, BorrowingRow, LoanViewRow, RESERVATION_COLUMNS, ReservationRow,
    convert_all, money_from_cents, to_u64,
};
use super::{PostgresLibrary, db_error};
use crate::error::PersistenceError;
use crate::fines::FineSummary;
use crate::reports::{LedgerCounts, LoanView, PopularBook};
use crate::store::{BorrowingFilter, LedgerQueries};
use crate::types::{
    BookId, BorrowingId, BorrowingRecord, BorrowingStatus, Reservation, ReservationId, UserId,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct CountsRow {
    total: i64,
    open: i64,
    overdue: i64,
    total_fines: i64,
    fined_records: i64,
    users_with_fines: i64,
}

#[derive(Debug, FromRow)]
struct PopularRow {
    book_id: Uuid,
    title: String,
    borrow_count: i64,
}

#[async_trait]
impl LedgerQueries for PostgresLibrary {
    async fn borrowing(&self, id: BorrowingId) -> Result<Option<BorrowingRecord>, PersistenceError> {
        let sql = format!("SELECT {BORROWING_COLUMNS} FROM borrowings br WHERE br.id = $1");
        sqlx::query_as::<_, BorrowingRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("load borrowing", &e))?
            .map(BorrowingRecord::try_from)
            .transpose()
    }

    async fn borrowings(
        &self,
        filter: &BorrowingFilter,
        today: NaiveDate,
    ) -> Result<Vec<BorrowingRecord>, PersistenceError> {
        // Display status: open rows past due read as overdue, legacy
        // 'overdue' rows read as returned.
        let sql = format!(
            "SELECT {BORROWING_COLUMNS} FROM borrowings br \
             WHERE ($1::UUID IS NULL OR br.user_id = $1) \
               AND ($2::UUID IS NULL OR br.book_id = $2) \
               AND ($3::DATE IS NULL OR br.borrowed_date >= $3) \
               AND ($4::DATE IS NULL OR br.borrowed_date <= $4) \
               AND ($5::TEXT IS NULL \
                    OR ($5 = 'borrowed' AND br.status = 'borrowed' AND br.due_date >= $6::DATE) \
                    OR ($5 = 'overdue' AND br.status = 'borrowed' AND br.due_date < $6::DATE) \
                    OR ($5 = 'returned' AND br.status <> 'borrowed')) \
             ORDER BY br.borrowed_date DESC, br.id"
        );
        let rows = sqlx::query_as::<_, BorrowingRow>(&sql)
            .bind(filter.user_id.map(|u| *u.as_uuid()))
            .bind(filter.book_id.map(|b| *b.as_uuid()))
            .bind(filter.date_from)
            .bind(filter.date_to)
            .bind(filter.status.map(BorrowingStatus::as_str))
            .bind(today)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list borrowings", &e))?;
        convert_all(rows)
    }

    async fn open_count_for_book(&self, book_id: BookId) -> Result<u32, PersistenceError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowings WHERE book_id = $1 AND status = 'borrowed'",
        )
        .bind(book_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("count open borrowings", &e))?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn fines_for_user(&self, user_id: UserId) -> Result<FineSummary, PersistenceError> {
        let (total, fined_records): (i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(fine_amount_cents), 0)::BIGINT, COUNT(*) \
             FROM borrowings WHERE user_id = $1 AND fine_amount_cents > 0",
        )
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("sum fines", &e))?;
        Ok(FineSummary {
            user_id,
            total: money_from_cents(total)?,
            fined_records: to_u64(fined_records),
        })
    }

    async fn overdue(&self, today: NaiveDate) -> Result<Vec<LoanView>, PersistenceError> {
        let sql = format!(
            "SELECT {BORROWING_COLUMNS}, b.title AS book_title, u.username, u.full_name \
             FROM borrowings br \
             JOIN books b ON b.id = br.book_id \
             JOIN users u ON u.id = br.user_id \
             WHERE br.status = 'borrowed' AND br.due_date < $1 \
             ORDER BY br.due_date, br.id"
        );
        let rows = sqlx::query_as::<_, LoanViewRow>(&sql)
            .bind(today)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list overdue", &e))?;
        rows.into_iter()
            .map(|row| -> Result<LoanView, PersistenceError> {
                Ok(LoanView {
                    record: BorrowingRecord::try_from(row.record)?,
                    book_title: row.book_title,
                    username: row.username,
                    full_name: row.full_name,
                })
            })
            .collect()
    }

    async fn counts(&self, today: NaiveDate) -> Result<LedgerCounts, PersistenceError> {
        let row = sqlx::query_as::<_, CountsRow>(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE status = 'borrowed') AS open, \
                    COUNT(*) FILTER (WHERE status = 'borrowed' AND due_date < $1) AS overdue, \
                    COALESCE(SUM(fine_amount_cents), 0)::BIGINT AS total_fines, \
                    COUNT(*) FILTER (WHERE fine_amount_cents > 0) AS fined_records, \
                    COUNT(DISTINCT user_id) FILTER (WHERE fine_amount_cents > 0) AS users_with_fines \
             FROM borrowings",
        )
        .bind(today)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("count borrowings", &e))?;

        let total = to_u64(row.total);
        let open = to_u64(row.open);
        Ok(LedgerCounts {
            total_borrowings: total,
            currently_borrowed: open,
            returned: total.saturating_sub(open),
            overdue: to_u64(row.overdue),
            total_fines: money_from_cents(row.total_fines)?,
            fined_records: to_u64(row.fined_records),
            users_with_fines: to_u64(row.users_with_fines),
        })
    }

    async fn most_borrowed(&self, limit: u32) -> Result<Vec<PopularBook>, PersistenceError> {
        let rows = sqlx::query_as::<_, PopularRow>(
            "SELECT b.id AS book_id, b.title, COUNT(br.id) AS borrow_count \
             FROM borrowings br JOIN books b ON b.id = br.book_id \
             GROUP BY b.id, b.title \
             ORDER BY borrow_count DESC, b.title \
             LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("most borrowed", &e))?;
        Ok(rows
            .into_iter()
            .map(|row| PopularBook {
                book_id: BookId::from_uuid(row.book_id),
                title: row.title,
                borrow_count: to_u64(row.borrow_count),
            })
            .collect())
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, PersistenceError> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations r WHERE r.id = $1");
        sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("load reservation", &e))?
            .map(Reservation::try_from)
            .transpose()
    }

    async fn reservations_for_user(&self, user_id: UserId) -> Result<Vec<Reservation>, PersistenceError> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations r \
             WHERE r.user_id = $1 ORDER BY r.reservation_date DESC, r.id"
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list reservations", &e))?;
        convert_all(rows)
    }
}
