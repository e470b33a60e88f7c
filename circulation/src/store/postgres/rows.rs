//! Row types and their conversion to domain types.

use crate::error::PersistenceError;
use crate::types::{
    ActivityId, ActivityLogEntry, Author, AuthorId, Book, BookId, BorrowingId, BorrowingRecord,
    Category, CategoryId, Money, Reservation, ReservationId, User, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

pub(super) const BOOK_COLUMNS: &str = "b.id, b.title, b.isbn, b.author_id, b.category_id, \
     b.publisher, b.publish_year, b.pages, b.location, b.description, b.cover_image, \
     b.quantity, b.available_quantity";

pub(super) const USER_COLUMNS: &str =
    "u.id, u.username, u.email, u.full_name, u.phone, u.address, u.role, u.status, u.created_at";

pub(super) const BORROWING_COLUMNS: &str = "br.id, br.book_id, br.user_id, br.borrowed_date, \
     br.due_date, br.return_date, br.status, br.fine_amount_cents, br.issued_by, br.returned_to";

pub(super) const RESERVATION_COLUMNS: &str =
    "r.id, r.book_id, r.user_id, r.reservation_date, r.expiry_date, r.status";

fn corrupt(what: &str, detail: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::Corrupt(format!("{what}: {detail}"))
}

pub(super) fn to_u32(what: &str, value: i32) -> Result<u32, PersistenceError> {
    u32::try_from(value).map_err(|_| corrupt(what, format!("negative value {value}")))
}

pub(super) fn to_i32(what: &str, value: u32) -> Result<i32, PersistenceError> {
    i32::try_from(value).map_err(|_| PersistenceError::Database(format!("{what} {value} out of range")))
}

pub(super) fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

pub(super) fn money_from_cents(value: i64) -> Result<Money, PersistenceError> {
    u64::try_from(value)
        .map(Money::from_cents)
        .map_err(|_| corrupt("fine_amount_cents", format!("negative value {value}")))
}

pub(super) fn cents(amount: Money) -> Result<i64, PersistenceError> {
    i64::try_from(amount.cents())
        .map_err(|_| PersistenceError::Database(format!("amount {amount} out of range")))
}

#[derive(Debug, FromRow)]
pub(super) struct BookRow {
    id: Uuid,
    title: String,
    isbn: Option<String>,
    author_id: Option<Uuid>,
    category_id: Option<Uuid>,
    publisher: Option<String>,
    publish_year: Option<i32>,
    pages: Option<i32>,
    location: Option<String>,
    description: Option<String>,
    cover_image: Option<String>,
    quantity: i32,
    available_quantity: i32,
}

impl TryFrom<BookRow> for Book {
    type Error = PersistenceError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: BookId::from_uuid(row.id),
            title: row.title,
            isbn: row.isbn,
            author_id: row.author_id.map(AuthorId::from_uuid),
            category_id: row.category_id.map(CategoryId::from_uuid),
            publisher: row.publisher,
            publish_year: row.publish_year,
            pages: row.pages,
            location: row.location,
            description: row.description,
            cover_image: row.cover_image,
            quantity: to_u32("quantity", row.quantity)?,
            available_quantity: to_u32("available_quantity", row.available_quantity)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    full_name: String,
    phone: Option<String>,
    address: Option<String>,
    role: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = PersistenceError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::from_uuid(row.id),
            username: row.username,
            email: row.email,
            full_name: row.full_name,
            phone: row.phone,
            address: row.address,
            role: row.role.parse().map_err(|e| corrupt("role", e))?,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct AuthorRow {
    pub(super) id: Uuid,
    pub(super) name: String,
    pub(super) biography: Option<String>,
    pub(super) birth_date: Option<NaiveDate>,
    pub(super) nationality: Option<String>,
    #[sqlx(default)]
    pub(super) book_count: Option<i64>,
}

impl From<AuthorRow> for Author {
    fn from(row: AuthorRow) -> Self {
        Self {
            id: AuthorId::from_uuid(row.id),
            name: row.name,
            biography: row.biography,
            birth_date: row.birth_date,
            nationality: row.nationality,
        }
    }
}

#[derive(Debug, FromRow)]
pub(super) struct CategoryRow {
    pub(super) id: Uuid,
    pub(super) name: String,
    pub(super) description: Option<String>,
    #[sqlx(default)]
    pub(super) book_count: Option<i64>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::from_uuid(row.id),
            name: row.name,
            description: row.description,
        }
    }
}

#[derive(Debug, FromRow)]
pub(super) struct BorrowingRow {
    id: Uuid,
    book_id: Uuid,
    user_id: Uuid,
    borrowed_date: NaiveDate,
    due_date: NaiveDate,
    return_date: Option<NaiveDate>,
    status: String,
    fine_amount_cents: i64,
    issued_by: Option<Uuid>,
    returned_to: Option<Uuid>,
}

impl TryFrom<BorrowingRow> for BorrowingRecord {
    type Error = PersistenceError;

    fn try_from(row: BorrowingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: BorrowingId::from_uuid(row.id),
            book_id: BookId::from_uuid(row.book_id),
            user_id: UserId::from_uuid(row.user_id),
            borrowed_date: row.borrowed_date,
            due_date: row.due_date,
            return_date: row.return_date,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            fine_amount: money_from_cents(row.fine_amount_cents)?,
            issued_by: row.issued_by.map(UserId::from_uuid),
            returned_to: row.returned_to.map(UserId::from_uuid),
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct LoanViewRow {
    #[sqlx(flatten)]
    pub(super) record: BorrowingRow,
    pub(super) book_title: String,
    pub(super) username: String,
    pub(super) full_name: String,
}

#[derive(Debug, FromRow)]
pub(super) struct ReservationRow {
    id: Uuid,
    book_id: Uuid,
    user_id: Uuid,
    reservation_date: NaiveDate,
    expiry_date: NaiveDate,
    status: String,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = PersistenceError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ReservationId::from_uuid(row.id),
            book_id: BookId::from_uuid(row.book_id),
            user_id: UserId::from_uuid(row.user_id),
            reservation_date: row.reservation_date,
            expiry_date: row.expiry_date,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct ActivityRow {
    id: Uuid,
    user_id: Option<Uuid>,
    action: String,
    entity_type: Option<String>,
    entity_id: Option<Uuid>,
    description: String,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for ActivityLogEntry {
    fn from(row: ActivityRow) -> Self {
        Self {
            id: ActivityId::from_uuid(row.id),
            user_id: row.user_id.map(UserId::from_uuid),
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            description: row.description,
            ip_address: row.ip_address,
            created_at: row.created_at,
        }
    }
}

/// Convert every row, failing on the first corrupt one.
pub(super) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, PersistenceError>
where
    T: TryFrom<R, Error = PersistenceError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_counters_are_corrupt() {
        assert!(matches!(
            to_u32("quantity", -1),
            Err(PersistenceError::Corrupt(_))
        ));
        assert_eq!(to_u32("quantity", 4), Ok(4));
        assert!(money_from_cents(-5).is_err());
        assert_eq!(cents(Money::from_cents(2500)), Ok(2500));
    }

    #[test]
    fn legacy_overdue_rows_read_as_closed() {
        let row = BorrowingRow {
            id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            borrowed_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            due_date: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap_or_default(),
            return_date: NaiveDate::from_ymd_opt(2023, 1, 20),
            status: "overdue".to_string(),
            fine_amount_cents: 2500,
            issued_by: None,
            returned_to: None,
        };
        let record = BorrowingRecord::try_from(row);
        assert!(record.as_ref().is_ok_and(|r| !r.is_open()));
        assert_eq!(record.map(|r| r.fine_amount), Ok(Money::from_cents(2500)));
    }
}
