//! Transactional circulation commands.

use super::rows::{
    BOOK_COLUMNS, BORROWING_COLUMNS, BookRow, BorrowingRow, RESERVATION_COLUMNS, ReservationRow,
    USER_COLUMNS, UserRow, cents, convert_all, to_i32,
};
use super::settings::load_settings;
use super::{PostgresLibrary, db_error};
use crate::error::PersistenceError;
use crate::ledger::{
    CirculationAction, CirculationEnvironment, CirculationEvent, CirculationReducer,
    CirculationState,
};
use crate::store::{CirculationStore, Dispatched};
use crate::types::{
    Book, BookId, BorrowingId, BorrowingRecord, Reservation, ReservationId, ReservationStatus,
    User, UserId,
};
use async_trait::async_trait;
use libris_core::reducer::Reducer;
use libris_runtime::HealthCheck;
use sqlx::PgConnection;

// ============================================================================
// Row loading
// ============================================================================

async fn book(conn: &mut PgConnection, id: BookId, lock: bool) -> Result<Option<Book>, PersistenceError> {
    let sql = format!(
        "SELECT {BOOK_COLUMNS} FROM books b WHERE b.id = $1{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, BookRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| db_error("load book", &e))?
        .map(Book::try_from)
        .transpose()
}

async fn user(conn: &mut PgConnection, id: UserId, lock: bool) -> Result<Option<User>, PersistenceError> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| db_error("load user", &e))?
        .map(User::try_from)
        .transpose()
}

async fn lock_borrowing(
    conn: &mut PgConnection,
    id: BorrowingId,
) -> Result<Option<BorrowingRecord>, PersistenceError> {
    let sql = format!("SELECT {BORROWING_COLUMNS} FROM borrowings br WHERE br.id = $1 FOR UPDATE");
    sqlx::query_as::<_, BorrowingRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| db_error("lock borrowing", &e))?
        .map(BorrowingRecord::try_from)
        .transpose()
}

async fn open_records(
    conn: &mut PgConnection,
    column: &str,
    id: &uuid::Uuid,
) -> Result<Vec<BorrowingRecord>, PersistenceError> {
    let sql = format!(
        "SELECT {BORROWING_COLUMNS} FROM borrowings br \
         WHERE br.{column} = $1 AND br.status = 'borrowed'"
    );
    let rows = sqlx::query_as::<_, BorrowingRow>(&sql)
        .bind(id)
        .fetch_all(conn)
        .await
        .map_err(|e| db_error("load open borrowings", &e))?;
    convert_all(rows)
}

async fn latest_record(conn: &mut PgConnection, book_id: BookId) -> Result<Option<BorrowingRecord>, PersistenceError> {
    let sql = format!(
        "SELECT {BORROWING_COLUMNS} FROM borrowings br \
         WHERE br.book_id = $1 ORDER BY br.borrowed_date DESC LIMIT 1"
    );
    sqlx::query_as::<_, BorrowingRow>(&sql)
        .bind(book_id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| db_error("load latest borrowing", &e))?
        .map(BorrowingRecord::try_from)
        .transpose()
}

async fn lock_reservation(
    conn: &mut PgConnection,
    id: ReservationId,
) -> Result<Option<Reservation>, PersistenceError> {
    let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations r WHERE r.id = $1 FOR UPDATE");
    sqlx::query_as::<_, ReservationRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| db_error("lock reservation", &e))?
        .map(Reservation::try_from)
        .transpose()
}

async fn pending_reservations(
    conn: &mut PgConnection,
    user_id: UserId,
    book_id: BookId,
) -> Result<Vec<Reservation>, PersistenceError> {
    let sql = format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations r \
         WHERE r.user_id = $1 AND r.book_id = $2 AND r.status = 'pending'"
    );
    let rows = sqlx::query_as::<_, ReservationRow>(&sql)
        .bind(user_id.as_uuid())
        .bind(book_id.as_uuid())
        .fetch_all(conn)
        .await
        .map_err(|e| db_error("load pending reservations", &e))?;
    convert_all(rows)
}

async fn books_with_isbn(
    conn: &mut PgConnection,
    isbn: &str,
    except: BookId,
) -> Result<Vec<Book>, PersistenceError> {
    let sql = format!("SELECT {BOOK_COLUMNS} FROM books b WHERE b.isbn = $1 AND b.id <> $2");
    let rows = sqlx::query_as::<_, BookRow>(&sql)
        .bind(isbn)
        .bind(except.as_uuid())
        .fetch_all(conn)
        .await
        .map_err(|e| db_error("load books by isbn", &e))?;
    convert_all(rows)
}

/// State holding the rows `action` decides on, locked in lock order
/// (loan record or reservation, then book, then user).
async fn snapshot(
    conn: &mut PgConnection,
    action: &CirculationAction,
) -> Result<CirculationState, PersistenceError> {
    let mut state = CirculationState::with_settings(load_settings(&mut *conn).await?);

    match action {
        CirculationAction::IssueBook {
            book_id, user_id, ..
        } => {
            state.books.extend(book(&mut *conn, *book_id, true).await?.map(|b| (b.id, b)));
            state.users.extend(user(&mut *conn, *user_id, true).await?.map(|u| (u.id, u)));
            let open = open_records(&mut *conn, "user_id", user_id.as_uuid()).await?;
            state.records.extend(open.into_iter().map(|r| (r.id, r)));
        },
        CirculationAction::ReturnBook { borrowing_id, .. } => {
            if let Some(record) = lock_borrowing(&mut *conn, *borrowing_id).await? {
                state.books.extend(book(&mut *conn, record.book_id, true).await?.map(|b| (b.id, b)));
                state.users.extend(user(&mut *conn, record.user_id, false).await?.map(|u| (u.id, u)));
                state.records.insert(record.id, record);
            }
        },
        CirculationAction::UpdateBook { book_id, draft, .. } => {
            state.books.extend(book(&mut *conn, *book_id, true).await?.map(|b| (b.id, b)));
            let open = open_records(&mut *conn, "book_id", book_id.as_uuid()).await?;
            state.records.extend(open.into_iter().map(|r| (r.id, r)));
            if let Some(isbn) = draft.isbn.as_deref().map(str::trim).filter(|i| !i.is_empty()) {
                let others = books_with_isbn(&mut *conn, isbn, *book_id).await?;
                state.books.extend(others.into_iter().map(|b| (b.id, b)));
            }
        },
        CirculationAction::RemoveBook { book_id, .. } => {
            state.books.extend(book(&mut *conn, *book_id, true).await?.map(|b| (b.id, b)));
            let open = open_records(&mut *conn, "book_id", book_id.as_uuid()).await?;
            state.records.extend(open.into_iter().map(|r| (r.id, r)));
            let latest = latest_record(&mut *conn, *book_id).await?;
            state.records.extend(latest.map(|r| (r.id, r)));
        },
        CirculationAction::PlaceReservation {
            book_id, user_id, ..
        } => {
            state.books.extend(book(&mut *conn, *book_id, false).await?.map(|b| (b.id, b)));
            state.users.extend(user(&mut *conn, *user_id, true).await?.map(|u| (u.id, u)));
            let pending = pending_reservations(&mut *conn, *user_id, *book_id).await?;
            state.reservations.extend(pending.into_iter().map(|r| (r.id, r)));
        },
        CirculationAction::CancelReservation { reservation_id, .. } => {
            if let Some(reservation) = lock_reservation(&mut *conn, *reservation_id).await? {
                state.books.extend(book(&mut *conn, reservation.book_id, false).await?.map(|b| (b.id, b)));
                state.users.extend(user(&mut *conn, reservation.user_id, false).await?.map(|u| (u.id, u)));
                state.reservations.insert(reservation.id, reservation);
            }
        },
        CirculationAction::Applied(_) => {},
    }

    Ok(state)
}

// ============================================================================
// Event persistence
// ============================================================================

async fn persist(conn: &mut PgConnection, event: &CirculationEvent) -> Result<(), PersistenceError> {
    match event {
        CirculationEvent::BookIssued { record } => {
            sqlx::query(
                "INSERT INTO borrowings \
                     (id, book_id, user_id, borrowed_date, due_date, status, fine_amount_cents, issued_by) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(record.id.as_uuid())
            .bind(record.book_id.as_uuid())
            .bind(record.user_id.as_uuid())
            .bind(record.borrowed_date)
            .bind(record.due_date)
            .bind(record.status.as_str())
            .bind(cents(record.fine_amount)?)
            .bind(record.issued_by.map(|u| *u.as_uuid()))
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("insert borrowing", &e))?;

            sqlx::query(
                "UPDATE books SET available_quantity = available_quantity - 1, updated_at = now() \
                 WHERE id = $1",
            )
            .bind(record.book_id.as_uuid())
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("decrement availability", &e))?;
        },

        CirculationEvent::BookReturned { record } => {
            let updated = sqlx::query(
                "UPDATE borrowings \
                 SET return_date = $2, status = $3, fine_amount_cents = $4, returned_to = $5 \
                 WHERE id = $1 AND status = 'borrowed'",
            )
            .bind(record.id.as_uuid())
            .bind(record.return_date)
            .bind(record.status.as_str())
            .bind(cents(record.fine_amount)?)
            .bind(record.returned_to.map(|u| *u.as_uuid()))
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("close borrowing", &e))?;

            if updated.rows_affected() != 1 {
                return Err(PersistenceError::Database(format!(
                    "borrowing {} was not open",
                    record.id
                )));
            }

            sqlx::query(
                "UPDATE books \
                 SET available_quantity = LEAST(available_quantity + 1, quantity), updated_at = now() \
                 WHERE id = $1",
            )
            .bind(record.book_id.as_uuid())
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("increment availability", &e))?;
        },

        CirculationEvent::BookUpdated { book } => {
            sqlx::query(
                "UPDATE books SET title = $2, isbn = $3, author_id = $4, category_id = $5, \
                     publisher = $6, publish_year = $7, pages = $8, location = $9, \
                     description = $10, cover_image = $11, quantity = $12, \
                     available_quantity = $13, updated_at = now() \
                 WHERE id = $1",
            )
            .bind(book.id.as_uuid())
            .bind(&book.title)
            .bind(&book.isbn)
            .bind(book.author_id.map(|a| *a.as_uuid()))
            .bind(book.category_id.map(|c| *c.as_uuid()))
            .bind(&book.publisher)
            .bind(book.publish_year)
            .bind(book.pages)
            .bind(&book.location)
            .bind(&book.description)
            .bind(&book.cover_image)
            .bind(to_i32("quantity", book.quantity)?)
            .bind(to_i32("available_quantity", book.available_quantity)?)
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("update book", &e))?;
        },

        CirculationEvent::BookRemoved { book_id } => {
            sqlx::query("DELETE FROM books WHERE id = $1")
                .bind(book_id.as_uuid())
                .execute(&mut *conn)
                .await
                .map_err(|e| super::delete_error("delete book", &e))?;
        },

        CirculationEvent::ReservationPlaced {
            reservation,
            expired,
        } => {
            if let Some(stale) = expired {
                sqlx::query("UPDATE reservations SET status = $2 WHERE id = $1")
                    .bind(stale.as_uuid())
                    .bind(ReservationStatus::Expired.as_str())
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| db_error("expire reservation", &e))?;
            }
            sqlx::query(
                "INSERT INTO reservations (id, book_id, user_id, reservation_date, expiry_date, status) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(reservation.id.as_uuid())
            .bind(reservation.book_id.as_uuid())
            .bind(reservation.user_id.as_uuid())
            .bind(reservation.reservation_date)
            .bind(reservation.expiry_date)
            .bind(reservation.status.as_str())
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("insert reservation", &e))?;
        },

        CirculationEvent::ReservationCancelled { reservation_id } => {
            sqlx::query("UPDATE reservations SET status = $2 WHERE id = $1")
                .bind(reservation_id.as_uuid())
                .bind(ReservationStatus::Cancelled.as_str())
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("cancel reservation", &e))?;
        },
    }
    Ok(())
}

#[async_trait]
impl CirculationStore for PostgresLibrary {
    #[tracing::instrument(skip_all, name = "postgres.dispatch")]
    async fn dispatch(
        &self,
        action: CirculationAction,
        env: &CirculationEnvironment,
    ) -> Result<Dispatched, PersistenceError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", &e))?;

        let mut state = snapshot(&mut *tx, &action).await?;
        let effects = CirculationReducer::new().reduce(&mut state, action, env);
        let dispatched = Dispatched::take(&mut state, effects);

        match &dispatched.result {
            Ok(event) => {
                persist(&mut *tx, event).await?;
                tx.commit()
                    .await
                    .map_err(|e| db_error("commit transaction", &e))?;
            },
            Err(_) => {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(error = %e, "Rollback after rejected command failed");
                }
            },
        }

        Ok(dispatched)
    }

    async fn health(&self) -> HealthCheck {
        libris_postgres::ping(&self.pool).await
    }
}
