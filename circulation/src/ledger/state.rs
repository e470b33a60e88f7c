//! State the circulation reducer decides against.
//!
//! The in-memory backend keeps the whole library in one
//! [`CirculationState`]. The Postgres backend loads a snapshot holding the
//! locked rows one command needs and writes back the resulting event.

use super::actions::CirculationEvent;
use crate::error::LedgerError;
use crate::settings::LibrarySettings;
use crate::types::{
    Book, BookId, BorrowingId, BorrowingRecord, Reservation, ReservationId, ReservationStatus,
    User, UserId,
};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Books, users, loan records and holds visible to one decision.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CirculationState {
    /// Library policy in effect
    pub settings: LibrarySettings,
    /// Books by id
    pub books: HashMap<BookId, Book>,
    /// Users by id
    pub users: HashMap<UserId, User>,
    /// Loan records by id
    pub records: HashMap<BorrowingId, BorrowingRecord>,
    /// Reservations by id
    pub reservations: HashMap<ReservationId, Reservation>,
    /// Event produced by the last command
    pub last_event: Option<CirculationEvent>,
    /// Error produced by the last command
    pub last_error: Option<LedgerError>,
}

impl CirculationState {
    /// Empty state with the given policy.
    #[must_use]
    pub fn with_settings(settings: LibrarySettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Open records held by `user_id`.
    #[must_use]
    pub fn open_count_for_user(&self, user_id: UserId) -> u32 {
        count(
            self.records
                .values()
                .filter(|r| r.user_id == user_id && r.is_open()),
        )
    }

    /// Open records for `book_id`.
    #[must_use]
    pub fn open_count_for_book(&self, book_id: BookId) -> u32 {
        count(
            self.records
                .values()
                .filter(|r| r.book_id == book_id && r.is_open()),
        )
    }

    /// Pending hold by `user_id` on `book_id`, ignoring whether it expired.
    #[must_use]
    pub fn pending_reservation(&self, user_id: UserId, book_id: BookId) -> Option<&Reservation> {
        self.reservations.values().find(|r| {
            r.user_id == user_id && r.book_id == book_id && r.status == ReservationStatus::Pending
        })
    }

    /// Books whose counter disagrees with their open records.
    #[must_use]
    pub fn inconsistent_books(&self) -> Vec<BookId> {
        let mut ids: Vec<BookId> = self
            .books
            .values()
            .filter(|b| b.quantity.checked_sub(self.open_count_for_book(b.id)) != Some(b.available_quantity))
            .map(|b| b.id)
            .collect();
        ids.sort();
        ids
    }

    /// Open records past their due date, oldest due first.
    #[must_use]
    pub fn overdue(&self, today: NaiveDate) -> Vec<&BorrowingRecord> {
        let mut overdue: Vec<&BorrowingRecord> =
            self.records.values().filter(|r| r.is_overdue(today)).collect();
        overdue.sort_by_key(|r| (r.due_date, r.id));
        overdue
    }
}

fn count<'a>(records: impl Iterator<Item = &'a BorrowingRecord>) -> u32 {
    u32::try_from(records.count()).unwrap_or(u32::MAX)
}
