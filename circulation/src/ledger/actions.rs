//! Commands accepted by the circulation reducer and the events it records.

use crate::catalog::BookDraft;
use crate::context::RequestContext;
use crate::types::{
    Book, BookId, BorrowingId, BorrowingRecord, Reservation, ReservationId, UserId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Input to [`CirculationReducer`](super::CirculationReducer).
#[derive(Clone, Debug, PartialEq)]
pub enum CirculationAction {
    // Commands
    /// Lend one copy of a book to a member
    IssueBook {
        /// Identifier for the new record
        borrowing_id: BorrowingId,
        /// Book to lend
        book_id: BookId,
        /// Borrower
        user_id: UserId,
        /// Loan period override in days (1..=90)
        period_days: Option<u32>,
        /// Acting staff member
        ctx: RequestContext,
    },

    /// Take a copy back and assess the fine
    ReturnBook {
        /// Record to close
        borrowing_id: BorrowingId,
        /// Day of return; today when `None`
        return_date: Option<NaiveDate>,
        /// Acting staff member
        ctx: RequestContext,
    },

    /// Replace a book's fields, recomputing its availability counter
    UpdateBook {
        /// Book to edit
        book_id: BookId,
        /// New field values
        draft: BookDraft,
        /// Acting staff member
        ctx: RequestContext,
    },

    /// Delete a book with no copies on loan
    RemoveBook {
        /// Book to delete
        book_id: BookId,
        /// Acting staff member
        ctx: RequestContext,
    },

    /// Place a hold on a book
    PlaceReservation {
        /// Identifier for the new reservation
        reservation_id: ReservationId,
        /// Book to hold
        book_id: BookId,
        /// Member the hold is for
        user_id: UserId,
        /// Acting user
        ctx: RequestContext,
    },

    /// Withdraw a pending hold
    CancelReservation {
        /// Reservation to cancel
        reservation_id: ReservationId,
        /// Acting user
        ctx: RequestContext,
    },

    // Events
    /// A recorded event, applied without validation (replay)
    Applied(CirculationEvent),
}

/// What a successful command changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CirculationEvent {
    /// A record was opened and the book's counter decremented
    BookIssued {
        /// New record
        record: BorrowingRecord,
    },

    /// A record was closed and the book's counter incremented
    BookReturned {
        /// Closed record, including the fine
        record: BorrowingRecord,
    },

    /// A book's fields and counter were replaced
    BookUpdated {
        /// Book after the edit
        book: Book,
    },

    /// A book and its closed records were deleted
    BookRemoved {
        /// Deleted book
        book_id: BookId,
    },

    /// A hold was placed
    ReservationPlaced {
        /// New reservation
        reservation: Reservation,
        /// Stale pending hold for the same member and book, now expired
        expired: Option<ReservationId>,
    },

    /// A hold was cancelled
    ReservationCancelled {
        /// Cancelled reservation
        reservation_id: ReservationId,
    },
}
