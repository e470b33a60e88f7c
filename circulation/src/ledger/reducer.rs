//! Circulation reducer.
//!
//! Decides issue, return, book edit, book removal and reservation commands
//! against a [`CirculationState`]. A valid command becomes a
//! [`CirculationEvent`] applied to the state plus one activity-log effect;
//! an invalid one leaves the state untouched apart from `last_error`.

use super::actions::{CirculationAction, CirculationEvent};
use super::state::CirculationState;
use crate::activity::{self, ActivityAction, ActivityLog, NewActivity};
use crate::context::RequestContext;
use crate::error::{LedgerError, Rejection};
use crate::fines;
use crate::settings::MAX_BORROWING_PERIOD_DAYS;
use crate::types::{
    Book, BookId, BorrowingId, BorrowingRecord, BorrowingStatus, Money, Reservation,
    ReservationId, ReservationStatus, Role, UserId, UserStatus,
};
use chrono::{Days, NaiveDate};
use libris_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use std::sync::Arc;

/// Environment dependencies for the circulation reducer
#[derive(Clone)]
pub struct CirculationEnvironment {
    /// Source of "today"
    pub clock: Arc<dyn Clock>,
    /// Audit trail written by effects
    pub activity: Arc<dyn ActivityLog>,
}

impl CirculationEnvironment {
    /// Creates a new `CirculationEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, activity: Arc<dyn ActivityLog>) -> Self {
        Self { clock, activity }
    }
}

/// Reducer for the borrowing and reservation ledgers
#[derive(Clone, Copy, Debug, Default)]
pub struct CirculationReducer;

impl CirculationReducer {
    /// Creates a new `CirculationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates an `IssueBook` command and builds the record to open
    fn validate_issue(
        state: &CirculationState,
        ctx: &RequestContext,
        borrowing_id: BorrowingId,
        book_id: BookId,
        user_id: UserId,
        period_days: Option<u32>,
        today: NaiveDate,
    ) -> Result<BorrowingRecord, LedgerError> {
        ctx.require(Role::Staff)?;

        let period = period_days.unwrap_or(state.settings.borrowing_period_days);
        if !(1..=MAX_BORROWING_PERIOD_DAYS).contains(&period) {
            return Err(LedgerError::Validation(format!(
                "Borrowing period must be between 1 and {MAX_BORROWING_PERIOD_DAYS} days"
            )));
        }

        let book = state
            .books
            .get(&book_id)
            .ok_or_else(|| LedgerError::not_found("book", book_id))?;
        let user = state
            .users
            .get(&user_id)
            .ok_or_else(|| LedgerError::not_found("user", user_id))?;

        if user.role != Role::Member {
            return Err(Rejection::NotAMember.into());
        }
        if user.status != UserStatus::Active {
            return Err(Rejection::BorrowerInactive.into());
        }
        if book.available_quantity == 0 {
            return Err(Rejection::BookUnavailable.into());
        }
        let limit = state.settings.max_books_per_user;
        if state.open_count_for_user(user_id) >= limit {
            return Err(Rejection::BorrowingLimitReached { limit }.into());
        }

        let due_date = today
            .checked_add_days(Days::new(u64::from(period)))
            .ok_or_else(|| LedgerError::Validation("Due date out of range".to_string()))?;

        Ok(BorrowingRecord {
            id: borrowing_id,
            book_id,
            user_id,
            borrowed_date: today,
            due_date,
            return_date: None,
            status: BorrowingStatus::Borrowed,
            fine_amount: Money::ZERO,
            issued_by: ctx.actor,
            returned_to: None,
        })
    }

    /// Validates a `ReturnBook` command and builds the closed record
    fn validate_return(
        state: &CirculationState,
        ctx: &RequestContext,
        borrowing_id: BorrowingId,
        return_date: NaiveDate,
    ) -> Result<BorrowingRecord, LedgerError> {
        ctx.require(Role::Staff)?;

        let record = state
            .records
            .get(&borrowing_id)
            .ok_or_else(|| LedgerError::not_found("borrowing", borrowing_id))?;

        if !record.is_open() {
            return Err(Rejection::AlreadyReturned.into());
        }
        if return_date < record.borrowed_date {
            return Err(LedgerError::Validation(format!(
                "Return date {return_date} is before borrowed date {}",
                record.borrowed_date
            )));
        }

        let fine = fines::compute_fine(record.due_date, return_date, state.settings.fine_per_day);

        Ok(BorrowingRecord {
            return_date: Some(return_date),
            status: BorrowingStatus::Returned,
            fine_amount: fine,
            returned_to: ctx.actor,
            ..record.clone()
        })
    }

    /// Validates an `UpdateBook` command and builds the edited book
    fn validate_update_book(
        state: &CirculationState,
        ctx: &RequestContext,
        book_id: BookId,
        draft: crate::catalog::BookDraft,
    ) -> Result<Book, LedgerError> {
        ctx.require(Role::Staff)?;
        let draft = draft.normalized();
        draft.validate()?;

        let existing = state
            .books
            .get(&book_id)
            .ok_or_else(|| LedgerError::not_found("book", book_id))?;

        if let Some(isbn) = draft.isbn.as_deref() {
            let taken = state
                .books
                .values()
                .any(|b| b.id != book_id && b.isbn.as_deref() == Some(isbn));
            if taken {
                return Err(Rejection::Duplicate {
                    entity: "Book",
                    field: "ISBN",
                }
                .into());
            }
        }

        let borrowed = state.open_count_for_book(book_id);
        let Some(available) = draft.quantity.checked_sub(borrowed) else {
            return Err(Rejection::QuantityBelowBorrowed {
                borrowed,
                requested: draft.quantity,
            }
            .into());
        };

        let mut book = existing.clone();
        draft.apply_to(&mut book);
        book.available_quantity = available;
        Ok(book)
    }

    /// Validates a `RemoveBook` command
    fn validate_remove_book(
        state: &CirculationState,
        ctx: &RequestContext,
        book_id: BookId,
    ) -> Result<(), LedgerError> {
        ctx.require(Role::Staff)?;
        if !state.books.contains_key(&book_id) {
            return Err(LedgerError::not_found("book", book_id));
        }
        if state.open_count_for_book(book_id) > 0 {
            return Err(Rejection::BookOnLoan.into());
        }
        if state.records.values().any(|r| r.book_id == book_id) {
            return Err(Rejection::BookHasHistory.into());
        }
        Ok(())
    }

    /// Validates a `PlaceReservation` command and builds the new hold
    fn validate_reservation(
        state: &CirculationState,
        ctx: &RequestContext,
        reservation_id: ReservationId,
        book_id: BookId,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<(Reservation, Option<ReservationId>), LedgerError> {
        ctx.require_self_or_staff(user_id)?;

        if !state.books.contains_key(&book_id) {
            return Err(LedgerError::not_found("book", book_id));
        }
        let user = state
            .users
            .get(&user_id)
            .ok_or_else(|| LedgerError::not_found("user", user_id))?;
        if user.status != UserStatus::Active {
            return Err(Rejection::BorrowerInactive.into());
        }

        let expired = match state.pending_reservation(user_id, book_id) {
            Some(existing) if existing.effective_status(today) == ReservationStatus::Pending => {
                return Err(Rejection::DuplicateReservation.into());
            },
            Some(stale) => Some(stale.id),
            None => None,
        };

        let expiry_date = today
            .checked_add_days(Days::new(u64::from(state.settings.reservation_expiry_days)))
            .ok_or_else(|| LedgerError::Validation("Expiry date out of range".to_string()))?;

        Ok((
            Reservation {
                id: reservation_id,
                book_id,
                user_id,
                reservation_date: today,
                expiry_date,
                status: ReservationStatus::Pending,
            },
            expired,
        ))
    }

    /// Validates a `CancelReservation` command
    fn validate_cancel(
        state: &CirculationState,
        ctx: &RequestContext,
        reservation_id: ReservationId,
        today: NaiveDate,
    ) -> Result<(), LedgerError> {
        let reservation = state
            .reservations
            .get(&reservation_id)
            .ok_or_else(|| LedgerError::not_found("reservation", reservation_id))?;
        ctx.require_self_or_staff(reservation.user_id)?;
        if reservation.effective_status(today) != ReservationStatus::Pending {
            return Err(Rejection::ReservationNotPending.into());
        }
        Ok(())
    }

    /// Applies an event to state
    fn apply_event(state: &mut CirculationState, event: &CirculationEvent) {
        match event {
            CirculationEvent::BookIssued { record } => {
                if let Some(book) = state.books.get_mut(&record.book_id) {
                    book.available_quantity = book.available_quantity.saturating_sub(1);
                }
                state.records.insert(record.id, record.clone());
            },
            CirculationEvent::BookReturned { record } => {
                if let Some(book) = state.books.get_mut(&record.book_id) {
                    book.available_quantity = (book.available_quantity + 1).min(book.quantity);
                }
                state.records.insert(record.id, record.clone());
            },
            CirculationEvent::BookUpdated { book } => {
                state.books.insert(book.id, book.clone());
            },
            CirculationEvent::BookRemoved { book_id } => {
                state.books.remove(book_id);
                state.reservations.retain(|_, r| r.book_id != *book_id);
            },
            CirculationEvent::ReservationPlaced {
                reservation,
                expired,
            } => {
                if let Some(stale) = expired.and_then(|id| state.reservations.get_mut(&id)) {
                    stale.status = ReservationStatus::Expired;
                }
                state.reservations.insert(reservation.id, reservation.clone());
            },
            CirculationEvent::ReservationCancelled { reservation_id } => {
                if let Some(reservation) = state.reservations.get_mut(reservation_id) {
                    reservation.status = ReservationStatus::Cancelled;
                }
            },
        }
        state.last_event = Some(event.clone());
        state.last_error = None;
    }

    fn reject(state: &mut CirculationState, error: LedgerError) {
        tracing::debug!(kind = error.kind(), %error, "Circulation command rejected");
        state.last_event = None;
        state.last_error = Some(error);
    }

    /// Audit entry describing `event`
    fn describe(state: &CirculationState, ctx: &RequestContext, event: &CirculationEvent) -> NewActivity {
        let title = |book_id: &BookId| {
            state
                .books
                .get(book_id)
                .map_or_else(|| book_id.to_string(), |b| b.title.clone())
        };
        let username = |user_id: &UserId| {
            state
                .users
                .get(user_id)
                .map_or_else(|| user_id.to_string(), |u| u.username.clone())
        };

        match event {
            CirculationEvent::BookIssued { record } => NewActivity::new(
                ctx,
                ActivityAction::IssueBook,
                format!(
                    "Issued book '{}' to {} (due {})",
                    title(&record.book_id),
                    username(&record.user_id),
                    record.due_date
                ),
            )
            .on("borrowing", *record.id.as_uuid()),
            CirculationEvent::BookReturned { record } => {
                let mut description = format!(
                    "Returned book '{}' from {}",
                    title(&record.book_id),
                    username(&record.user_id)
                );
                if !record.fine_amount.is_zero() {
                    description.push_str(&format!(" with fine {}", record.fine_amount));
                }
                NewActivity::new(ctx, ActivityAction::ReturnBook, description)
                    .on("borrowing", *record.id.as_uuid())
            },
            CirculationEvent::BookUpdated { book } => NewActivity::new(
                ctx,
                ActivityAction::UpdateBook,
                format!("Updated book '{}'", book.title),
            )
            .on("book", *book.id.as_uuid()),
            CirculationEvent::BookRemoved { book_id } => NewActivity::new(
                ctx,
                ActivityAction::DeleteBook,
                format!("Deleted book '{}'", title(book_id)),
            )
            .on("book", *book_id.as_uuid()),
            CirculationEvent::ReservationPlaced { reservation, .. } => NewActivity::new(
                ctx,
                ActivityAction::ReserveBook,
                format!(
                    "Reserved book '{}' for {} until {}",
                    title(&reservation.book_id),
                    username(&reservation.user_id),
                    reservation.expiry_date
                ),
            )
            .on("reservation", *reservation.id.as_uuid()),
            CirculationEvent::ReservationCancelled { reservation_id } => NewActivity::new(
                ctx,
                ActivityAction::CancelReservation,
                "Cancelled reservation",
            )
            .on("reservation", *reservation_id.as_uuid()),
        }
    }

    /// Applies a validated event and schedules its audit entry
    fn commit(
        state: &mut CirculationState,
        ctx: &RequestContext,
        event: CirculationEvent,
        env: &CirculationEnvironment,
    ) -> SmallVec<[Effect<CirculationAction>; 4]> {
        // Describe before applying so a removed book still has its title.
        let entry = Self::describe(state, ctx, &event);
        Self::apply_event(state, &event);
        smallvec![Effect::fire_and_forget(activity::record(
            Arc::clone(&env.activity),
            entry,
        ))]
    }
}

impl Reducer for CirculationReducer {
    type State = CirculationState;
    type Action = CirculationAction;
    type Environment = CirculationEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let today = env.clock.today();

        match action {
            // ========== Commands ==========
            CirculationAction::IssueBook {
                borrowing_id,
                book_id,
                user_id,
                period_days,
                ctx,
            } => match Self::validate_issue(
                state,
                &ctx,
                borrowing_id,
                book_id,
                user_id,
                period_days,
                today,
            ) {
                Ok(record) => Self::commit(state, &ctx, CirculationEvent::BookIssued { record }, env),
                Err(error) => {
                    Self::reject(state, error);
                    SmallVec::new()
                },
            },

            CirculationAction::ReturnBook {
                borrowing_id,
                return_date,
                ctx,
            } => {
                let return_date = return_date.unwrap_or(today);
                match Self::validate_return(state, &ctx, borrowing_id, return_date) {
                    Ok(record) => {
                        Self::commit(state, &ctx, CirculationEvent::BookReturned { record }, env)
                    },
                    Err(error) => {
                        Self::reject(state, error);
                        SmallVec::new()
                    },
                }
            },

            CirculationAction::UpdateBook {
                book_id,
                draft,
                ctx,
            } => match Self::validate_update_book(state, &ctx, book_id, draft) {
                Ok(book) => Self::commit(state, &ctx, CirculationEvent::BookUpdated { book }, env),
                Err(error) => {
                    Self::reject(state, error);
                    SmallVec::new()
                },
            },

            CirculationAction::RemoveBook { book_id, ctx } => {
                match Self::validate_remove_book(state, &ctx, book_id) {
                    Ok(()) => {
                        Self::commit(state, &ctx, CirculationEvent::BookRemoved { book_id }, env)
                    },
                    Err(error) => {
                        Self::reject(state, error);
                        SmallVec::new()
                    },
                }
            },

            CirculationAction::PlaceReservation {
                reservation_id,
                book_id,
                user_id,
                ctx,
            } => match Self::validate_reservation(
                state,
                &ctx,
                reservation_id,
                book_id,
                user_id,
                today,
            ) {
                Ok((reservation, expired)) => Self::commit(
                    state,
                    &ctx,
                    CirculationEvent::ReservationPlaced {
                        reservation,
                        expired,
                    },
                    env,
                ),
                Err(error) => {
                    Self::reject(state, error);
                    SmallVec::new()
                },
            },

            CirculationAction::CancelReservation {
                reservation_id,
                ctx,
            } => match Self::validate_cancel(state, &ctx, reservation_id, today) {
                Ok(()) => Self::commit(
                    state,
                    &ctx,
                    CirculationEvent::ReservationCancelled { reservation_id },
                    env,
                ),
                Err(error) => {
                    Self::reject(state, error);
                    SmallVec::new()
                },
            },

            // ========== Events ==========
            CirculationAction::Applied(event) => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}
