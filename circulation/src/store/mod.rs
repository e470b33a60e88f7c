//! Storage backends.
//!
//! Every backend implements the same five traits: the transactional
//! [`CirculationStore`] that runs the reducer, plus plain reads and writes
//! for the catalog, the user directory, settings and ledger queries.
//! [`LibraryStore`] bundles them for the service layer.

pub mod memory;
pub mod postgres;

use crate::catalog::{AuthorListing, BookSearch, CategoryListing};
use crate::directory::UserFilter;
use crate::error::{LedgerError, PersistenceError};
use crate::fines::FineSummary;
use crate::ledger::{CirculationAction, CirculationEnvironment, CirculationEvent, CirculationState};
use crate::reports::{LedgerCounts, LoanView, PopularBook};
use crate::settings::{LibrarySettings, SettingKey, SettingValue};
use crate::types::{
    Author, AuthorId, Book, BookId, BorrowingId, BorrowingRecord, BorrowingStatus, Category,
    CategoryId, Reservation, ReservationId, User, UserId,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use libris_core::{SmallVec, effect::Effect};
use libris_runtime::HealthCheck;
use serde::Deserialize;

pub use memory::InMemoryLibrary;
pub use postgres::PostgresLibrary;

/// Effects a dispatch returns.
pub type CirculationEffects = SmallVec<[Effect<CirculationAction>; 4]>;

/// Outcome of one dispatched command.
///
/// `result` is the reducer's decision. `effects` must only be executed once
/// the decision is durable, which is the case when `dispatch` returns.
pub struct Dispatched {
    /// Event recorded or the reason the command was refused
    pub result: Result<CirculationEvent, LedgerError>,
    /// Follow-up work (activity log appends)
    pub effects: CirculationEffects,
}

impl Dispatched {
    /// Take the decision recorded in `state` by the last reduce.
    pub fn take(state: &mut CirculationState, effects: CirculationEffects) -> Self {
        let result = match (state.last_event.take(), state.last_error.take()) {
            (Some(event), _) => Ok(event),
            (None, Some(error)) => Err(error),
            (None, None) => Err(LedgerError::Validation(
                "command produced no decision".to_string(),
            )),
        };
        Self { result, effects }
    }
}

impl std::fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatched")
            .field("result", &self.result)
            .field("effects", &self.effects.len())
            .finish()
    }
}

/// Runs circulation commands atomically.
#[async_trait]
pub trait CirculationStore: Send + Sync {
    /// Load and lock what `action` depends on, reduce it and persist the
    /// resulting event in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if loading or writing fails; nothing is
    /// persisted in that case.
    async fn dispatch(
        &self,
        action: CirculationAction,
        env: &CirculationEnvironment,
    ) -> Result<Dispatched, PersistenceError>;

    /// Readiness of the backing store.
    async fn health(&self) -> HealthCheck;
}

/// Books, authors and categories.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a new book.
    async fn insert_book(&self, book: &Book) -> Result<(), PersistenceError>;
    /// One book.
    async fn book(&self, id: BookId) -> Result<Option<Book>, PersistenceError>;
    /// Books matching `search`, ordered by title.
    async fn books(&self, search: &BookSearch) -> Result<Vec<Book>, PersistenceError>;

    /// Insert a new author.
    async fn insert_author(&self, author: &Author) -> Result<(), PersistenceError>;
    /// Replace an author; `false` when it does not exist.
    async fn update_author(&self, author: &Author) -> Result<bool, PersistenceError>;
    /// Delete an author; `false` when it does not exist.
    ///
    /// Fails with [`PersistenceError::InUse`] while books reference it.
    async fn delete_author(&self, id: AuthorId) -> Result<bool, PersistenceError>;
    /// One author.
    async fn author(&self, id: AuthorId) -> Result<Option<Author>, PersistenceError>;
    /// All authors with their book counts, ordered by name.
    async fn authors(&self) -> Result<Vec<AuthorListing>, PersistenceError>;

    /// Insert a new category.
    async fn insert_category(&self, category: &Category) -> Result<(), PersistenceError>;
    /// Replace a category; `false` when it does not exist.
    async fn update_category(&self, category: &Category) -> Result<bool, PersistenceError>;
    /// Delete a category; `false` when it does not exist.
    ///
    /// Fails with [`PersistenceError::InUse`] while books reference it.
    async fn delete_category(&self, id: CategoryId) -> Result<bool, PersistenceError>;
    /// One category.
    async fn category(&self, id: CategoryId) -> Result<Option<Category>, PersistenceError>;
    /// All categories with their book counts, ordered by name.
    async fn categories(&self) -> Result<Vec<CategoryListing>, PersistenceError>;
}

/// Users of every role.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Insert a new user.
    ///
    /// Fails with [`PersistenceError::Duplicate`] for a taken username or email.
    async fn insert_user(&self, user: &User) -> Result<(), PersistenceError>;
    /// Replace a user; `false` when it does not exist.
    async fn update_user(&self, user: &User) -> Result<bool, PersistenceError>;
    /// One user.
    async fn user(&self, id: UserId) -> Result<Option<User>, PersistenceError>;
    /// Users matching `filter`, ordered by username.
    async fn users(&self, filter: &UserFilter) -> Result<Vec<User>, PersistenceError>;
    /// Number of users.
    async fn user_count(&self) -> Result<u64, PersistenceError>;
}

/// Key/value library policy.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Typed view with defaults for missing or invalid rows.
    async fn load(&self) -> Result<LibrarySettings, PersistenceError>;
    /// Raw stored value.
    async fn get(&self, key: SettingKey) -> Result<Option<String>, PersistenceError>;
    /// Store an already validated value.
    async fn set(&self, key: SettingKey, value: SettingValue) -> Result<(), PersistenceError>;
}

/// Filters for listing borrowing records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct BorrowingFilter {
    /// Display status; `overdue` selects open records past due
    pub status: Option<BorrowingStatus>,
    /// Borrower
    pub user_id: Option<UserId>,
    /// Book
    pub book_id: Option<BookId>,
    /// Borrowed on or after
    pub date_from: Option<NaiveDate>,
    /// Borrowed on or before
    pub date_to: Option<NaiveDate>,
}

impl BorrowingFilter {
    /// Records of one borrower.
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// In-memory match.
    #[must_use]
    pub fn matches(&self, record: &BorrowingRecord, today: NaiveDate) -> bool {
        self.status.is_none_or(|s| record.display_status(today) == s)
            && self.user_id.is_none_or(|u| record.user_id == u)
            && self.book_id.is_none_or(|b| record.book_id == b)
            && self.date_from.is_none_or(|from| record.borrowed_date >= from)
            && self.date_to.is_none_or(|to| record.borrowed_date <= to)
    }
}

/// Read-side queries over the borrowing and reservation ledgers.
#[async_trait]
pub trait LedgerQueries: Send + Sync {
    /// One record.
    async fn borrowing(&self, id: BorrowingId) -> Result<Option<BorrowingRecord>, PersistenceError>;
    /// Records matching `filter`, newest first.
    async fn borrowings(
        &self,
        filter: &BorrowingFilter,
        today: NaiveDate,
    ) -> Result<Vec<BorrowingRecord>, PersistenceError>;
    /// Open records referencing `book_id`.
    async fn open_count_for_book(&self, book_id: BookId) -> Result<u32, PersistenceError>;
    /// Sum of positive fines across the user's records.
    async fn fines_for_user(&self, user_id: UserId) -> Result<FineSummary, PersistenceError>;
    /// Open records past due, with names.
    async fn overdue(&self, today: NaiveDate) -> Result<Vec<LoanView>, PersistenceError>;
    /// Totals for the summary report.
    async fn counts(&self, today: NaiveDate) -> Result<LedgerCounts, PersistenceError>;
    /// Most borrowed titles.
    async fn most_borrowed(&self, limit: u32) -> Result<Vec<PopularBook>, PersistenceError>;
    /// One reservation.
    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, PersistenceError>;
    /// A member's reservations, newest first.
    async fn reservations_for_user(&self, user_id: UserId) -> Result<Vec<Reservation>, PersistenceError>;
}

/// Everything the service layer needs from a backend.
pub trait LibraryStore:
    CirculationStore + CatalogStore + UserDirectory + SettingsStore + LedgerQueries
{
}

impl<T> LibraryStore for T where
    T: CirculationStore + CatalogStore + UserDirectory + SettingsStore + LedgerQueries
{
}
