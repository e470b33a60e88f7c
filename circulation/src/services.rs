//! The library service: every operation the HTTP layer exposes.
//!
//! Circulation commands go through the store's transactional dispatch and
//! the effects they return are handed to the [`EffectRunner`] only after the
//! store has committed. Catalog, directory and settings writes are plain
//! store calls followed by an activity append scheduled the same way.

use crate::activity::{self, ActivityAction, ActivityFilter, ActivityLog, InMemoryActivityLog, NewActivity};
use crate::catalog::{AuthorDraft, AuthorListing, BookDraft, BookSearch, CategoryDraft, CategoryListing};
use crate::context::RequestContext;
use crate::directory::{UserDraft, UserFilter, ensure_can_edit};
use crate::error::{LedgerError, LedgerResult, PersistenceError};
use crate::fines::{FineSummary, overdue_days};
use crate::ledger::{CirculationAction, CirculationEnvironment, CirculationEvent};
use crate::metrics::{
    BORROWINGS_ISSUED, BORROWINGS_RETURNED, FINES_ASSESSED_CENTS, LEDGER_REJECTIONS,
    PENDING_EFFECTS,
};
use crate::reports::{self, LibrarySummary, OverdueLoan, TOP_BOOKS};
use crate::settings::{self, LibrarySettings, SettingKey};
use crate::store::{BorrowingFilter, CirculationEffects, InMemoryLibrary, LibraryStore};
use crate::types::{
    ActivityLogEntry, Author, AuthorId, Book, BookId, BorrowingId, BorrowingRecord, Category,
    CategoryId, Reservation, ReservationId, Role, User, UserId, UserStatus,
};
use chrono::NaiveDate;
use libris_core::effect::Effect;
use libris_core::environment::Clock;
use libris_core::smallvec;
use libris_runtime::{EffectRunner, HealthReport, RuntimeError};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a return.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReturnReceipt {
    /// The closed record; `fine_amount` is the fine charged
    #[serde(flatten)]
    pub record: BorrowingRecord,
    /// Whole days past the due date
    pub days_overdue: u64,
}

/// Stored availability counter against the one derived from open loans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Book checked
    pub book_id: BookId,
    /// Copies owned
    pub quantity: u32,
    /// Stored counter
    pub available_quantity: u32,
    /// Open borrowing records for the book
    pub open_borrowings: u32,
    /// `quantity - open_borrowings`
    pub expected_available: u32,
    /// Whether the stored counter matches
    pub consistent: bool,
}

/// Service façade over a storage backend.
#[derive(Clone)]
pub struct Library {
    store: Arc<dyn LibraryStore>,
    env: CirculationEnvironment,
    runner: EffectRunner<CirculationAction>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl Library {
    /// Create a service over `store`, appending audit entries to `activity`.
    #[must_use]
    pub fn new(
        store: Arc<dyn LibraryStore>,
        activity: Arc<dyn ActivityLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            env: CirculationEnvironment::new(clock, activity),
            runner: EffectRunner::new(),
        }
    }

    /// Service over a fresh in-memory store and activity log.
    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(InMemoryLibrary::new()),
            Arc::new(InMemoryActivityLog::new()),
            clock,
        )
    }

    /// Current calendar date according to the service clock.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.env.clock.today()
    }

    /// Wait for scheduled effects (activity appends) to finish.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Timeout`] if effects are still running after `timeout`.
    pub async fn settle(&self, timeout: Duration) -> Result<(), RuntimeError> {
        self.runner.settle(timeout).await
    }

    /// Stop accepting effects and drain the ones in flight.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ShutdownTimeout`] if the drain does not finish in time.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RuntimeError> {
        self.runner.shutdown(timeout).await
    }

    /// Readiness of the store and the effect runner.
    pub async fn health(&self) -> HealthReport {
        HealthReport::new(vec![self.store.health().await, self.runner.health()])
    }

    /// Build the request context for `actor`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown actor and
    /// [`LedgerError::Forbidden`] for an account that is not active.
    pub async fn authenticate(&self, actor: UserId, source: Option<IpAddr>) -> LedgerResult<RequestContext> {
        let user = self
            .store
            .user(actor)
            .await?
            .ok_or_else(|| LedgerError::not_found("user", actor))?;
        if user.status != UserStatus::Active {
            return Err(LedgerError::Forbidden(format!(
                "account is {}",
                user.status.as_str()
            )));
        }
        Ok(RequestContext::new(user.id, user.role, source))
    }

    /// Create the first super admin when the directory is empty.
    ///
    /// Returns `None` when users already exist.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed draft or a persistence error.
    pub async fn bootstrap_admin(&self, mut draft: UserDraft) -> LedgerResult<Option<User>> {
        if self.store.user_count().await? > 0 {
            return Ok(None);
        }
        let ctx = RequestContext::system();
        draft.role = Role::SuperAdmin;
        draft.status = UserStatus::Active;
        draft.validate(&ctx)?;
        let user = draft.into_user(UserId::new(), self.env.clock.now());
        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, username = %user.username, "Bootstrapped super admin");
        self.log(
            NewActivity::new(&ctx, ActivityAction::AddUser, format!("Created initial super admin {}", user.username))
                .on("user", *user.id.as_uuid()),
        );
        Ok(Some(user))
    }

    // ------------------------------------------------------------------
    // Borrowing ledger
    // ------------------------------------------------------------------

    /// Lend one copy of `book_id` to `user_id`.
    ///
    /// # Errors
    ///
    /// Rejections for an unavailable book, a borrower at the limit or an
    /// inactive borrower; validation, not found and authorization errors.
    #[tracing::instrument(skip(self, ctx), fields(actor = ?ctx.actor))]
    pub async fn issue_book(
        &self,
        ctx: &RequestContext,
        book_id: BookId,
        user_id: UserId,
        period_days: Option<u32>,
    ) -> LedgerResult<BorrowingRecord> {
        let event = self
            .dispatch(CirculationAction::IssueBook {
                borrowing_id: BorrowingId::new(),
                book_id,
                user_id,
                period_days,
                ctx: ctx.clone(),
            })
            .await?;
        match event {
            CirculationEvent::BookIssued { record } => {
                metrics::counter!(BORROWINGS_ISSUED).increment(1);
                tracing::info!(borrowing_id = %record.id, due = %record.due_date, "Book issued");
                Ok(record)
            },
            other => Err(unexpected(&other)),
        }
    }

    /// Close `borrowing_id` on `return_date` (today when `None`).
    ///
    /// # Errors
    ///
    /// [`Rejection::AlreadyReturned`](crate::error::Rejection::AlreadyReturned)
    /// for a closed record; validation, not found and authorization errors.
    #[tracing::instrument(skip(self, ctx), fields(actor = ?ctx.actor))]
    pub async fn return_book(
        &self,
        ctx: &RequestContext,
        borrowing_id: BorrowingId,
        return_date: Option<NaiveDate>,
    ) -> LedgerResult<ReturnReceipt> {
        let event = self
            .dispatch(CirculationAction::ReturnBook {
                borrowing_id,
                return_date,
                ctx: ctx.clone(),
            })
            .await?;
        match event {
            CirculationEvent::BookReturned { record } => {
                metrics::counter!(BORROWINGS_RETURNED).increment(1);
                metrics::counter!(FINES_ASSESSED_CENTS).increment(record.fine_amount.cents());
                let days_overdue = record
                    .return_date
                    .map_or(0, |returned| overdue_days(record.due_date, returned));
                tracing::info!(%borrowing_id, fine = %record.fine_amount, days_overdue, "Book returned");
                Ok(ReturnReceipt {
                    record,
                    days_overdue,
                })
            },
            other => Err(unexpected(&other)),
        }
    }

    /// One record, visible to staff and to its borrower.
    ///
    /// # Errors
    ///
    /// Not found, or forbidden for another member's record.
    pub async fn borrowing(&self, ctx: &RequestContext, id: BorrowingId) -> LedgerResult<BorrowingRecord> {
        let record = self
            .store
            .borrowing(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("borrowing", id))?;
        ctx.require_self_or_staff(record.user_id)?;
        Ok(self.as_displayed(record))
    }

    /// Records matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Forbidden below staff.
    pub async fn borrowings(&self, ctx: &RequestContext, filter: &BorrowingFilter) -> LedgerResult<Vec<BorrowingRecord>> {
        ctx.require(Role::Staff)?;
        let records = self.store.borrowings(filter, self.today()).await?;
        Ok(records.into_iter().map(|r| self.as_displayed(r)).collect())
    }

    /// A member's records, newest first.
    ///
    /// # Errors
    ///
    /// Forbidden for another member's records; not found for an unknown user.
    pub async fn user_borrowings(&self, ctx: &RequestContext, user_id: UserId) -> LedgerResult<Vec<BorrowingRecord>> {
        ctx.require_self_or_staff(user_id)?;
        self.existing_user(user_id).await?;
        self.borrowings_unchecked(&BorrowingFilter::for_user(user_id)).await
    }

    /// Sum of fines charged to `user_id`.
    ///
    /// # Errors
    ///
    /// Forbidden for another member; not found for an unknown user.
    pub async fn user_fines(&self, ctx: &RequestContext, user_id: UserId) -> LedgerResult<FineSummary> {
        ctx.require_self_or_staff(user_id)?;
        self.existing_user(user_id).await?;
        Ok(self.store.fines_for_user(user_id).await?)
    }

    async fn borrowings_unchecked(&self, filter: &BorrowingFilter) -> LedgerResult<Vec<BorrowingRecord>> {
        let records = self.store.borrowings(filter, self.today()).await?;
        Ok(records.into_iter().map(|r| self.as_displayed(r)).collect())
    }

    /// Records are shown with their display status: open loans past due
    /// read as overdue.
    fn as_displayed(&self, mut record: BorrowingRecord) -> BorrowingRecord {
        record.status = record.display_status(self.today());
        record
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Add a book; all copies start on the shelf.
    ///
    /// # Errors
    ///
    /// Validation errors, a duplicate ISBN, or forbidden below staff.
    pub async fn add_book(&self, ctx: &RequestContext, draft: BookDraft) -> LedgerResult<Book> {
        ctx.require(Role::Staff)?;
        let draft = draft.normalized();
        draft.validate()?;
        let book = draft.into_book(BookId::new());
        self.store
            .insert_book(&book)
            .await
            .map_err(|e| refused(e.into()))?;
        self.log(
            NewActivity::new(ctx, ActivityAction::AddBook, format!("Added book '{}'", book.title))
                .on("book", *book.id.as_uuid()),
        );
        Ok(book)
    }

    /// Replace a book's fields, recomputing its availability counter.
    ///
    /// # Errors
    ///
    /// [`Rejection::QuantityBelowBorrowed`](crate::error::Rejection::QuantityBelowBorrowed)
    /// when fewer copies would remain than are on loan.
    pub async fn update_book(&self, ctx: &RequestContext, book_id: BookId, draft: BookDraft) -> LedgerResult<Book> {
        match self
            .dispatch(CirculationAction::UpdateBook {
                book_id,
                draft,
                ctx: ctx.clone(),
            })
            .await?
        {
            CirculationEvent::BookUpdated { book } => Ok(book),
            other => Err(unexpected(&other)),
        }
    }

    /// Delete a book with no copies on loan.
    ///
    /// # Errors
    ///
    /// [`Rejection::BookOnLoan`](crate::error::Rejection::BookOnLoan) while copies are out.
    pub async fn remove_book(&self, ctx: &RequestContext, book_id: BookId) -> LedgerResult<()> {
        match self
            .dispatch(CirculationAction::RemoveBook {
                book_id,
                ctx: ctx.clone(),
            })
            .await?
        {
            CirculationEvent::BookRemoved { .. } => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// One book.
    ///
    /// # Errors
    ///
    /// Not found.
    pub async fn book(&self, book_id: BookId) -> LedgerResult<Book> {
        self.store
            .book(book_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("book", book_id))
    }

    /// Books matching `search`, ordered by title.
    ///
    /// # Errors
    ///
    /// Persistence errors only.
    pub async fn books(&self, search: &BookSearch) -> LedgerResult<Vec<Book>> {
        Ok(self.store.books(search).await?)
    }

    /// Compare a book's stored counter with its open loans.
    ///
    /// # Errors
    ///
    /// Not found, or forbidden below staff.
    pub async fn book_consistency(&self, ctx: &RequestContext, book_id: BookId) -> LedgerResult<ConsistencyReport> {
        ctx.require(Role::Staff)?;
        let book = self.book(book_id).await?;
        let open_borrowings = self.store.open_count_for_book(book_id).await?;
        let expected_available = book.quantity.saturating_sub(open_borrowings);
        let consistent =
            open_borrowings <= book.quantity && book.available_quantity == expected_available;
        if !consistent {
            tracing::warn!(
                %book_id,
                stored = book.available_quantity,
                expected = expected_available,
                "Availability counter out of step with open loans"
            );
        }
        Ok(ConsistencyReport {
            book_id,
            quantity: book.quantity,
            available_quantity: book.available_quantity,
            open_borrowings,
            expected_available,
            consistent,
        })
    }

    /// Authors with their book counts.
    ///
    /// # Errors
    ///
    /// Forbidden below staff.
    pub async fn authors(&self, ctx: &RequestContext) -> LedgerResult<Vec<AuthorListing>> {
        ctx.require(Role::Staff)?;
        Ok(self.store.authors().await?)
    }

    /// Add an author.
    ///
    /// # Errors
    ///
    /// Validation errors, or forbidden below staff.
    pub async fn add_author(&self, ctx: &RequestContext, draft: AuthorDraft) -> LedgerResult<Author> {
        ctx.require(Role::Staff)?;
        let author = draft.into_author(AuthorId::new())?;
        self.store
            .insert_author(&author)
            .await
            .map_err(|e| refused(e.into()))?;
        self.log(
            NewActivity::new(ctx, ActivityAction::AddAuthor, format!("Added author '{}'", author.name))
                .on("author", *author.id.as_uuid()),
        );
        Ok(author)
    }

    /// Replace an author.
    ///
    /// # Errors
    ///
    /// Validation errors, not found, or forbidden below staff.
    pub async fn update_author(&self, ctx: &RequestContext, id: AuthorId, draft: AuthorDraft) -> LedgerResult<Author> {
        ctx.require(Role::Staff)?;
        let author = draft.into_author(id)?;
        if !self.store.update_author(&author).await.map_err(|e| refused(e.into()))? {
            return Err(LedgerError::not_found("author", id));
        }
        self.log(
            NewActivity::new(ctx, ActivityAction::UpdateAuthor, format!("Updated author '{}'", author.name))
                .on("author", *id.as_uuid()),
        );
        Ok(author)
    }

    /// Delete an author no book references.
    ///
    /// # Errors
    ///
    /// [`Rejection::AuthorHasBooks`](crate::error::Rejection::AuthorHasBooks)
    /// while books reference it; not found; forbidden below staff.
    pub async fn remove_author(&self, ctx: &RequestContext, id: AuthorId) -> LedgerResult<()> {
        ctx.require(Role::Staff)?;
        let author = self
            .store
            .author(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("author", id))?;
        if !self.store.delete_author(id).await.map_err(|e| refused(e.into()))? {
            return Err(LedgerError::not_found("author", id));
        }
        self.log(
            NewActivity::new(ctx, ActivityAction::DeleteAuthor, format!("Deleted author '{}'", author.name))
                .on("author", *id.as_uuid()),
        );
        Ok(())
    }

    /// Categories with their book counts.
    ///
    /// # Errors
    ///
    /// Forbidden below staff.
    pub async fn categories(&self, ctx: &RequestContext) -> LedgerResult<Vec<CategoryListing>> {
        ctx.require(Role::Staff)?;
        Ok(self.store.categories().await?)
    }

    /// Add a category.
    ///
    /// # Errors
    ///
    /// Validation errors, a duplicate name, or forbidden below staff.
    pub async fn add_category(&self, ctx: &RequestContext, draft: CategoryDraft) -> LedgerResult<Category> {
        ctx.require(Role::Staff)?;
        let category = draft.into_category(CategoryId::new())?;
        self.store
            .insert_category(&category)
            .await
            .map_err(|e| refused(e.into()))?;
        self.log(
            NewActivity::new(ctx, ActivityAction::AddCategory, format!("Added category '{}'", category.name))
                .on("category", *category.id.as_uuid()),
        );
        Ok(category)
    }

    /// Replace a category.
    ///
    /// # Errors
    ///
    /// Validation errors, a duplicate name, not found, or forbidden below staff.
    pub async fn update_category(
        &self,
        ctx: &RequestContext,
        id: CategoryId,
        draft: CategoryDraft,
    ) -> LedgerResult<Category> {
        ctx.require(Role::Staff)?;
        let category = draft.into_category(id)?;
        if !self
            .store
            .update_category(&category)
            .await
            .map_err(|e| refused(e.into()))?
        {
            return Err(LedgerError::not_found("category", id));
        }
        self.log(
            NewActivity::new(ctx, ActivityAction::UpdateCategory, format!("Updated category '{}'", category.name))
                .on("category", *id.as_uuid()),
        );
        Ok(category)
    }

    /// Delete a category no book references.
    ///
    /// # Errors
    ///
    /// [`Rejection::CategoryHasBooks`](crate::error::Rejection::CategoryHasBooks)
    /// while books reference it; not found; forbidden below staff.
    pub async fn remove_category(&self, ctx: &RequestContext, id: CategoryId) -> LedgerResult<()> {
        ctx.require(Role::Staff)?;
        let category = self
            .store
            .category(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("category", id))?;
        if !self.store.delete_category(id).await.map_err(|e| refused(e.into()))? {
            return Err(LedgerError::not_found("category", id));
        }
        self.log(
            NewActivity::new(ctx, ActivityAction::DeleteCategory, format!("Deleted category '{}'", category.name))
                .on("category", *id.as_uuid()),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // User directory
    // ------------------------------------------------------------------

    /// Users matching `filter`.
    ///
    /// # Errors
    ///
    /// Forbidden below admin.
    pub async fn users(&self, ctx: &RequestContext, filter: &UserFilter) -> LedgerResult<Vec<User>> {
        ctx.require(Role::Admin)?;
        Ok(self.store.users(filter).await?)
    }

    /// One user.
    ///
    /// # Errors
    ///
    /// Not found, or forbidden below admin.
    pub async fn user(&self, ctx: &RequestContext, id: UserId) -> LedgerResult<User> {
        ctx.require(Role::Admin)?;
        self.existing_user(id).await
    }

    /// Register a user.
    ///
    /// # Errors
    ///
    /// Validation errors, a taken username or email, or
    /// [`Rejection::SuperAdminProtected`](crate::error::Rejection::SuperAdminProtected).
    pub async fn add_user(&self, ctx: &RequestContext, draft: UserDraft) -> LedgerResult<User> {
        ctx.require(Role::Admin)?;
        draft.validate(ctx)?;
        let user = draft.into_user(UserId::new(), self.env.clock.now());
        self.store
            .insert_user(&user)
            .await
            .map_err(|e| refused(e.into()))?;
        self.log(
            NewActivity::new(
                ctx,
                ActivityAction::AddUser,
                format!("Added user {} ({})", user.username, user.role),
            )
            .on("user", *user.id.as_uuid()),
        );
        Ok(user)
    }

    /// Replace a user's fields; `created_at` is kept.
    ///
    /// # Errors
    ///
    /// As for [`add_user`](Self::add_user), plus not found.
    pub async fn update_user(&self, ctx: &RequestContext, id: UserId, draft: UserDraft) -> LedgerResult<User> {
        ctx.require(Role::Admin)?;
        let existing = self.existing_user(id).await?;
        ensure_can_edit(ctx, &existing)?;
        draft.validate(ctx)?;
        let user = draft.into_user(id, existing.created_at);
        if !self.store.update_user(&user).await.map_err(|e| refused(e.into()))? {
            return Err(LedgerError::not_found("user", id));
        }
        self.log(
            NewActivity::new(ctx, ActivityAction::UpdateUser, format!("Updated user {}", user.username))
                .on("user", *id.as_uuid()),
        );
        Ok(user)
    }

    async fn existing_user(&self, id: UserId) -> LedgerResult<User> {
        self.store
            .user(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("user", id))
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Current library policy.
    ///
    /// # Errors
    ///
    /// Persistence errors only.
    pub async fn settings(&self) -> LedgerResult<LibrarySettings> {
        Ok(self.store.load().await?)
    }

    /// Validate and store one setting, returning the new policy.
    ///
    /// # Errors
    ///
    /// Validation errors for an unknown key or a bad value; forbidden below
    /// super admin.
    pub async fn update_setting(&self, ctx: &RequestContext, key: &str, raw: &str) -> LedgerResult<LibrarySettings> {
        ctx.require(Role::SuperAdmin)?;
        let key: SettingKey = key.parse()?;
        let value = settings::validate(key, raw.trim())?;
        self.store.set(key, value).await?;
        tracing::info!(%key, %value, "Setting updated");
        self.log(NewActivity::new(
            ctx,
            ActivityAction::UpdateSettings,
            format!("Updated setting {key} to {value}"),
        ));
        Ok(self.store.load().await?)
    }

    // ------------------------------------------------------------------
    // Reservations
    // ------------------------------------------------------------------

    /// Place a hold on `book_id` for `user_id`.
    ///
    /// # Errors
    ///
    /// [`Rejection::DuplicateReservation`](crate::error::Rejection::DuplicateReservation)
    /// for a second live hold; forbidden when a member reserves for someone else.
    pub async fn place_reservation(
        &self,
        ctx: &RequestContext,
        book_id: BookId,
        user_id: UserId,
    ) -> LedgerResult<Reservation> {
        match self
            .dispatch(CirculationAction::PlaceReservation {
                reservation_id: ReservationId::new(),
                book_id,
                user_id,
                ctx: ctx.clone(),
            })
            .await?
        {
            CirculationEvent::ReservationPlaced { reservation, .. } => Ok(reservation),
            other => Err(unexpected(&other)),
        }
    }

    /// Cancel a pending hold.
    ///
    /// # Errors
    ///
    /// [`Rejection::ReservationNotPending`](crate::error::Rejection::ReservationNotPending)
    /// once the hold is no longer pending; forbidden for another member's hold.
    pub async fn cancel_reservation(&self, ctx: &RequestContext, id: ReservationId) -> LedgerResult<Reservation> {
        match self
            .dispatch(CirculationAction::CancelReservation {
                reservation_id: id,
                ctx: ctx.clone(),
            })
            .await?
        {
            CirculationEvent::ReservationCancelled { .. } => self
                .store
                .reservation(id)
                .await?
                .ok_or_else(|| LedgerError::not_found("reservation", id)),
            other => Err(unexpected(&other)),
        }
    }

    /// A member's holds, with stale pending holds shown as expired.
    ///
    /// # Errors
    ///
    /// Forbidden for another member's holds; not found for an unknown user.
    pub async fn user_reservations(&self, ctx: &RequestContext, user_id: UserId) -> LedgerResult<Vec<Reservation>> {
        ctx.require_self_or_staff(user_id)?;
        self.existing_user(user_id).await?;
        let today = self.today();
        Ok(self
            .store
            .reservations_for_user(user_id)
            .await?
            .into_iter()
            .map(|mut r| {
                r.status = r.effective_status(today);
                r
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Activity log and reports
    // ------------------------------------------------------------------

    /// Audit entries matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Forbidden below super admin.
    pub async fn activity(&self, ctx: &RequestContext, filter: &ActivityFilter) -> LedgerResult<Vec<ActivityLogEntry>> {
        ctx.require(Role::SuperAdmin)?;
        Ok(self.env.activity.list(filter).await?)
    }

    /// Ledger totals and the most borrowed titles.
    ///
    /// # Errors
    ///
    /// Forbidden below admin.
    pub async fn summary(&self, ctx: &RequestContext) -> LedgerResult<LibrarySummary> {
        ctx.require(Role::Admin)?;
        let today = self.today();
        let counts = self.store.counts(today).await?;
        let most_borrowed = self.store.most_borrowed(TOP_BOOKS).await?;
        Ok(LibrarySummary::new(today, counts, most_borrowed))
    }

    /// Open loans past due with the fine accrued so far.
    ///
    /// # Errors
    ///
    /// Forbidden below admin.
    pub async fn overdue_report(&self, ctx: &RequestContext) -> LedgerResult<Vec<OverdueLoan>> {
        ctx.require(Role::Admin)?;
        let today = self.today();
        let fine_per_day = self.store.load().await?.fine_per_day;
        let loans = self.store.overdue(today).await?;
        Ok(reports::overdue_report(loans, today, fine_per_day))
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn dispatch(&self, action: CirculationAction) -> LedgerResult<CirculationEvent> {
        let dispatched = self
            .store
            .dispatch(action, &self.env)
            .await
            .map_err(|e| refused(e.into()))?;
        match dispatched.result {
            Ok(event) => {
                self.schedule(dispatched.effects);
                Ok(event)
            },
            Err(error) => Err(refused(error)),
        }
    }

    fn log(&self, entry: NewActivity) {
        self.schedule(smallvec![Effect::fire_and_forget(activity::record(
            Arc::clone(&self.env.activity),
            entry,
        ))]);
    }

    fn schedule(&self, effects: CirculationEffects) {
        if effects.iter().all(Effect::is_noop) {
            return;
        }
        if let Err(error) = self.runner.run(effects) {
            tracing::warn!(%error, "Dropping effects scheduled during shutdown");
        }
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(PENDING_EFFECTS).set(self.runner.pending() as f64);
    }
}

/// Count a refused operation and pass the error through.
fn refused(error: LedgerError) -> LedgerError {
    metrics::counter!(LEDGER_REJECTIONS, "kind" => error.kind()).increment(1);
    if let LedgerError::Persistence(cause) = &error {
        tracing::error!(error = %cause, "Storage failure");
    }
    error
}

fn unexpected(event: &CirculationEvent) -> LedgerError {
    LedgerError::Persistence(PersistenceError::Corrupt(format!(
        "unexpected event {event:?}"
    )))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Rejection;
    use crate::types::{Money, ReservationStatus};
    use libris_testing::{FixedClock, clock_on, date};

    const SETTLE: Duration = Duration::from_secs(2);

    struct Fixture {
        library: Library,
        clock: FixedClock,
        admin: RequestContext,
        staff: RequestContext,
    }

    async fn fixture() -> Fixture {
        fixture_logging_to(Arc::new(InMemoryActivityLog::new())).await
    }

    async fn fixture_logging_to(activity: Arc<dyn ActivityLog>) -> Fixture {
        let clock = clock_on(2024, 1, 1);
        let library = Library::new(
            Arc::new(InMemoryLibrary::new()),
            activity,
            Arc::new(clock.clone()),
        );
        let root = library
            .bootstrap_admin(UserDraft {
                username: "root".into(),
                email: "root@library.test".into(),
                full_name: "Root Admin".into(),
                phone: None,
                address: None,
                role: Role::SuperAdmin,
                status: UserStatus::Active,
            })
            .await
            .expect("bootstrap")
            .expect("directory was empty");
        let admin = RequestContext::new(root.id, Role::SuperAdmin, None);
        let librarian = library
            .add_user(&admin, user_draft("librarian", Role::Staff))
            .await
            .expect("staff");
        let staff = RequestContext::new(librarian.id, Role::Staff, None);
        Fixture {
            library,
            clock,
            admin,
            staff,
        }
    }

    fn user_draft(username: &str, role: Role) -> UserDraft {
        UserDraft {
            username: username.into(),
            email: format!("{username}@library.test"),
            full_name: username.to_uppercase(),
            phone: None,
            address: None,
            role,
            status: UserStatus::Active,
        }
    }

    fn book_draft(title: &str, quantity: u32) -> BookDraft {
        BookDraft {
            title: title.into(),
            quantity,
            ..BookDraft::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_only_runs_on_an_empty_directory() {
        let f = fixture().await;
        let again = f
            .library
            .bootstrap_admin(user_draft("second", Role::SuperAdmin))
            .await
            .expect("no error");
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn late_return_charges_the_configured_rate() {
        let f = fixture().await;
        let book = f.library.add_book(&f.staff, book_draft("Dune", 1)).await.expect("book");
        let member = f
            .library
            .add_user(&f.admin, user_draft("alice", Role::Member))
            .await
            .expect("member");

        f.library
            .update_setting(&f.admin, "borrowing_period_days", "9")
            .await
            .expect("setting");
        let record = f
            .library
            .issue_book(&f.staff, book.id, member.id, None)
            .await
            .expect("issued");
        assert_eq!(record.due_date, date(2024, 1, 10));
        assert_eq!(f.library.book(book.id).await.expect("book").available_quantity, 0);

        f.clock.set_date(date(2024, 1, 15));
        let receipt = f
            .library
            .return_book(&f.staff, record.id, None)
            .await
            .expect("returned");
        assert_eq!(receipt.record.fine_amount, Money::from_cents(2500));
        assert_eq!(receipt.days_overdue, 5);
        assert_eq!(f.library.book(book.id).await.expect("book").available_quantity, 1);

        let fines = f.library.user_fines(&f.staff, member.id).await.expect("fines");
        assert_eq!(fines.total, Money::from_cents(2500));
    }

    #[tokio::test]
    async fn mutations_are_audited_after_commit() {
        let f = fixture().await;
        let book = f.library.add_book(&f.staff, book_draft("Emma", 2)).await.expect("book");
        let member = f
            .library
            .add_user(&f.admin, user_draft("bob", Role::Member))
            .await
            .expect("member");
        f.library
            .issue_book(&f.staff, book.id, member.id, Some(7))
            .await
            .expect("issued");
        f.library.settle(SETTLE).await.expect("effects drain");

        let entries = f
            .library
            .activity(&f.admin, &ActivityFilter::default())
            .await
            .expect("activity");
        let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions.first(), Some(&"ISSUE_BOOK"));
        assert!(actions.contains(&"ADD_BOOK"));
        assert!(actions.contains(&"ADD_USER"));

        let forbidden = f.library.activity(&f.staff, &ActivityFilter::default()).await;
        assert!(matches!(forbidden, Err(LedgerError::Forbidden(_))));
    }

    /// Activity log whose every append fails.
    struct UnreachableLog;

    #[async_trait::async_trait]
    impl ActivityLog for UnreachableLog {
        async fn append(&self, _entry: NewActivity) -> Result<ActivityLogEntry, PersistenceError> {
            Err(PersistenceError::Database("activity_logs unreachable".into()))
        }

        async fn list(&self, _filter: &ActivityFilter) -> Result<Vec<ActivityLogEntry>, PersistenceError> {
            Err(PersistenceError::Database("activity_logs unreachable".into()))
        }
    }

    #[tokio::test]
    async fn audit_failures_never_undo_circulation() {
        let f = fixture_logging_to(Arc::new(UnreachableLog)).await;
        let book = f.library.add_book(&f.staff, book_draft("Middlemarch", 2)).await.expect("book");
        let member = f
            .library
            .add_user(&f.admin, user_draft("grace", Role::Member))
            .await
            .expect("member");

        let record = f
            .library
            .issue_book(&f.staff, book.id, member.id, Some(3))
            .await
            .expect("issue commits without an audit entry");
        f.library.settle(SETTLE).await.expect("failed appends still drain");
        assert_eq!(f.library.book(book.id).await.expect("book").available_quantity, 1);

        f.clock.advance_days(5);
        let receipt = f
            .library
            .return_book(&f.staff, record.id, None)
            .await
            .expect("return commits without an audit entry");
        f.library.settle(SETTLE).await.expect("failed appends still drain");

        assert_eq!(receipt.record.fine_amount, Money::from_cents(1000));
        assert_eq!(f.library.book(book.id).await.expect("book").available_quantity, 2);
        let history = f
            .library
            .user_borrowings(&f.staff, member.id)
            .await
            .expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].return_date, Some(date(2024, 1, 6)));
        assert!(f.library.health().await.is_healthy());
    }

    #[tokio::test]
    async fn rejected_issue_is_not_audited() {
        let f = fixture().await;
        let book = f.library.add_book(&f.staff, book_draft("Ulysses", 0)).await.expect("book");
        let member = f
            .library
            .add_user(&f.admin, user_draft("carol", Role::Member))
            .await
            .expect("member");
        let error = f
            .library
            .issue_book(&f.staff, book.id, member.id, None)
            .await
            .expect_err("nothing on the shelf");
        assert_eq!(error, LedgerError::Rejected(Rejection::BookUnavailable));

        f.library.settle(SETTLE).await.expect("effects drain");
        let issues = f
            .library
            .activity(
                &f.admin,
                &ActivityFilter {
                    action: Some("ISSUE_BOOK".into()),
                    ..ActivityFilter::default()
                },
            )
            .await
            .expect("activity");
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let f = fixture().await;
        f.library
            .add_user(&f.admin, user_draft("dave", Role::Member))
            .await
            .expect("first");
        let mut again = user_draft("dave", Role::Member);
        again.email = "other@library.test".into();
        let error = f.library.add_user(&f.admin, again).await.expect_err("taken");
        assert_eq!(error.kind(), "DUPLICATE");
    }

    #[tokio::test]
    async fn staff_cannot_create_super_admins_or_users() {
        let f = fixture().await;
        let error = f
            .library
            .add_user(&f.staff, user_draft("eve", Role::Member))
            .await
            .expect_err("staff are below admin");
        assert!(matches!(error, LedgerError::Forbidden(_)));
    }

    #[tokio::test]
    async fn category_in_use_cannot_be_deleted() {
        let f = fixture().await;
        let category = f
            .library
            .add_category(
                &f.staff,
                CategoryDraft {
                    name: "Fiction".into(),
                    description: None,
                },
            )
            .await
            .expect("category");
        let mut draft = book_draft("Middlemarch", 1);
        draft.category_id = Some(category.id);
        f.library.add_book(&f.staff, draft).await.expect("book");

        let error = f
            .library
            .remove_category(&f.staff, category.id)
            .await
            .expect_err("still referenced");
        assert_eq!(error, LedgerError::Rejected(Rejection::CategoryHasBooks));
    }

    #[tokio::test]
    async fn consistency_check_reports_open_loans() {
        let f = fixture().await;
        let book = f.library.add_book(&f.staff, book_draft("Beloved", 3)).await.expect("book");
        let member = f
            .library
            .add_user(&f.admin, user_draft("frank", Role::Member))
            .await
            .expect("member");
        f.library
            .issue_book(&f.staff, book.id, member.id, None)
            .await
            .expect("issued");

        let report = f.library.book_consistency(&f.staff, book.id).await.expect("report");
        assert_eq!(report.open_borrowings, 1);
        assert_eq!(report.expected_available, 2);
        assert!(report.consistent);
    }

    #[tokio::test]
    async fn stale_reservations_read_as_expired() {
        let f = fixture().await;
        let book = f.library.add_book(&f.staff, book_draft("Persuasion", 1)).await.expect("book");
        let member = f
            .library
            .add_user(&f.admin, user_draft("grace", Role::Member))
            .await
            .expect("member");
        let me = RequestContext::new(member.id, Role::Member, None);
        let hold = f
            .library
            .place_reservation(&me, book.id, member.id)
            .await
            .expect("hold");
        assert_eq!(hold.expiry_date, date(2024, 1, 4));

        f.clock.set_date(date(2024, 1, 5));
        let holds = f.library.user_reservations(&me, member.id).await.expect("holds");
        assert_eq!(holds.len(), 1);
        assert_eq!(holds[0].status, ReservationStatus::Expired);

        let other = RequestContext::new(UserId::new(), Role::Member, None);
        assert!(f.library.user_reservations(&other, member.id).await.is_err());
    }

    #[tokio::test]
    async fn inactive_accounts_cannot_authenticate() {
        let f = fixture().await;
        let mut draft = user_draft("henry", Role::Member);
        draft.status = UserStatus::Suspended;
        let suspended = f.library.add_user(&f.admin, draft).await.expect("user");

        let error = f
            .library
            .authenticate(suspended.id, None)
            .await
            .expect_err("suspended");
        assert!(matches!(error, LedgerError::Forbidden(_)));
        assert!(matches!(
            f.library.authenticate(UserId::new(), None).await,
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn settings_writes_are_super_admin_only_and_validated() {
        let f = fixture().await;
        assert!(matches!(
            f.library.update_setting(&f.staff, "fine_per_day", "1.00").await,
            Err(LedgerError::Forbidden(_))
        ));
        assert!(matches!(
            f.library.update_setting(&f.admin, "late_fee", "1.00").await,
            Err(LedgerError::Validation(_))
        ));
        let updated = f
            .library
            .update_setting(&f.admin, "fine_per_day", "1.25")
            .await
            .expect("valid");
        assert_eq!(updated.fine_per_day, Money::from_cents(125));
    }

    #[tokio::test]
    async fn health_reports_both_components() {
        let f = fixture().await;
        let report = f.library.health().await;
        assert_eq!(report.checks.len(), 2);
    }
}
