//! In-memory backend.
//!
//! The whole library lives in one [`CirculationState`] behind a single async
//! mutex, so every command observes and mutates it atomically. Used for tests
//! and for running the server without a database (`LIBRIS_STORAGE=memory`).

use super::{
    BorrowingFilter, CatalogStore, CirculationStore, Dispatched, LedgerQueries, SettingsStore,
    UserDirectory,
};
use crate::catalog::{AuthorListing, BookSearch, CategoryListing};
use crate::directory::UserFilter;
use crate::error::PersistenceError;
use crate::fines::FineSummary;
use crate::ledger::{
    CirculationAction, CirculationEnvironment, CirculationEvent, CirculationReducer,
    CirculationState,
};
use crate::reports::{LedgerCounts, LoanView, PopularBook};
use crate::settings::{LibrarySettings, SettingKey, SettingValue};
use crate::types::{
    Author, AuthorId, Book, BookId, BorrowingId, BorrowingRecord, Category, CategoryId, Money,
    Reservation, ReservationId, User, UserId,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use libris_core::reducer::Reducer;
use libris_runtime::HealthCheck;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct LibraryData {
    state: CirculationState,
    authors: HashMap<AuthorId, Author>,
    categories: HashMap<CategoryId, Category>,
}

impl LibraryData {
    fn loan_view(&self, record: &BorrowingRecord) -> LoanView {
        let book_title = self
            .state
            .books
            .get(&record.book_id)
            .map_or_else(String::new, |b| b.title.clone());
        let (username, full_name) = self
            .state
            .users
            .get(&record.user_id)
            .map_or_else(Default::default, |u| (u.username.clone(), u.full_name.clone()));
        LoanView {
            record: record.clone(),
            book_title,
            username,
            full_name,
        }
    }

    fn book_references_exist(&self, book: &Book) -> Result<(), PersistenceError> {
        if book.author_id.is_some_and(|a| !self.authors.contains_key(&a)) {
            return Err(PersistenceError::MissingReference {
                constraint: "books_author_id_fkey".to_string(),
            });
        }
        if book
            .category_id
            .is_some_and(|c| !self.categories.contains_key(&c))
        {
            return Err(PersistenceError::MissingReference {
                constraint: "books_category_id_fkey".to_string(),
            });
        }
        Ok(())
    }

    fn user_is_unique(&self, user: &User) -> Result<(), PersistenceError> {
        for other in self.state.users.values().filter(|u| u.id != user.id) {
            if other.username == user.username {
                return Err(duplicate("users_username_key"));
            }
            if other.email == user.email {
                return Err(duplicate("users_email_key"));
            }
        }
        Ok(())
    }

    fn category_is_unique(&self, category: &Category) -> Result<(), PersistenceError> {
        let taken = self
            .categories
            .values()
            .any(|c| c.id != category.id && c.name == category.name);
        if taken {
            return Err(duplicate("categories_name_key"));
        }
        Ok(())
    }
}

fn duplicate(constraint: &str) -> PersistenceError {
    PersistenceError::Duplicate {
        constraint: constraint.to_string(),
    }
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Library kept entirely in process memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLibrary {
    data: Arc<Mutex<LibraryData>>,
}

impl InMemoryLibrary {
    /// Empty library with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty library with the given settings.
    #[must_use]
    pub fn with_settings(settings: LibrarySettings) -> Self {
        Self {
            data: Arc::new(Mutex::new(LibraryData {
                state: CirculationState::with_settings(settings),
                ..LibraryData::default()
            })),
        }
    }

    /// Books whose availability counter disagrees with the open records.
    pub async fn inconsistent_books(&self) -> Vec<BookId> {
        self.data.lock().await.state.inconsistent_books()
    }
}

#[async_trait]
impl CirculationStore for InMemoryLibrary {
    #[tracing::instrument(skip_all, name = "memory.dispatch")]
    async fn dispatch(
        &self,
        action: CirculationAction,
        env: &CirculationEnvironment,
    ) -> Result<Dispatched, PersistenceError> {
        let mut data = self.data.lock().await;
        let previous = match &action {
            CirculationAction::UpdateBook { book_id, .. } => data.state.books.get(book_id).cloned(),
            _ => None,
        };
        let effects = CirculationReducer::new().reduce(&mut data.state, action, env);
        let dispatched = Dispatched::take(&mut data.state, effects);

        // Edited author and category must exist; undo the edit otherwise.
        if let (Ok(CirculationEvent::BookUpdated { book }), Some(previous)) = (&dispatched.result, previous) {
            if let Err(error) = data.book_references_exist(book) {
                data.state.books.insert(previous.id, previous);
                return Err(error);
            }
        }
        Ok(dispatched)
    }

    async fn health(&self) -> HealthCheck {
        let data = self.data.lock().await;
        HealthCheck::healthy("storage")
            .with_metadata("backend", "memory")
            .with_metadata("books", data.state.books.len().to_string())
    }
}

#[async_trait]
impl CatalogStore for InMemoryLibrary {
    async fn insert_book(&self, book: &Book) -> Result<(), PersistenceError> {
        let mut data = self.data.lock().await;
        data.book_references_exist(book)?;
        if let Some(isbn) = book.isbn.as_deref() {
            if data.state.books.values().any(|b| b.isbn.as_deref() == Some(isbn)) {
                return Err(duplicate("books_isbn_key"));
            }
        }
        data.state.books.insert(book.id, book.clone());
        Ok(())
    }

    async fn book(&self, id: BookId) -> Result<Option<Book>, PersistenceError> {
        Ok(self.data.lock().await.state.books.get(&id).cloned())
    }

    async fn books(&self, search: &BookSearch) -> Result<Vec<Book>, PersistenceError> {
        let data = self.data.lock().await;
        let mut books: Vec<Book> = data
            .state
            .books
            .values()
            .filter(|b| {
                let author = b
                    .author_id
                    .and_then(|a| data.authors.get(&a))
                    .map(|a| a.name.as_str());
                search.matches(b, author)
            })
            .cloned()
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn insert_author(&self, author: &Author) -> Result<(), PersistenceError> {
        self.data
            .lock()
            .await
            .authors
            .insert(author.id, author.clone());
        Ok(())
    }

    async fn update_author(&self, author: &Author) -> Result<bool, PersistenceError> {
        let mut data = self.data.lock().await;
        Ok(data
            .authors
            .get_mut(&author.id)
            .map(|existing| *existing = author.clone())
            .is_some())
    }

    async fn delete_author(&self, id: AuthorId) -> Result<bool, PersistenceError> {
        let mut data = self.data.lock().await;
        if data.state.books.values().any(|b| b.author_id == Some(id)) {
            return Err(PersistenceError::InUse {
                constraint: "books_author_id_fkey".to_string(),
            });
        }
        Ok(data.authors.remove(&id).is_some())
    }

    async fn author(&self, id: AuthorId) -> Result<Option<Author>, PersistenceError> {
        Ok(self.data.lock().await.authors.get(&id).cloned())
    }

    async fn authors(&self) -> Result<Vec<AuthorListing>, PersistenceError> {
        let data = self.data.lock().await;
        let mut listings: Vec<AuthorListing> = data
            .authors
            .values()
            .map(|author| AuthorListing {
                author: author.clone(),
                book_count: as_count(
                    data.state
                        .books
                        .values()
                        .filter(|b| b.author_id == Some(author.id))
                        .count(),
                ),
            })
            .collect();
        listings.sort_by(|a, b| a.author.name.cmp(&b.author.name));
        Ok(listings)
    }

    async fn insert_category(&self, category: &Category) -> Result<(), PersistenceError> {
        let mut data = self.data.lock().await;
        data.category_is_unique(category)?;
        data.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> Result<bool, PersistenceError> {
        let mut data = self.data.lock().await;
        if !data.categories.contains_key(&category.id) {
            return Ok(false);
        }
        data.category_is_unique(category)?;
        data.categories.insert(category.id, category.clone());
        Ok(true)
    }

    async fn delete_category(&self, id: CategoryId) -> Result<bool, PersistenceError> {
        let mut data = self.data.lock().await;
        if data.state.books.values().any(|b| b.category_id == Some(id)) {
            return Err(PersistenceError::InUse {
                constraint: "books_category_id_fkey".to_string(),
            });
        }
        Ok(data.categories.remove(&id).is_some())
    }

    async fn category(&self, id: CategoryId) -> Result<Option<Category>, PersistenceError> {
        Ok(self.data.lock().await.categories.get(&id).cloned())
    }

    async fn categories(&self) -> Result<Vec<CategoryListing>, PersistenceError> {
        let data = self.data.lock().await;
        let mut listings: Vec<CategoryListing> = data
            .categories
            .values()
            .map(|category| CategoryListing {
                category: category.clone(),
                book_count: as_count(
                    data.state
                        .books
                        .values()
                        .filter(|b| b.category_id == Some(category.id))
                        .count(),
                ),
            })
            .collect();
        listings.sort_by(|a, b| a.category.name.cmp(&b.category.name));
        Ok(listings)
    }
}

#[async_trait]
impl UserDirectory for InMemoryLibrary {
    async fn insert_user(&self, user: &User) -> Result<(), PersistenceError> {
        let mut data = self.data.lock().await;
        data.user_is_unique(user)?;
        data.state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<bool, PersistenceError> {
        let mut data = self.data.lock().await;
        if !data.state.users.contains_key(&user.id) {
            return Ok(false);
        }
        data.user_is_unique(user)?;
        data.state.users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, PersistenceError> {
        Ok(self.data.lock().await.state.users.get(&id).cloned())
    }

    async fn users(&self, filter: &UserFilter) -> Result<Vec<User>, PersistenceError> {
        let data = self.data.lock().await;
        let mut users: Vec<User> = data
            .state
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn user_count(&self) -> Result<u64, PersistenceError> {
        Ok(as_count(self.data.lock().await.state.users.len()))
    }
}

#[async_trait]
impl SettingsStore for InMemoryLibrary {
    async fn load(&self) -> Result<LibrarySettings, PersistenceError> {
        Ok(self.data.lock().await.state.settings)
    }

    async fn get(&self, key: SettingKey) -> Result<Option<String>, PersistenceError> {
        Ok(Some(self.data.lock().await.state.settings.get(key)))
    }

    async fn set(&self, key: SettingKey, value: SettingValue) -> Result<(), PersistenceError> {
        self.data.lock().await.state.settings.apply(key, value);
        Ok(())
    }
}

#[async_trait]
impl LedgerQueries for InMemoryLibrary {
    async fn borrowing(&self, id: BorrowingId) -> Result<Option<BorrowingRecord>, PersistenceError> {
        Ok(self.data.lock().await.state.records.get(&id).cloned())
    }

    async fn borrowings(
        &self,
        filter: &BorrowingFilter,
        today: NaiveDate,
    ) -> Result<Vec<BorrowingRecord>, PersistenceError> {
        let data = self.data.lock().await;
        let mut records: Vec<BorrowingRecord> = data
            .state
            .records
            .values()
            .filter(|r| filter.matches(r, today))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.borrowed_date.cmp(&a.borrowed_date).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn open_count_for_book(&self, book_id: BookId) -> Result<u32, PersistenceError> {
        Ok(self.data.lock().await.state.open_count_for_book(book_id))
    }

    async fn fines_for_user(&self, user_id: UserId) -> Result<FineSummary, PersistenceError> {
        let data = self.data.lock().await;
        Ok(FineSummary::for_user(user_id, data.state.records.values()))
    }

    async fn overdue(&self, today: NaiveDate) -> Result<Vec<LoanView>, PersistenceError> {
        let data = self.data.lock().await;
        Ok(data
            .state
            .overdue(today)
            .into_iter()
            .map(|r| data.loan_view(r))
            .collect())
    }

    async fn counts(&self, today: NaiveDate) -> Result<LedgerCounts, PersistenceError> {
        let data = self.data.lock().await;
        let records = &data.state.records;
        let fined: Vec<&BorrowingRecord> =
            records.values().filter(|r| !r.fine_amount.is_zero()).collect();
        let currently_borrowed = as_count(records.values().filter(|r| r.is_open()).count());
        Ok(LedgerCounts {
            total_borrowings: as_count(records.len()),
            currently_borrowed,
            returned: as_count(records.len()).saturating_sub(currently_borrowed),
            overdue: as_count(records.values().filter(|r| r.is_overdue(today)).count()),
            total_fines: fined.iter().map(|r| r.fine_amount).sum::<Money>(),
            fined_records: as_count(fined.len()),
            users_with_fines: as_count(
                fined.iter().map(|r| r.user_id).collect::<HashSet<_>>().len(),
            ),
        })
    }

    async fn most_borrowed(&self, limit: u32) -> Result<Vec<PopularBook>, PersistenceError> {
        let data = self.data.lock().await;
        let mut counts: HashMap<BookId, u64> = HashMap::new();
        for record in data.state.records.values() {
            *counts.entry(record.book_id).or_default() += 1;
        }
        let mut popular: Vec<PopularBook> = counts
            .into_iter()
            .filter_map(|(book_id, borrow_count)| {
                data.state.books.get(&book_id).map(|b| PopularBook {
                    book_id,
                    title: b.title.clone(),
                    borrow_count,
                })
            })
            .collect();
        popular.sort_by(|a, b| {
            b.borrow_count
                .cmp(&a.borrow_count)
                .then_with(|| a.title.cmp(&b.title))
        });
        popular.truncate(limit as usize);
        Ok(popular)
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, PersistenceError> {
        Ok(self.data.lock().await.state.reservations.get(&id).cloned())
    }

    async fn reservations_for_user(&self, user_id: UserId) -> Result<Vec<Reservation>, PersistenceError> {
        let data = self.data.lock().await;
        let mut reservations: Vec<Reservation> = data
            .state
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        reservations.sort_by(|a, b| {
            b.reservation_date
                .cmp(&a.reservation_date)
                .then(a.id.cmp(&b.id))
        });
        Ok(reservations)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::activity::InMemoryActivityLog;
    use crate::catalog::BookDraft;
    use crate::context::RequestContext;
    use crate::error::{LedgerError, Rejection};
    use crate::types::{Role, UserStatus};
    use chrono::Utc;
    use libris_testing::clock_on;

    fn member(name: &str) -> User {
        User {
            id: UserId::new(),
            username: name.to_string(),
            email: format!("{name}@example.org"),
            full_name: name.to_string(),
            phone: None,
            address: None,
            role: Role::Member,
            status: UserStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn usernames_and_emails_are_unique() {
        let store = InMemoryLibrary::new();
        let alice = member("alice");
        store.insert_user(&alice).await.expect("insert");

        let clash = User {
            id: UserId::new(),
            email: "other@example.org".into(),
            ..alice.clone()
        };
        assert_eq!(
            store.insert_user(&clash).await,
            Err(duplicate("users_username_key"))
        );
        assert_eq!(store.user_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn author_with_books_cannot_be_deleted() {
        let store = InMemoryLibrary::new();
        let author = Author {
            id: AuthorId::new(),
            name: "Italo Calvino".into(),
            biography: None,
            birth_date: None,
            nationality: None,
        };
        store.insert_author(&author).await.expect("author");
        let mut book = BookDraft {
            title: "Invisible Cities".into(),
            quantity: 1,
            ..BookDraft::default()
        }
        .into_book(BookId::new());
        book.author_id = Some(author.id);
        store.insert_book(&book).await.expect("book");

        assert!(matches!(
            store.delete_author(author.id).await,
            Err(PersistenceError::InUse { .. })
        ));
        assert_eq!(store.authors().await.expect("list")[0].book_count, 1);
    }

    #[tokio::test]
    async fn book_with_unknown_author_is_refused() {
        let store = InMemoryLibrary::new();
        let mut book = BookDraft {
            title: "Orphan".into(),
            quantity: 1,
            ..BookDraft::default()
        }
        .into_book(BookId::new());
        book.author_id = Some(AuthorId::new());
        assert!(matches!(
            store.insert_book(&book).await,
            Err(PersistenceError::MissingReference { .. })
        ));
    }

    #[tokio::test]
    async fn edit_to_unknown_author_is_refused_and_undone() {
        let store = InMemoryLibrary::new();
        let draft = BookDraft {
            title: "Orphan".into(),
            quantity: 1,
            ..BookDraft::default()
        };
        let book = draft.clone().into_book(BookId::new());
        store.insert_book(&book).await.expect("book");
        let env = CirculationEnvironment::new(
            Arc::new(clock_on(2024, 1, 1)),
            Arc::new(InMemoryActivityLog::new()),
        );

        let edit = CirculationAction::UpdateBook {
            book_id: book.id,
            draft: BookDraft {
                title: "Orphan, revised".into(),
                author_id: Some(AuthorId::new()),
                ..draft
            },
            ctx: RequestContext::system(),
        };
        let outcome = store.dispatch(edit, &env).await;

        assert_eq!(
            outcome.map(|d| d.result),
            Err(PersistenceError::MissingReference {
                constraint: "books_author_id_fkey".to_string(),
            })
        );
        let stored = store.book(book.id).await.expect("read").expect("still there");
        assert_eq!(stored.title, "Orphan");
        assert_eq!(stored.author_id, None);
    }

    #[tokio::test]
    async fn dispatch_applies_or_reports_decision() {
        let store = InMemoryLibrary::new();
        let reader = member("reader");
        store.insert_user(&reader).await.expect("user");
        let book = BookDraft {
            title: "Solaris".into(),
            quantity: 1,
            ..BookDraft::default()
        }
        .into_book(BookId::new());
        store.insert_book(&book).await.expect("book");

        let env = CirculationEnvironment::new(
            Arc::new(clock_on(2024, 1, 1)),
            Arc::new(InMemoryActivityLog::new()),
        );
        let issue = || CirculationAction::IssueBook {
            borrowing_id: BorrowingId::new(),
            book_id: book.id,
            user_id: reader.id,
            period_days: None,
            ctx: RequestContext::system(),
        };

        let first = store.dispatch(issue(), &env).await.expect("dispatch");
        assert!(first.result.is_ok());
        assert_eq!(first.effects.len(), 1);

        let second = store.dispatch(issue(), &env).await.expect("dispatch");
        assert_eq!(
            second.result,
            Err(LedgerError::Rejected(Rejection::BookUnavailable))
        );
        assert!(second.effects.is_empty());
        assert_eq!(store.open_count_for_book(book.id).await.expect("count"), 1);
        assert!(store.inconsistent_books().await.is_empty());
    }
}
