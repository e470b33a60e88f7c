//! Borrowing lifecycle through the service layer on the in-memory backend.

#![allow(clippy::expect_used, clippy::unwrap_used, missing_docs)]

use libris_circulation::catalog::BookDraft;
use libris_circulation::directory::UserDraft;
use libris_circulation::fines::FineSummary;
use libris_circulation::types::{AuthorId, Book, BorrowingId, BorrowingStatus, Money, Role, User, UserStatus};
use libris_circulation::{Library, LedgerError, Rejection, RequestContext};
use libris_testing::{FixedClock, clock_on, date};
use proptest::prelude::*;
use std::sync::Arc;

struct Desk {
    library: Library,
    clock: FixedClock,
    admin: RequestContext,
    staff: RequestContext,
}

impl Desk {
    async fn open() -> Self {
        let clock = clock_on(2024, 1, 1);
        let library = Library::in_memory(Arc::new(clock.clone()));
        let root = library
            .bootstrap_admin(draft("root", Role::SuperAdmin))
            .await
            .expect("bootstrap")
            .expect("empty directory");
        let admin = RequestContext::new(root.id, Role::SuperAdmin, None);
        let librarian = library
            .add_user(&admin, draft("librarian", Role::Staff))
            .await
            .expect("staff user");
        let staff = RequestContext::new(librarian.id, Role::Staff, None);
        Self {
            library,
            clock,
            admin,
            staff,
        }
    }

    async fn member(&self, name: &str) -> User {
        self.library
            .add_user(&self.admin, draft(name, Role::Member))
            .await
            .expect("member")
    }

    async fn book(&self, title: &str, quantity: u32) -> Book {
        self.library
            .add_book(
                &self.staff,
                BookDraft {
                    title: title.to_string(),
                    quantity,
                    ..BookDraft::default()
                },
            )
            .await
            .expect("book")
    }

    async fn available(&self, book: &Book) -> u32 {
        self.library
            .book(book.id)
            .await
            .expect("book exists")
            .available_quantity
    }

    async fn set(&self, key: &str, value: &str) {
        self.library
            .update_setting(&self.admin, key, value)
            .await
            .expect("setting");
    }
}

fn draft(username: &str, role: Role) -> UserDraft {
    UserDraft {
        username: username.to_string(),
        email: format!("{username}@library.test"),
        full_name: format!("{username} example"),
        phone: None,
        address: None,
        role,
        status: UserStatus::Active,
    }
}

#[tokio::test]
async fn borrowing_limit_scenario() {
    let desk = Desk::open().await;
    desk.set("max_books_per_user", "2").await;
    let book = desk.book("Dune", 3).await;
    let alice = desk.member("alice").await;

    desk.library
        .issue_book(&desk.staff, book.id, alice.id, None)
        .await
        .expect("first loan");
    assert_eq!(desk.available(&book).await, 2);

    desk.library
        .issue_book(&desk.staff, book.id, alice.id, None)
        .await
        .expect("second loan");
    assert_eq!(desk.available(&book).await, 1);

    let third = desk
        .library
        .issue_book(&desk.staff, book.id, alice.id, None)
        .await;
    assert_eq!(
        third,
        Err(LedgerError::Rejected(Rejection::BorrowingLimitReached {
            limit: 2
        }))
    );
    assert_eq!(desk.available(&book).await, 1);
    assert_eq!(
        desk.library
            .user_borrowings(&desk.staff, alice.id)
            .await
            .expect("records")
            .len(),
        2
    );
}

#[tokio::test]
async fn empty_shelf_never_creates_a_record() {
    let desk = Desk::open().await;
    let book = desk.book("Ulysses", 1).await;
    let (alice, bob) = (desk.member("alice").await, desk.member("bob").await);

    desk.library
        .issue_book(&desk.staff, book.id, alice.id, None)
        .await
        .expect("only copy");
    let refused = desk
        .library
        .issue_book(&desk.staff, book.id, bob.id, None)
        .await;

    assert_eq!(refused, Err(LedgerError::Rejected(Rejection::BookUnavailable)));
    assert!(
        desk.library
            .user_borrowings(&desk.staff, bob.id)
            .await
            .expect("records")
            .is_empty()
    );
    assert_eq!(desk.available(&book).await, 0);
}

#[tokio::test]
async fn five_days_late_costs_twenty_five() {
    let desk = Desk::open().await;
    desk.set("borrowing_period_days", "9").await;
    let book = desk.book("Emma", 1).await;
    let alice = desk.member("alice").await;

    let record = desk
        .library
        .issue_book(&desk.staff, book.id, alice.id, None)
        .await
        .expect("issued");
    assert_eq!(record.due_date, date(2024, 1, 10));

    let receipt = desk
        .library
        .return_book(&desk.staff, record.id, Some(date(2024, 1, 15)))
        .await
        .expect("returned");

    assert_eq!(receipt.record.fine_amount, Money::from_cents(2500));
    assert_eq!(receipt.record.fine_amount.to_string(), "25.00");
    assert_eq!(receipt.record.status, BorrowingStatus::Returned);
    assert_eq!(receipt.record.returned_to, desk.staff.actor);
    assert_eq!(desk.available(&book).await, 1);
}

#[tokio::test]
async fn return_on_or_before_due_date_is_free() {
    let desk = Desk::open().await;
    let book = desk.book("Beloved", 2).await;
    let alice = desk.member("alice").await;

    let record = desk
        .library
        .issue_book(&desk.staff, book.id, alice.id, Some(7))
        .await
        .expect("issued");
    let receipt = desk
        .library
        .return_book(&desk.staff, record.id, Some(record.due_date))
        .await
        .expect("returned");

    assert!(receipt.record.fine_amount.is_zero());
    assert_eq!(receipt.days_overdue, 0);
}

#[tokio::test]
async fn same_day_round_trip_restores_the_shelf() {
    let desk = Desk::open().await;
    let book = desk.book("Persuasion", 2).await;
    let alice = desk.member("alice").await;

    let record = desk
        .library
        .issue_book(&desk.staff, book.id, alice.id, None)
        .await
        .expect("issued");
    let receipt = desk
        .library
        .return_book(&desk.staff, record.id, None)
        .await
        .expect("returned");

    assert!(receipt.record.fine_amount.is_zero());
    assert_eq!(receipt.record.return_date, Some(date(2024, 1, 1)));
    assert_eq!(desk.available(&book).await, 2);
}

#[tokio::test]
async fn second_return_is_rejected_and_changes_nothing() {
    let desk = Desk::open().await;
    let book = desk.book("Middlemarch", 1).await;
    let alice = desk.member("alice").await;
    let record = desk
        .library
        .issue_book(&desk.staff, book.id, alice.id, None)
        .await
        .expect("issued");
    desk.clock.set_date(date(2024, 1, 20));
    let first = desk
        .library
        .return_book(&desk.staff, record.id, None)
        .await
        .expect("returned");

    desk.clock.set_date(date(2024, 2, 1));
    let again = desk.library.return_book(&desk.staff, record.id, None).await;

    assert_eq!(again, Err(LedgerError::Rejected(Rejection::AlreadyReturned)));
    let stored = desk
        .library
        .borrowing(&desk.staff, record.id)
        .await
        .expect("record");
    assert_eq!(stored.fine_amount, first.record.fine_amount);
    assert_eq!(stored.return_date, Some(date(2024, 1, 20)));
    assert_eq!(desk.available(&book).await, 1);
}

#[tokio::test]
async fn unknown_record_cannot_be_returned() {
    let desk = Desk::open().await;
    let result = desk
        .library
        .return_book(&desk.staff, BorrowingId::new(), None)
        .await;
    assert!(matches!(result, Err(LedgerError::NotFound { .. })));
}

#[tokio::test]
async fn open_loans_past_due_read_as_overdue() {
    let desk = Desk::open().await;
    let book = desk.book("Walden", 1).await;
    let alice = desk.member("alice").await;
    let record = desk
        .library
        .issue_book(&desk.staff, book.id, alice.id, Some(3))
        .await
        .expect("issued");

    desk.clock.set_date(date(2024, 1, 10));
    let shown = desk
        .library
        .borrowing(&desk.staff, record.id)
        .await
        .expect("record");
    assert_eq!(shown.status, BorrowingStatus::Overdue);

    let report = desk
        .library
        .overdue_report(&desk.admin)
        .await
        .expect("report");
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].days_overdue, 6);
    assert_eq!(report[0].accrued_fine, Money::from_cents(3000));
}

#[tokio::test]
async fn quantity_edits_respect_copies_on_loan() {
    let desk = Desk::open().await;
    let book = desk.book("Moby Dick", 3).await;
    let (alice, bob) = (desk.member("alice").await, desk.member("bob").await);
    for member in [&alice, &bob] {
        desk.library
            .issue_book(&desk.staff, book.id, member.id, None)
            .await
            .expect("issued");
    }

    let too_few = desk
        .library
        .update_book(
            &desk.staff,
            book.id,
            BookDraft {
                title: book.title.clone(),
                quantity: 1,
                ..BookDraft::default()
            },
        )
        .await;
    assert_eq!(
        too_few,
        Err(LedgerError::Rejected(Rejection::QuantityBelowBorrowed {
            borrowed: 2,
            requested: 1
        }))
    );

    let grown = desk
        .library
        .update_book(
            &desk.staff,
            book.id,
            BookDraft {
                title: book.title.clone(),
                quantity: 5,
                ..BookDraft::default()
            },
        )
        .await
        .expect("more copies");
    assert_eq!(grown.available_quantity, 3);

    let removal = desk.library.remove_book(&desk.staff, book.id).await;
    assert_eq!(removal, Err(LedgerError::Rejected(Rejection::BookOnLoan)));
}

#[tokio::test]
async fn edits_and_creates_agree_on_unknown_authors() {
    let desk = Desk::open().await;
    let ghost = AuthorId::new();
    let created = desk
        .library
        .add_book(
            &desk.staff,
            BookDraft {
                title: "Ghostwritten".to_string(),
                quantity: 1,
                author_id: Some(ghost),
                ..BookDraft::default()
            },
        )
        .await;
    assert!(matches!(created, Err(LedgerError::Validation(_))));

    let book = desk.book("Ghostwritten", 1).await;
    let edited = desk
        .library
        .update_book(
            &desk.staff,
            book.id,
            BookDraft {
                title: book.title.clone(),
                quantity: 1,
                author_id: Some(ghost),
                ..BookDraft::default()
            },
        )
        .await;
    assert!(matches!(edited, Err(LedgerError::Validation(_))));
    assert_eq!(
        desk.library.book(book.id).await.expect("book").author_id,
        None
    );
}

#[tokio::test]
async fn lent_books_keep_their_history_and_fines() {
    let desk = Desk::open().await;
    let book = desk.book("Bleak House", 1).await;
    let alice = desk.member("alice").await;
    let record = desk
        .library
        .issue_book(&desk.staff, book.id, alice.id, Some(1))
        .await
        .expect("issued");
    assert_eq!(record.due_date, date(2024, 1, 2));
    desk.library
        .return_book(&desk.staff, record.id, Some(date(2024, 1, 10)))
        .await
        .expect("returned");
    let before = desk
        .library
        .user_fines(&desk.staff, alice.id)
        .await
        .expect("fines");
    assert_eq!(before.total, Money::from_cents(4000));

    let removal = desk.library.remove_book(&desk.staff, book.id).await;

    assert_eq!(removal, Err(LedgerError::Rejected(Rejection::BookHasHistory)));
    let after = desk
        .library
        .user_fines(&desk.staff, alice.id)
        .await
        .expect("fines");
    assert_eq!(after, before);
    assert_eq!(
        desk.library
            .user_borrowings(&desk.staff, alice.id)
            .await
            .expect("records")
            .len(),
        1
    );
    assert!(desk.library.book(book.id).await.is_ok());
}

#[tokio::test]
async fn unlent_books_can_be_removed() {
    let desk = Desk::open().await;
    let book = desk.book("Shirley", 2).await;

    desk.library
        .remove_book(&desk.staff, book.id)
        .await
        .expect("removed");

    assert!(matches!(
        desk.library.book(book.id).await,
        Err(LedgerError::NotFound { .. })
    ));
}

#[tokio::test]
async fn fine_query_matches_aggregation_over_records() {
    let desk = Desk::open().await;
    desk.set("borrowing_period_days", "5").await;
    desk.set("fine_per_day", "1.50").await;
    let book = desk.book("Dracula", 3).await;
    let alice = desk.member("alice").await;

    let mut loans = Vec::new();
    for _ in 0..3 {
        loans.push(
            desk.library
                .issue_book(&desk.staff, book.id, alice.id, None)
                .await
                .expect("issued"),
        );
    }
    desk.library
        .return_book(&desk.staff, loans[0].id, Some(date(2024, 1, 8)))
        .await
        .expect("two days late");
    desk.library
        .return_book(&desk.staff, loans[1].id, Some(date(2024, 1, 11)))
        .await
        .expect("five days late");
    desk.library
        .return_book(&desk.staff, loans[2].id, Some(date(2024, 1, 6)))
        .await
        .expect("on time");

    let records = desk
        .library
        .user_borrowings(&desk.staff, alice.id)
        .await
        .expect("records");
    let aggregated = FineSummary::for_user(alice.id, &records);
    let queried = desk
        .library
        .user_fines(&desk.staff, alice.id)
        .await
        .expect("fines");

    assert_eq!(queried, aggregated);
    assert_eq!(queried.total, Money::from_cents(1050));
    assert_eq!(queried.fined_records, 2);
}

#[tokio::test]
async fn inactive_borrowers_are_refused() {
    let desk = Desk::open().await;
    let book = desk.book("Kim", 1).await;
    let mut suspended = draft("sam", Role::Member);
    suspended.status = UserStatus::Suspended;
    let sam = desk
        .library
        .add_user(&desk.admin, suspended)
        .await
        .expect("user");

    let refused = desk
        .library
        .issue_book(&desk.staff, book.id, sam.id, None)
        .await;
    assert_eq!(refused, Err(LedgerError::Rejected(Rejection::BorrowerInactive)));
    assert_eq!(desk.available(&book).await, 1);
}

#[derive(Clone, Debug)]
enum Step {
    Issue(usize),
    Return(usize),
    Resize(u32),
    Advance(i64),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0usize..3).prop_map(Step::Issue),
        3 => any::<usize>().prop_map(Step::Return),
        1 => (0u32..6).prop_map(Step::Resize),
        1 => (1i64..20).prop_map(Step::Advance),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn availability_always_matches_open_loans(steps in prop::collection::vec(step(), 1..30)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        runtime.block_on(async {
            let desk = Desk::open().await;
            let book = desk.book("Invariant", 2).await;
            let members = [
                desk.member("alice").await,
                desk.member("bob").await,
                desk.member("carol").await,
            ];
            let mut issued: Vec<BorrowingId> = Vec::new();

            for step in steps {
                match step {
                    Step::Issue(who) => {
                        if let Ok(record) = desk
                            .library
                            .issue_book(&desk.staff, book.id, members[who].id, None)
                            .await
                        {
                            issued.push(record.id);
                        }
                    },
                    Step::Return(pick) => {
                        if !issued.is_empty() {
                            let id = issued[pick % issued.len()];
                            let _ = desk.library.return_book(&desk.staff, id, None).await;
                        }
                    },
                    Step::Resize(quantity) => {
                        let _ = desk
                            .library
                            .update_book(
                                &desk.staff,
                                book.id,
                                BookDraft {
                                    title: book.title.clone(),
                                    quantity,
                                    ..BookDraft::default()
                                },
                            )
                            .await;
                    },
                    Step::Advance(days) => desk.clock.advance_days(days),
                }

                let current = desk.library.book(book.id).await.expect("book");
                assert!(current.available_quantity <= current.quantity);
                let check = desk
                    .library
                    .book_consistency(&desk.staff, book.id)
                    .await
                    .expect("consistency");
                assert!(check.consistent, "{check:?}");
            }
        });
    }
}
