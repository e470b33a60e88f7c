//! Error types for the circulation service.

use crate::settings::SettingsError;
use thiserror::Error;

/// Business-rule rejection: the request was well formed but the library's
/// rules refuse it. Nothing was mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No copy on the shelf
    #[error("Book is not available for borrowing!")]
    BookUnavailable,

    /// Borrower already holds the maximum number of open loans
    #[error("User has reached maximum borrowing limit! (limit {limit})")]
    BorrowingLimitReached {
        /// Configured `max_books_per_user`
        limit: u32,
    },

    /// Borrower account is not active
    #[error("User account is not active!")]
    BorrowerInactive,

    /// Books are only issued to members
    #[error("Books can only be issued to library members!")]
    NotAMember,

    /// Record was already closed
    #[error("This book has already been returned!")]
    AlreadyReturned,

    /// Quantity edit would leave fewer copies than are on loan
    #[error("Cannot reduce quantity below borrowed books count! ({borrowed} on loan, {requested} requested)")]
    QuantityBelowBorrowed {
        /// Copies on loan
        borrowed: u32,
        /// Requested quantity
        requested: u32,
    },

    /// Book cannot be deleted while copies are out
    #[error("Cannot delete book with active borrowings!")]
    BookOnLoan,

    /// Book has borrowing records and cannot be deleted
    #[error("Cannot delete book with borrowing history!")]
    BookHasHistory,

    /// Member already has a pending hold on this book
    #[error("You already have a pending reservation for this book!")]
    DuplicateReservation,

    /// Only pending reservations can be cancelled
    #[error("Only pending reservations can be cancelled!")]
    ReservationNotPending,

    /// Author still referenced by books
    #[error("Cannot delete author with existing books!")]
    AuthorHasBooks,

    /// Category still referenced by books
    #[error("Cannot delete category with existing books!")]
    CategoryHasBooks,

    /// Unique field already taken
    #[error("{entity} with this {field} already exists!")]
    Duplicate {
        /// Entity kind
        entity: &'static str,
        /// Offending field
        field: &'static str,
    },

    /// Only a super admin may create or edit a super admin
    #[error("Only a super admin can manage super admin accounts!")]
    SuperAdminProtected,
}

impl Rejection {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BookUnavailable => "BOOK_UNAVAILABLE",
            Self::BorrowingLimitReached { .. } => "BORROWING_LIMIT_REACHED",
            Self::BorrowerInactive => "BORROWER_INACTIVE",
            Self::NotAMember => "NOT_A_MEMBER",
            Self::AlreadyReturned => "ALREADY_RETURNED",
            Self::QuantityBelowBorrowed { .. } => "QUANTITY_BELOW_BORROWED",
            Self::BookOnLoan => "BOOK_ON_LOAN",
            Self::BookHasHistory => "BOOK_HAS_HISTORY",
            Self::DuplicateReservation => "DUPLICATE_RESERVATION",
            Self::ReservationNotPending => "RESERVATION_NOT_PENDING",
            Self::AuthorHasBooks => "AUTHOR_HAS_BOOKS",
            Self::CategoryHasBooks => "CATEGORY_HAS_BOOKS",
            Self::Duplicate { .. } => "DUPLICATE",
            Self::SuperAdminProtected => "SUPER_ADMIN_PROTECTED",
        }
    }
}

/// Storage failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// Unique constraint hit
    #[error("duplicate value violates {constraint}")]
    Duplicate {
        /// Constraint name reported by the store
        constraint: String,
    },

    /// Row still referenced elsewhere
    #[error("row is still referenced ({constraint})")]
    InUse {
        /// Constraint name reported by the store
        constraint: String,
    },

    /// Referenced row does not exist
    #[error("referenced row does not exist ({constraint})")]
    MissingReference {
        /// Constraint name reported by the store
        constraint: String,
    },

    /// Store unreachable or query failed
    #[error("database error: {0}")]
    Database(String),

    /// Stored data could not be decoded
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result of any ledger, catalog or directory operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Input failed validation before anything was read or written
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier as given
        id: String,
    },

    /// Actor lacks the role the operation needs
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A business rule refused the operation
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Storage failed
    #[error(transparent)]
    Persistence(PersistenceError),
}

impl LedgerError {
    /// Shorthand for [`LedgerError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Label used for the rejection metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Rejected(rejection) => rejection.code(),
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}

impl From<PersistenceError> for LedgerError {
    /// Constraint violations the schema enforces map back onto the rule they
    /// back up; anything else stays a storage failure.
    fn from(error: PersistenceError) -> Self {
        let rejection = match &error {
            PersistenceError::Duplicate { constraint } => match constraint.as_str() {
                "users_username_key" => Some(Rejection::Duplicate {
                    entity: "User",
                    field: "username",
                }),
                "users_email_key" => Some(Rejection::Duplicate {
                    entity: "User",
                    field: "email",
                }),
                "books_isbn_key" => Some(Rejection::Duplicate {
                    entity: "Book",
                    field: "ISBN",
                }),
                "categories_name_key" => Some(Rejection::Duplicate {
                    entity: "Category",
                    field: "name",
                }),
                "idx_reservations_one_pending" => Some(Rejection::DuplicateReservation),
                _ => None,
            },
            PersistenceError::InUse { constraint } => match constraint.as_str() {
                "books_author_id_fkey" => Some(Rejection::AuthorHasBooks),
                "books_category_id_fkey" => Some(Rejection::CategoryHasBooks),
                "borrowings_book_id_fkey" => Some(Rejection::BookHasHistory),
                _ => None,
            },
            PersistenceError::MissingReference { constraint } => match constraint.as_str() {
                "books_author_id_fkey" => {
                    return Self::Validation("author does not exist".to_string());
                }
                "books_category_id_fkey" => {
                    return Self::Validation("category does not exist".to_string());
                }
                _ => None,
            },
            PersistenceError::Database(_) | PersistenceError::Corrupt(_) => None,
        };
        rejection.map_or(Self::Persistence(error), Self::Rejected)
    }
}

impl From<SettingsError> for LedgerError {
    fn from(error: SettingsError) -> Self {
        Self::Validation(error.to_string())
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_carry_stable_codes() {
        assert_eq!(Rejection::BookUnavailable.code(), "BOOK_UNAVAILABLE");
        assert_eq!(
            Rejection::BorrowingLimitReached { limit: 5 }.code(),
            "BORROWING_LIMIT_REACHED"
        );
        assert_eq!(Rejection::AlreadyReturned.code(), "ALREADY_RETURNED");
        assert_eq!(
            LedgerError::from(Rejection::QuantityBelowBorrowed {
                borrowed: 2,
                requested: 1
            })
            .kind(),
            "QUANTITY_BELOW_BORROWED"
        );
    }

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(
            LedgerError::from(Rejection::AlreadyReturned).to_string(),
            "This book has already been returned!"
        );
        assert_eq!(
            LedgerError::not_found("book", 42).to_string(),
            "book 42 not found"
        );
    }

    #[test]
    fn constraint_violations_map_to_rejections() {
        let taken: LedgerError = PersistenceError::Duplicate {
            constraint: "users_email_key".into(),
        }
        .into();
        assert_eq!(taken.to_string(), "User with this email already exists!");

        let in_use: LedgerError = PersistenceError::InUse {
            constraint: "books_category_id_fkey".into(),
        }
        .into();
        assert_eq!(in_use, LedgerError::Rejected(Rejection::CategoryHasBooks));

        let lent: LedgerError = PersistenceError::InUse {
            constraint: "borrowings_book_id_fkey".into(),
        }
        .into();
        assert_eq!(lent, LedgerError::Rejected(Rejection::BookHasHistory));

        let missing: LedgerError = PersistenceError::MissingReference {
            constraint: "books_author_id_fkey".into(),
        }
        .into();
        assert_eq!(missing.kind(), "VALIDATION_ERROR");

        let other: LedgerError = PersistenceError::Database("connection reset".into()).into();
        assert_eq!(other.kind(), "PERSISTENCE_ERROR");
    }

    #[test]
    fn settings_errors_become_validation_errors() {
        let error: LedgerError = SettingsError::UnknownKey("x".into()).into();
        assert_eq!(error.kind(), "VALIDATION_ERROR");
    }
}
