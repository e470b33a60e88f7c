//! JSON API handlers.
//!
//! Every handler takes the [`Actor`](crate::server::auth::Actor), calls one
//! [`Library`](crate::services::Library) operation and renders the outcome.
//! Ledger errors map onto [`AppError`] here so each kind keeps a stable
//! HTTP status and code.

pub mod activity;
pub mod authors;
pub mod books;
pub mod borrowings;
pub mod categories;
pub mod reports;
pub mod reservations;
pub mod settings;
pub mod users;

use crate::error::{LedgerError, PersistenceError};
use libris_web::AppError;

impl From<LedgerError> for AppError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Validation(message) => Self::validation(message),
            LedgerError::NotFound { entity, id } => Self::not_found(entity, id),
            LedgerError::Forbidden(message) => Self::forbidden(message),
            LedgerError::Rejected(rejection) => {
                Self::rejected(rejection.code(), rejection.to_string())
            },
            LedgerError::Persistence(cause @ PersistenceError::Corrupt(_)) => {
                Self::internal("Stored data could not be read").with_source(cause.into())
            },
            LedgerError::Persistence(cause) => {
                Self::unavailable("Storage is unavailable, please retry").with_source(cause.into())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Rejection;
    use axum::http::StatusCode;

    #[test]
    fn rejections_keep_their_codes() {
        let error = AppError::from(LedgerError::Rejected(Rejection::BorrowingLimitReached {
            limit: 5,
        }));
        assert_eq!(error.status(), StatusCode::CONFLICT);
        assert_eq!(error.code(), "BORROWING_LIMIT_REACHED");
    }

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(
            AppError::from(LedgerError::Validation("bad".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(LedgerError::not_found("book", "x")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(LedgerError::Forbidden("no".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(LedgerError::Persistence(PersistenceError::Database(
                "down".into()
            )))
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
