//! `PostgreSQL` backend.
//!
//! All statements are parameterized (`sqlx::query(..).bind(..)`). Circulation
//! commands run in one transaction that locks the rows they decide on with
//! `SELECT ... FOR UPDATE` (loan record, then book, then user) before the
//! reducer sees them.
//!
//! # Example
//!
//! ```no_run
//! use libris_circulation::store::PostgresLibrary;
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgres://localhost/libris").await?;
//! let library = PostgresLibrary::new(pool);
//! # Ok(())
//! # }
//! ```

mod activity;
mod catalog;
mod ledger;
mod queries;
mod rows;
mod settings;
mod users;

pub use activity::PostgresActivityLog;

use crate::error::PersistenceError;
use libris_postgres::{ConstraintViolation, constraint_violation};
use sqlx::PgPool;

/// Library stored in `PostgreSQL`.
#[derive(Clone, Debug)]
pub struct PostgresLibrary {
    /// Connection pool.
    pool: PgPool,
}

impl PostgresLibrary {
    /// Create a backend over an existing pool (migrations already applied).
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a failed statement to a [`PersistenceError`].
///
/// `context` names what was being done, for the generic case.
pub(crate) fn db_error(context: &str, error: &sqlx::Error) -> PersistenceError {
    match constraint_violation(error) {
        Some((ConstraintViolation::Unique, constraint)) => PersistenceError::Duplicate {
            constraint: constraint.unwrap_or_default(),
        },
        Some((ConstraintViolation::ForeignKey, constraint)) => PersistenceError::MissingReference {
            constraint: constraint.unwrap_or_default(),
        },
        Some((ConstraintViolation::Check, constraint)) => PersistenceError::Database(format!(
            "{context}: check constraint {} violated",
            constraint.unwrap_or_default()
        )),
        None => PersistenceError::Database(format!("{context}: {error}")),
    }
}

/// Like [`db_error`], but a foreign key violation on delete means the row
/// is still referenced.
pub(crate) fn delete_error(context: &str, error: &sqlx::Error) -> PersistenceError {
    match db_error(context, error) {
        PersistenceError::MissingReference { constraint } => PersistenceError::InUse { constraint },
        other => other,
    }
}
