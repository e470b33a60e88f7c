//! # Libris Circulation
//!
//! Library management service: book catalog, user directory, the borrowing
//! ledger with fines and availability accounting, reservations, settings,
//! an audit trail and reports, served as a JSON API.
//!
//! ## Layers
//!
//! - [`ledger`]: the circulation reducer. Issue, return, book edits and
//!   reservations are decided here, as pure functions over a state snapshot.
//! - [`store`]: storage traits with in-memory and `PostgreSQL` backends. A
//!   backend loads and locks the rows a command needs, runs the reducer and
//!   persists the resulting event in one transaction.
//! - [`services`]: the [`Library`] façade. Dispatches commands, runs
//!   the post-commit effects (activity log appends) and checks roles.
//! - [`api`] and [`server`]: the Axum router and handlers.
//!
//! ## Example
//!
//! ```ignore
//! use libris_circulation::{Library, context::RequestContext};
//! use libris_core::environment::SystemClock;
//!
//! let library = Library::in_memory(Arc::new(SystemClock));
//! let record = library.issue_book(&staff, book_id, member_id, None).await?;
//! let receipt = library.return_book(&staff, record.id, None).await?;
//! println!("fine: {}", receipt.record.fine_amount);
//! ```

pub mod activity;
pub mod api;
pub mod catalog;
pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod fines;
pub mod ledger;
pub mod metrics;
pub mod reports;
pub mod server;
pub mod services;
pub mod settings;
pub mod store;
pub mod types;

pub use config::Config;
pub use context::RequestContext;
pub use error::{LedgerError, LedgerResult, PersistenceError, Rejection};
pub use services::Library;
