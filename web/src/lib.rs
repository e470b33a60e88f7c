//! Axum integration for the Libris circulation service.
//!
//! The circulation crate owns routing and handlers; this crate holds the
//! HTTP plumbing every handler shares:
//!
//! - [`AppError`]: the single error type handlers return, rendered as a JSON
//!   body with a stable machine-readable `code`
//! - Extractors for the correlation id and client address
//! - The correlation-id middleware layer
//! - Liveness and readiness handlers
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at an Axum handler
//! 2. **Extract** the request context (actor, client address) and the JSON body
//! 3. **Call** a circulation service, which runs the reducer in a transaction
//! 4. **Map** the outcome, or the typed rejection, to an HTTP response

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{ClientIp, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
