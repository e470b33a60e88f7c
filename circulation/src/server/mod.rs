//! HTTP server for the circulation service.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - Actor resolution from the `X-Actor-Id` header
//! - Router configuration

pub mod auth;
pub mod state;

pub use state::AppState;

use crate::api::{activity, authors, books, borrowings, categories, reports, reservations, settings, users};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use libris_runtime::HealthReport;
use libris_web::{correlation_id_layer, handlers};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// `/health` and `/ready` are public; everything under `/api` resolves the
/// actor first.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Borrowing ledger
        .route(
            "/borrowings",
            post(borrowings::issue_book).get(borrowings::list_borrowings),
        )
        .route("/borrowings/:id", get(borrowings::get_borrowing))
        .route("/borrowings/:id/return", post(borrowings::return_book))
        // Catalog
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/books/:id/consistency", get(books::book_consistency))
        .route(
            "/authors",
            get(authors::list_authors).post(authors::create_author),
        )
        .route(
            "/authors/:id",
            put(authors::update_author).delete(authors::delete_author),
        )
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/:id",
            put(categories::update_category).delete(categories::delete_category),
        )
        // User directory
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/:id", get(users::get_user).put(users::update_user))
        .route("/users/:id/borrowings", get(users::user_borrowings))
        .route("/users/:id/fines", get(users::user_fines))
        .route("/users/:id/reservations", get(users::user_reservations))
        // Settings
        .route("/settings", get(settings::get_settings))
        .route("/settings/:key", put(settings::update_setting))
        // Reservations
        .route("/reservations", post(reservations::create_reservation))
        .route(
            "/reservations/:id/cancel",
            post(reservations::cancel_reservation),
        )
        // Audit trail and reports
        .route("/activity", get(activity::list_activity))
        .route("/reports/summary", get(reports::summary))
        .route("/reports/overdue", get(reports::overdue));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}

/// Readiness: storage reachable and effect runner accepting work.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    handlers::readiness(state.library.health().await)
}
