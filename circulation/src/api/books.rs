//! Catalog endpoints for books.

use crate::catalog::{BookDraft, BookSearch};
use crate::server::{AppState, auth::Actor};
use crate::services::ConsistencyReport;
use crate::types::{Book, BookId};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use libris_web::WebResult;

/// Search the catalog by title, ISBN or author name.
///
/// # Errors
///
/// Storage failures only.
pub async fn list_books(
    State(state): State<AppState>,
    Actor(_): Actor,
    Query(search): Query<BookSearch>,
) -> WebResult<Json<Vec<Book>>> {
    Ok(Json(state.library.books(&search).await?))
}

/// Add a book.
///
/// # Errors
///
/// 422 for invalid fields, 409 `DUPLICATE` for a taken ISBN, 403 below staff.
pub async fn create_book(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    payload: Result<Json<BookDraft>, JsonRejection>,
) -> WebResult<(StatusCode, Json<Book>)> {
    let Json(draft) = payload?;
    let book = state.library.add_book(&ctx, draft).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// One book.
///
/// # Errors
///
/// 404 for an unknown book.
pub async fn get_book(
    State(state): State<AppState>,
    Actor(_): Actor,
    Path(id): Path<BookId>,
) -> WebResult<Json<Book>> {
    Ok(Json(state.library.book(id).await?))
}

/// Replace a book's fields.
///
/// # Errors
///
/// 409 `QUANTITY_BELOW_BORROWED` when fewer copies would remain than are on loan.
pub async fn update_book(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<BookId>,
    payload: Result<Json<BookDraft>, JsonRejection>,
) -> WebResult<Json<Book>> {
    let Json(draft) = payload?;
    Ok(Json(state.library.update_book(&ctx, id, draft).await?))
}

/// Delete a book.
///
/// # Errors
///
/// 409 `BOOK_ON_LOAN` while copies are out, `BOOK_HAS_HISTORY` once it has been lent.
pub async fn delete_book(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<BookId>,
) -> WebResult<StatusCode> {
    state.library.remove_book(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Compare the stored availability counter with open loans.
///
/// # Errors
///
/// 404 for an unknown book, 403 below staff.
pub async fn book_consistency(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<BookId>,
) -> WebResult<Json<ConsistencyReport>> {
    Ok(Json(state.library.book_consistency(&ctx, id).await?))
}
