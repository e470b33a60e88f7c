//! Borrowing endpoints:
//! - POST /api/borrowings - issue a book (staff)
//! - POST /api/borrowings/:id/return - return a book (staff)
//! - GET /api/borrowings - list records (staff)
//! - GET /api/borrowings/:id - one record (staff or borrower)

use crate::server::{AppState, auth::Actor};
use crate::services::ReturnReceipt;
use crate::store::BorrowingFilter;
use crate::types::{BookId, BorrowingId, BorrowingRecord, UserId};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::NaiveDate;
use libris_web::WebResult;
use serde::Deserialize;

/// Request to issue a book.
#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    /// Book to lend
    pub book_id: BookId,
    /// Borrower
    pub user_id: UserId,
    /// Loan period override in days
    pub period_days: Option<u32>,
}

/// Request to return a book.
#[derive(Debug, Default, Deserialize)]
pub struct ReturnRequest {
    /// Day of return; today when omitted
    pub return_date: Option<NaiveDate>,
}

/// Issue a book.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/borrowings \
///   -H "X-Actor-Id: <staff id>" \
///   -H "Content-Type: application/json" \
///   -d '{"book_id": "<book id>", "user_id": "<member id>"}'
/// ```
///
/// # Errors
///
/// 409 with `BOOK_UNAVAILABLE`, `BORROWING_LIMIT_REACHED`, `BORROWER_INACTIVE`
/// or `NOT_A_MEMBER` when a rule refuses the loan.
pub async fn issue_book(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    payload: Result<Json<IssueRequest>, JsonRejection>,
) -> WebResult<(StatusCode, Json<BorrowingRecord>)> {
    let Json(request) = payload?;
    let record = state
        .library
        .issue_book(&ctx, request.book_id, request.user_id, request.period_days)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Return a book; the body is optional.
///
/// # Errors
///
/// 409 with `ALREADY_RETURNED` for a closed record; 422 for a return date
/// before the borrow date.
pub async fn return_book(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<BorrowingId>,
    payload: Option<Json<ReturnRequest>>,
) -> WebResult<Json<ReturnReceipt>> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let receipt = state
        .library
        .return_book(&ctx, id, request.return_date)
        .await?;
    Ok(Json(receipt))
}

/// List records with filters.
///
/// # Errors
///
/// 403 below staff.
pub async fn list_borrowings(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Query(filter): Query<BorrowingFilter>,
) -> WebResult<Json<Vec<BorrowingRecord>>> {
    Ok(Json(state.library.borrowings(&ctx, &filter).await?))
}

/// One record.
///
/// # Errors
///
/// 404 for an unknown record; 403 for another member's record.
pub async fn get_borrowing(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<BorrowingId>,
) -> WebResult<Json<BorrowingRecord>> {
    Ok(Json(state.library.borrowing(&ctx, id).await?))
}
