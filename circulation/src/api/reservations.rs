//! Reservation endpoints.

use crate::server::{AppState, auth::Actor};
use crate::types::{BookId, Reservation, ReservationId, UserId};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use libris_web::{AppError, WebResult};
use serde::Deserialize;

/// Request to place a hold.
#[derive(Debug, Deserialize)]
pub struct ReservationRequest {
    /// Book to hold
    pub book_id: BookId,
    /// Member the hold is for; the actor when omitted
    pub user_id: Option<UserId>,
}

/// Place a hold.
///
/// # Errors
///
/// 409 `DUPLICATE_RESERVATION` for a second live hold on the same book.
pub async fn create_reservation(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    payload: Result<Json<ReservationRequest>, JsonRejection>,
) -> WebResult<(StatusCode, Json<Reservation>)> {
    let Json(request) = payload?;
    let user_id = request
        .user_id
        .or(ctx.actor)
        .ok_or_else(|| AppError::validation("user_id is required"))?;
    let reservation = state
        .library
        .place_reservation(&ctx, request.book_id, user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Cancel a pending hold.
///
/// # Errors
///
/// 409 `RESERVATION_NOT_PENDING` once the hold is no longer pending.
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<ReservationId>,
) -> WebResult<Json<Reservation>> {
    Ok(Json(state.library.cancel_reservation(&ctx, id).await?))
}
