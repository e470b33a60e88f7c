//! User directory endpoints, plus the per-member ledger views.

use crate::directory::{UserDraft, UserFilter};
use crate::fines::FineSummary;
use crate::server::{AppState, auth::Actor};
use crate::types::{BorrowingRecord, Reservation, User, UserId};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use libris_web::WebResult;

/// Users matching the filter (admin).
///
/// # Errors
///
/// 403 below admin.
pub async fn list_users(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Query(filter): Query<UserFilter>,
) -> WebResult<Json<Vec<User>>> {
    Ok(Json(state.library.users(&ctx, &filter).await?))
}

/// Register a user (admin).
///
/// # Errors
///
/// 422 for invalid fields, 409 `DUPLICATE` for a taken username or email,
/// 409 `SUPER_ADMIN_PROTECTED` when an admin assigns the super admin role.
pub async fn create_user(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    payload: Result<Json<UserDraft>, JsonRejection>,
) -> WebResult<(StatusCode, Json<User>)> {
    let Json(draft) = payload?;
    let user = state.library.add_user(&ctx, draft).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// One user (admin).
///
/// # Errors
///
/// 404 for an unknown user.
pub async fn get_user(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<UserId>,
) -> WebResult<Json<User>> {
    Ok(Json(state.library.user(&ctx, id).await?))
}

/// Replace a user (admin).
///
/// # Errors
///
/// As for [`create_user`], plus 404.
pub async fn update_user(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<UserId>,
    payload: Result<Json<UserDraft>, JsonRejection>,
) -> WebResult<Json<User>> {
    let Json(draft) = payload?;
    Ok(Json(state.library.update_user(&ctx, id, draft).await?))
}

/// A member's borrowing records (staff or self).
///
/// # Errors
///
/// 403 for another member's records.
pub async fn user_borrowings(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<UserId>,
) -> WebResult<Json<Vec<BorrowingRecord>>> {
    Ok(Json(state.library.user_borrowings(&ctx, id).await?))
}

/// Total fines charged to a member (staff or self).
///
/// # Errors
///
/// 403 for another member's fines.
pub async fn user_fines(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<UserId>,
) -> WebResult<Json<FineSummary>> {
    Ok(Json(state.library.user_fines(&ctx, id).await?))
}

/// A member's reservations (staff or self).
///
/// # Errors
///
/// 403 for another member's reservations.
pub async fn user_reservations(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<UserId>,
) -> WebResult<Json<Vec<Reservation>>> {
    Ok(Json(state.library.user_reservations(&ctx, id).await?))
}
