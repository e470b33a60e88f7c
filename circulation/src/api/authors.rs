//! Author endpoints (staff).

use crate::catalog::{AuthorDraft, AuthorListing};
use crate::server::{AppState, auth::Actor};
use crate::types::{Author, AuthorId};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use libris_web::WebResult;

/// All authors with book counts.
///
/// # Errors
///
/// 403 below staff.
pub async fn list_authors(
    State(state): State<AppState>,
    Actor(ctx): Actor,
) -> WebResult<Json<Vec<AuthorListing>>> {
    Ok(Json(state.library.authors(&ctx).await?))
}

/// Add an author.
///
/// # Errors
///
/// 422 for a missing name.
pub async fn create_author(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    payload: Result<Json<AuthorDraft>, JsonRejection>,
) -> WebResult<(StatusCode, Json<Author>)> {
    let Json(draft) = payload?;
    let author = state.library.add_author(&ctx, draft).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

/// Replace an author.
///
/// # Errors
///
/// 404 for an unknown author.
pub async fn update_author(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<AuthorId>,
    payload: Result<Json<AuthorDraft>, JsonRejection>,
) -> WebResult<Json<Author>> {
    let Json(draft) = payload?;
    Ok(Json(state.library.update_author(&ctx, id, draft).await?))
}

/// Delete an author.
///
/// # Errors
///
/// 409 `AUTHOR_HAS_BOOKS` while books reference the author.
pub async fn delete_author(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<AuthorId>,
) -> WebResult<StatusCode> {
    state.library.remove_author(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
