//! Category endpoints (staff).

use crate::catalog::{CategoryDraft, CategoryListing};
use crate::server::{AppState, auth::Actor};
use crate::types::{Category, CategoryId};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use libris_web::WebResult;

/// All categories with book counts.
///
/// # Errors
///
/// 403 below staff.
pub async fn list_categories(
    State(state): State<AppState>,
    Actor(ctx): Actor,
) -> WebResult<Json<Vec<CategoryListing>>> {
    Ok(Json(state.library.categories(&ctx).await?))
}

/// Add a category.
///
/// # Errors
///
/// 409 `DUPLICATE` for a taken name.
pub async fn create_category(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    payload: Result<Json<CategoryDraft>, JsonRejection>,
) -> WebResult<(StatusCode, Json<Category>)> {
    let Json(draft) = payload?;
    let category = state.library.add_category(&ctx, draft).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// Replace a category.
///
/// # Errors
///
/// 404 for an unknown category.
pub async fn update_category(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<CategoryId>,
    payload: Result<Json<CategoryDraft>, JsonRejection>,
) -> WebResult<Json<Category>> {
    let Json(draft) = payload?;
    Ok(Json(state.library.update_category(&ctx, id, draft).await?))
}

/// Delete a category.
///
/// # Errors
///
/// 409 `CATEGORY_HAS_BOOKS` while books reference the category.
pub async fn delete_category(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<CategoryId>,
) -> WebResult<StatusCode> {
    state.library.remove_category(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
