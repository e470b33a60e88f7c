//! Activity log query (super admin).

use crate::activity::ActivityFilter;
use crate::server::{AppState, auth::Actor};
use crate::types::ActivityLogEntry;
use axum::{
    Json,
    extract::{Query, State},
};
use libris_web::WebResult;

/// Entries matching the filter, newest first.
///
/// # Errors
///
/// 403 below super admin.
pub async fn list_activity(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Query(filter): Query<ActivityFilter>,
) -> WebResult<Json<Vec<ActivityLogEntry>>> {
    Ok(Json(state.library.activity(&ctx, &filter).await?))
}
