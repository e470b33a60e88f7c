//! Reports (admin).

use crate::reports::{LibrarySummary, OverdueLoan};
use crate::server::{AppState, auth::Actor};
use axum::{Json, extract::State};
use libris_web::WebResult;

/// Ledger totals and the most borrowed titles.
///
/// # Errors
///
/// 403 below admin.
pub async fn summary(
    State(state): State<AppState>,
    Actor(ctx): Actor,
) -> WebResult<Json<LibrarySummary>> {
    Ok(Json(state.library.summary(&ctx).await?))
}

/// Open loans past due, most overdue first.
///
/// # Errors
///
/// 403 below admin.
pub async fn overdue(
    State(state): State<AppState>,
    Actor(ctx): Actor,
) -> WebResult<Json<Vec<OverdueLoan>>> {
    Ok(Json(state.library.overdue_report(&ctx).await?))
}
