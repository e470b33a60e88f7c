//! Settings endpoints.

use crate::server::{AppState, auth::Actor};
use crate::settings::LibrarySettings;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use libris_web::WebResult;
use serde::Deserialize;

/// New value for one setting.
#[derive(Debug, Deserialize)]
pub struct SettingUpdate {
    /// Raw value, validated per key
    pub value: String,
}

/// Current library policy.
///
/// # Errors
///
/// Storage failures only.
pub async fn get_settings(
    State(state): State<AppState>,
    Actor(_): Actor,
) -> WebResult<Json<LibrarySettings>> {
    Ok(Json(state.library.settings().await?))
}

/// Change one setting (super admin).
///
/// # Errors
///
/// 422 for an unknown key or an invalid value, 403 below super admin.
pub async fn update_setting(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(key): Path<String>,
    payload: Result<Json<SettingUpdate>, JsonRejection>,
) -> WebResult<Json<LibrarySettings>> {
    let Json(update) = payload?;
    Ok(Json(
        state.library.update_setting(&ctx, &key, &update.value).await?,
    ))
}
