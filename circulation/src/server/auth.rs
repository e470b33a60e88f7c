//! Actor resolution.
//!
//! Identity is asserted by the fronting proxy in the `X-Actor-Id` header.
//! The actor is loaded from the user directory and must be active; the
//! resulting [`RequestContext`] carries their role and source address.

use super::state::AppState;
use crate::context::RequestContext;
use crate::error::LedgerError;
use crate::types::UserId;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use libris_web::{AppError, ClientIp, CorrelationId};

/// Header carrying the acting user's id.
pub const ACTOR_HEADER: &str = "X-Actor-Id";

/// The authenticated actor of a request.
#[derive(Clone, Debug)]
pub struct Actor(pub RequestContext);

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("Missing {ACTOR_HEADER} header")))?;
        let actor: UserId = header
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .ok_or_else(|| AppError::unauthorized(format!("Malformed {ACTOR_HEADER} header")))?;

        let Ok(ClientIp(source)) = ClientIp::from_request_parts(parts, state).await;
        let Ok(CorrelationId(correlation_id)) = CorrelationId::from_request_parts(parts, state).await;

        match state.library.authenticate(actor, Some(source)).await {
            Ok(ctx) => {
                tracing::debug!(%actor, role = %ctx.role, %source, %correlation_id, "Actor resolved");
                Ok(Self(ctx))
            },
            Err(LedgerError::NotFound { .. }) => {
                tracing::debug!(%actor, %correlation_id, "Unknown actor");
                Err(AppError::unauthorized("Unknown actor"))
            },
            Err(error) => Err(error.into()),
        }
    }
}
