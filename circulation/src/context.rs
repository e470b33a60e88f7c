//! Who is performing an operation.

use crate::error::LedgerError;
use crate::types::{Role, UserId};
use std::net::IpAddr;

/// Explicit request context passed to every ledger and service operation.
///
/// Built by the HTTP layer from the authenticated actor; internal callers
/// (bootstrap, tests) use [`RequestContext::system`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    /// Acting user; `None` for system operations
    pub actor: Option<UserId>,
    /// Role of the acting user
    pub role: Role,
    /// Source address of the request
    pub source_addr: Option<IpAddr>,
}

impl RequestContext {
    /// Context for an authenticated user.
    #[must_use]
    pub const fn new(actor: UserId, role: Role, source_addr: Option<IpAddr>) -> Self {
        Self {
            actor: Some(actor),
            role,
            source_addr,
        }
    }

    /// Context for internal operations; carries super admin rights and no actor.
    #[must_use]
    pub const fn system() -> Self {
        Self {
            actor: None,
            role: Role::SuperAdmin,
            source_addr: None,
        }
    }

    /// Ensure the actor holds at least `minimum`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] when the role is too low.
    pub fn require(&self, minimum: Role) -> Result<(), LedgerError> {
        if self.role >= minimum {
            Ok(())
        } else {
            Err(LedgerError::Forbidden(format!(
                "{minimum} role required, actor is {}",
                self.role
            )))
        }
    }

    /// Staff may see anyone; members only themselves.
    #[must_use]
    pub fn can_view_user(&self, user_id: UserId) -> bool {
        self.role.is_staff() || self.actor == Some(user_id)
    }

    /// Like [`can_view_user`](Self::can_view_user) but as a `Result`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] for members looking at other members.
    pub fn require_self_or_staff(&self, user_id: UserId) -> Result<(), LedgerError> {
        if self.can_view_user(user_id) {
            Ok(())
        } else {
            Err(LedgerError::Forbidden(
                "members may only access their own records".to_string(),
            ))
        }
    }

    /// Source address rendered for the activity log.
    #[must_use]
    pub fn source(&self) -> Option<String> {
        self.source_addr.map(|addr| addr.to_string())
    }
}
