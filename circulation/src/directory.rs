//! User directory input types and rules.

use crate::context::RequestContext;
use crate::error::{LedgerError, Rejection};
use crate::types::{Role, User, UserId, UserStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User fields as submitted on create or full update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDraft {
    /// Unique login name
    pub username: String,
    /// Unique email address
    pub email: String,
    /// Full name
    pub full_name: String,
    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Postal address
    #[serde(default)]
    pub address: Option<String>,
    /// Role
    pub role: Role,
    /// Account status
    #[serde(default = "default_status")]
    pub status: UserStatus,
}

const fn default_status() -> UserStatus {
    UserStatus::Active
}

impl UserDraft {
    /// Validate fields and check the actor may assign this role.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Validation`] for malformed fields,
    /// [`Rejection::SuperAdminProtected`] when a non super admin assigns the
    /// super admin role.
    pub fn validate(&self, ctx: &RequestContext) -> Result<(), LedgerError> {
        let username = self.username.trim();
        if username.len() < 3 || username.contains(char::is_whitespace) {
            return Err(LedgerError::Validation(
                "Username must be at least 3 characters without spaces".to_string(),
            ));
        }
        if !is_plausible_email(self.email.trim()) {
            return Err(LedgerError::Validation("Invalid email address".to_string()));
        }
        if self.full_name.trim().is_empty() {
            return Err(LedgerError::Validation("Full name is required".to_string()));
        }
        if self.role == Role::SuperAdmin && ctx.role != Role::SuperAdmin {
            return Err(Rejection::SuperAdminProtected.into());
        }
        Ok(())
    }

    /// Build a new user.
    #[must_use]
    pub fn into_user(self, id: UserId, created_at: DateTime<Utc>) -> User {
        User {
            id,
            username: self.username.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            full_name: self.full_name.trim().to_string(),
            phone: self.phone.filter(|p| !p.trim().is_empty()),
            address: self.address.filter(|a| !a.trim().is_empty()),
            role: self.role,
            status: self.status,
            created_at,
        }
    }
}

/// Whether `ctx` may edit `existing`.
///
/// # Errors
///
/// [`Rejection::SuperAdminProtected`] when a non super admin edits a super admin.
pub fn ensure_can_edit(ctx: &RequestContext, existing: &User) -> Result<(), LedgerError> {
    if existing.role == Role::SuperAdmin && ctx.role != Role::SuperAdmin {
        return Err(Rejection::SuperAdminProtected.into());
    }
    Ok(())
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

/// Query over the user directory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct UserFilter {
    /// Restrict to one role
    pub role: Option<Role>,
    /// Restrict to one status
    pub status: Option<UserStatus>,
    /// Case-insensitive match on username, email or full name
    pub q: Option<String>,
}

impl UserFilter {
    /// In-memory match.
    #[must_use]
    pub fn matches(&self, user: &User) -> bool {
        if self.role.is_some_and(|r| user.role != r) {
            return false;
        }
        if self.status.is_some_and(|s| user.status != s) {
            return false;
        }
        match self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            None => true,
            Some(q) => {
                let q = q.to_lowercase();
                user.username.to_lowercase().contains(&q)
                    || user.email.to_lowercase().contains(&q)
                    || user.full_name.to_lowercase().contains(&q)
            },
        }
    }
}
