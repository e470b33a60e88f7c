//! Append-only audit trail.
//!
//! Every mutating operation schedules one append as an independent effect.
//! Appends are best effort: a failure is logged and counted, never
//! propagated to the operation that caused it.

use crate::context::RequestContext;
use crate::error::PersistenceError;
use crate::types::{ActivityId, ActivityLogEntry, UserId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default number of entries returned by [`ActivityLog::list`].
pub const DEFAULT_ACTIVITY_LIMIT: u32 = 100;
/// Upper bound for [`ActivityFilter::limit`].
pub const MAX_ACTIVITY_LIMIT: u32 = 1000;

/// Action codes written to the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum ActivityAction {
    IssueBook,
    ReturnBook,
    AddBook,
    UpdateBook,
    DeleteBook,
    AddAuthor,
    UpdateAuthor,
    DeleteAuthor,
    AddCategory,
    UpdateCategory,
    DeleteCategory,
    AddUser,
    UpdateUser,
    UpdateSettings,
    ReserveBook,
    CancelReservation,
}

impl ActivityAction {
    /// Code stored in the `action` column.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::IssueBook => "ISSUE_BOOK",
            Self::ReturnBook => "RETURN_BOOK",
            Self::AddBook => "ADD_BOOK",
            Self::UpdateBook => "UPDATE_BOOK",
            Self::DeleteBook => "DELETE_BOOK",
            Self::AddAuthor => "ADD_AUTHOR",
            Self::UpdateAuthor => "UPDATE_AUTHOR",
            Self::DeleteAuthor => "DELETE_AUTHOR",
            Self::AddCategory => "ADD_CATEGORY",
            Self::UpdateCategory => "UPDATE_CATEGORY",
            Self::DeleteCategory => "DELETE_CATEGORY",
            Self::AddUser => "ADD_USER",
            Self::UpdateUser => "UPDATE_USER",
            Self::UpdateSettings => "UPDATE_SETTINGS",
            Self::ReserveBook => "RESERVE_BOOK",
            Self::CancelReservation => "CANCEL_RESERVATION",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An entry about to be appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewActivity {
    /// Acting user
    pub actor: Option<UserId>,
    /// What happened
    pub action: ActivityAction,
    /// Kind of entity touched
    pub entity_type: Option<&'static str>,
    /// Identifier of the entity touched
    pub entity_id: Option<Uuid>,
    /// Free text
    pub description: String,
    /// Source address
    pub ip_address: Option<String>,
}

impl NewActivity {
    /// Entry attributed to the actor in `ctx`.
    pub fn new(ctx: &RequestContext, action: ActivityAction, description: impl Into<String>) -> Self {
        Self {
            actor: ctx.actor,
            action,
            entity_type: None,
            entity_id: None,
            description: description.into(),
            ip_address: ctx.source(),
        }
    }

    /// Attach the entity the action touched.
    #[must_use]
    pub const fn on(mut self, entity_type: &'static str, entity_id: Uuid) -> Self {
        self.entity_type = Some(entity_type);
        self.entity_id = Some(entity_id);
        self
    }

    /// Materialize into a stored entry.
    #[must_use]
    pub fn into_entry(self, id: ActivityId, created_at: DateTime<Utc>) -> ActivityLogEntry {
        ActivityLogEntry {
            id,
            user_id: self.actor,
            action: self.action.code().to_string(),
            entity_type: self.entity_type.map(str::to_string),
            entity_id: self.entity_id,
            description: self.description,
            ip_address: self.ip_address,
            created_at,
        }
    }
}

/// Query over the activity log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ActivityFilter {
    /// Exact action code
    pub action: Option<String>,
    /// Acting user
    pub user_id: Option<UserId>,
    /// First day included
    pub date_from: Option<NaiveDate>,
    /// Last day included
    pub date_to: Option<NaiveDate>,
    /// Maximum entries returned
    pub limit: Option<u32>,
}

impl ActivityFilter {
    /// Requested limit clamped to `1..=MAX_ACTIVITY_LIMIT`.
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
            .clamp(1, MAX_ACTIVITY_LIMIT)
    }

    /// Whether `entry` passes every condition except the limit.
    #[must_use]
    pub fn matches(&self, entry: &ActivityLogEntry) -> bool {
        let day = entry.created_at.date_naive();
        self.action.as_deref().is_none_or(|a| entry.action == a)
            && self.user_id.is_none_or(|u| entry.user_id == Some(u))
            && self.date_from.is_none_or(|from| day >= from)
            && self.date_to.is_none_or(|to| day <= to)
    }
}

/// Sink and query interface for the audit trail.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// Append one entry.
    async fn append(&self, entry: NewActivity) -> Result<ActivityLogEntry, PersistenceError>;

    /// Entries matching `filter`, newest first.
    async fn list(&self, filter: &ActivityFilter) -> Result<Vec<ActivityLogEntry>, PersistenceError>;
}

/// Activity log kept in process memory.
#[derive(Clone, Default)]
pub struct InMemoryActivityLog {
    entries: Arc<RwLock<Vec<ActivityLogEntry>>>,
}

impl InMemoryActivityLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing was logged yet.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ActivityLog for InMemoryActivityLog {
    async fn append(&self, entry: NewActivity) -> Result<ActivityLogEntry, PersistenceError> {
        let stored = entry.into_entry(ActivityId::new(), Utc::now());
        self.entries.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, filter: &ActivityFilter) -> Result<Vec<ActivityLogEntry>, PersistenceError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(filter.effective_limit() as usize)
            .cloned()
            .collect())
    }
}

/// Append `entry`, logging and counting a failure instead of returning it.
pub async fn record(log: Arc<dyn ActivityLog>, entry: NewActivity) {
    let action = entry.action;
    if let Err(error) = log.append(entry).await {
        tracing::warn!(%action, %error, "Failed to append activity log entry");
        metrics::counter!(crate::metrics::ACTIVITY_LOG_FAILURES, "action" => action.code())
            .increment(1);
    }
}
