//! Activity log table.

use super::db_error;
use super::rows::ActivityRow;
use crate::activity::{ActivityFilter, ActivityLog, NewActivity};
use crate::error::PersistenceError;
use crate::types::{ActivityId, ActivityLogEntry};
use async_trait::async_trait;
use chrono::{Days, Utc};
use sqlx::PgPool;

/// Activity log stored in the `activity_log` table.
///
/// Appends use the pool directly, outside any circulation transaction.
#[derive(Clone, Debug)]
pub struct PostgresActivityLog {
    pool: PgPool,
}

impl PostgresActivityLog {
    /// Create a log over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLog for PostgresActivityLog {
    #[tracing::instrument(skip(self, entry), fields(action = %entry.action))]
    async fn append(&self, entry: NewActivity) -> Result<ActivityLogEntry, PersistenceError> {
        let stored = entry.into_entry(ActivityId::new(), Utc::now());
        sqlx::query(
            "INSERT INTO activity_log \
                 (id, user_id, action, entity_type, entity_id, description, ip_address, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(stored.id.as_uuid())
        .bind(stored.user_id.map(|u| *u.as_uuid()))
        .bind(&stored.action)
        .bind(&stored.entity_type)
        .bind(stored.entity_id)
        .bind(&stored.description)
        .bind(&stored.ip_address)
        .bind(stored.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("append activity", &e))?;
        Ok(stored)
    }

    async fn list(&self, filter: &ActivityFilter) -> Result<Vec<ActivityLogEntry>, PersistenceError> {
        // Date bounds are inclusive calendar days; compare against the next
        // midnight for the upper bound.
        let until = filter.date_to.and_then(|d| d.checked_add_days(Days::new(1)));
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT id, user_id, action, entity_type, entity_id, description, ip_address, created_at \
             FROM activity_log \
             WHERE ($1::TEXT IS NULL OR action = $1) \
               AND ($2::UUID IS NULL OR user_id = $2) \
               AND ($3::DATE IS NULL OR created_at >= $3::DATE) \
               AND ($4::DATE IS NULL OR created_at < $4::DATE) \
             ORDER BY created_at DESC, id \
             LIMIT $5",
        )
        .bind(&filter.action)
        .bind(filter.user_id.map(|u| *u.as_uuid()))
        .bind(filter.date_from)
        .bind(until)
        .bind(i64::from(filter.effective_limit()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list activity", &e))?;
        Ok(rows.into_iter().map(ActivityLogEntry::from).collect())
    }
}
