//! User directory.

use super::rows::{USER_COLUMNS, UserRow, convert_all, to_u64};
use super::{PostgresLibrary, db_error};
use crate::directory::UserFilter;
use crate::error::PersistenceError;
use crate::store::UserDirectory;
use crate::types::{User, UserId};
use async_trait::async_trait;

#[async_trait]
impl UserDirectory for PostgresLibrary {
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    async fn insert_user(&self, user: &User) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO users (id, username, email, full_name, phone, address, role, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert user", &e))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    async fn update_user(&self, user: &User) -> Result<bool, PersistenceError> {
        let result = sqlx::query(
            "UPDATE users SET username = $2, email = $3, full_name = $4, phone = $5, \
                 address = $6, role = $7, status = $8, updated_at = now() \
             WHERE id = $1",
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update user", &e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, PersistenceError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("load user", &e))?
            .map(User::try_from)
            .transpose()
    }

    async fn users(&self, filter: &UserFilter) -> Result<Vec<User>, PersistenceError> {
        let pattern = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q.to_lowercase()));
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u \
             WHERE ($1::TEXT IS NULL OR u.role = $1) \
               AND ($2::TEXT IS NULL OR u.status = $2) \
               AND ($3::TEXT IS NULL \
                    OR LOWER(u.username) LIKE $3 \
                    OR LOWER(u.email) LIKE $3 \
                    OR LOWER(u.full_name) LIKE $3) \
             ORDER BY u.username"
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(filter.role.map(|r| r.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list users", &e))?;
        convert_all(rows)
    }

    async fn user_count(&self) -> Result<u64, PersistenceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("count users", &e))?;
        Ok(to_u64(count))
    }
}
