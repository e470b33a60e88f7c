//! Settings table.

use super::{PostgresLibrary, db_error};
use crate::error::PersistenceError;
use crate::settings::{LibrarySettings, SettingKey, SettingValue};
use crate::store::SettingsStore;
use async_trait::async_trait;
use sqlx::PgConnection;

/// Typed settings read through `conn` (pool connection or open transaction).
pub(super) async fn load_settings(conn: &mut PgConnection) -> Result<LibrarySettings, PersistenceError> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
        .fetch_all(conn)
        .await
        .map_err(|e| db_error("load settings", &e))?;
    Ok(LibrarySettings::from_pairs(
        rows.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    ))
}

#[async_trait]
impl SettingsStore for PostgresLibrary {
    async fn load(&self) -> Result<LibrarySettings, PersistenceError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| db_error("acquire connection", &e))?;
        load_settings(&mut *conn).await
    }

    async fn get(&self, key: SettingKey) -> Result<Option<String>, PersistenceError> {
        sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("read setting", &e))
    }

    #[tracing::instrument(skip(self), fields(key = %key))]
    async fn set(&self, key: SettingKey, value: SettingValue) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO settings (key, value, description, updated_at) VALUES ($1, $2, $3, now()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(key.as_str())
        .bind(value.to_string())
        .bind(key.description())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("write setting", &e))?;
        Ok(())
    }
}
