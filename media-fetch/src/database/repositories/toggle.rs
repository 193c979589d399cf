//! Feature toggle store (SQLx).

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::info;

use crate::Result;
use crate::database::models::ModuleToggleDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::router::ToggleStore;

/// SQLx-backed toggle store. Modules without a row are enabled.
pub struct SqlxToggleStore {
    pool: SqlitePool,
}

impl SqlxToggleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<ModuleToggleDbModel>> {
        let rows = sqlx::query_as::<_, ModuleToggleDbModel>(
            "SELECT * FROM module_toggle ORDER BY module_key",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ToggleStore for SqlxToggleStore {
    async fn get(&self, module_key: &str) -> Result<bool> {
        let enabled: Option<(bool,)> =
            sqlx::query_as("SELECT enabled FROM module_toggle WHERE module_key = ?")
                .bind(module_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(enabled.is_none_or(|(enabled,)| enabled))
    }

    async fn set(&self, module_key: &str, enabled: bool) -> Result<()> {
        retry_on_sqlite_busy("module_toggle_set", || async {
            sqlx::query(
                r#"
                INSERT INTO module_toggle (module_key, enabled, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT (module_key) DO UPDATE SET
                    enabled = excluded.enabled,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(module_key)
            .bind(enabled)
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;

        info!(module_key, enabled, "Module toggle updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{init_pool, run_migrations};

    #[tokio::test]
    async fn test_toggle_defaults_to_enabled() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = SqlxToggleStore::new(pool);

        assert!(store.get("youtube").await.unwrap());

        store.set("youtube", false).await.unwrap();
        assert!(!store.get("youtube").await.unwrap());

        store.set("youtube", true).await.unwrap();
        assert!(store.get("youtube").await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
