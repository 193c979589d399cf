//! Credential store repository (SQLx).
//!
//! Database-backed persistence for the credentials subsystem.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::Result;
use crate::credentials::{CredentialScope, CredentialStore};
use crate::database::models::CredentialDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;

pub struct SqlxCredentialStore {
    pool: SqlitePool,
}

impl SqlxCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqlxCredentialStore {
    async fn get(&self, scope: CredentialScope, source_key: &str) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, CredentialDbModel>(
            "SELECT * FROM credential WHERE scope = ? AND source_key = ?",
        )
        .bind(scope.as_db_key())
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.blob))
    }

    async fn set(&self, scope: CredentialScope, source_key: &str, blob: &str) -> Result<()> {
        let scope_key = scope.as_db_key();
        retry_on_sqlite_busy("credential_set", || async {
            sqlx::query(
                r#"
                INSERT INTO credential (scope, source_key, blob, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (scope, source_key) DO UPDATE SET
                    blob = excluded.blob,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&scope_key)
            .bind(source_key)
            .bind(blob)
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;

        debug!(%scope, source_key, "Credentials stored");
        Ok(())
    }

    async fn remove(&self, scope: CredentialScope, source_key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credential WHERE scope = ? AND source_key = ?")
            .bind(scope.as_db_key())
            .bind(source_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
