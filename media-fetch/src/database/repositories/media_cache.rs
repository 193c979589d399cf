//! Persistent result cache repository.

use async_trait::async_trait;
use media_sources::MediaKind;
use sqlx::SqlitePool;
use tracing::debug;

use crate::Result;
use crate::database::models::{MediaCacheRecord, MediaCacheUpsert};
use crate::database::retry::retry_on_sqlite_busy;
use crate::domain::RequesterId;

/// Persistent tier of the result cache.
#[async_trait]
pub trait MediaCacheRepository: Send + Sync {
    async fn get(
        &self,
        requester: RequesterId,
        locator: &str,
        kind: MediaKind,
    ) -> Result<Option<MediaCacheRecord>>;

    /// Atomic insert-or-update keyed by (requester, locator, kind).
    async fn upsert(&self, record: &MediaCacheUpsert<'_>) -> Result<()>;

    /// Bump `last_used_at` of an existing record. Returns false if it is gone.
    async fn touch(&self, id: i64, used_at: i64) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Delete records not used since `cutoff_ms`. Returns the number removed.
    async fn purge_unused_before(&self, cutoff_ms: i64) -> Result<u64>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxMediaCacheRepository {
    pool: SqlitePool,
}

impl SqlxMediaCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaCacheRepository for SqlxMediaCacheRepository {
    async fn get(
        &self,
        requester: RequesterId,
        locator: &str,
        kind: MediaKind,
    ) -> Result<Option<MediaCacheRecord>> {
        let record = sqlx::query_as::<_, MediaCacheRecord>(
            r#"
            SELECT * FROM media_cache
            WHERE requester_id = ? AND locator = ? AND media_kind = ?
            "#,
        )
        .bind(requester.get())
        .bind(locator)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert(&self, record: &MediaCacheUpsert<'_>) -> Result<()> {
        retry_on_sqlite_busy("media_cache_upsert", || async {
            sqlx::query(
                r#"
                INSERT INTO media_cache
                    (requester_id, locator, media_kind, artifact_ref, title, created_at, last_used_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (requester_id, locator, media_kind) DO UPDATE SET
                    artifact_ref = excluded.artifact_ref,
                    title = COALESCE(excluded.title, media_cache.title),
                    last_used_at = excluded.last_used_at
                "#,
            )
            .bind(record.requester.get())
            .bind(record.locator)
            .bind(record.kind.as_str())
            .bind(record.artifact_ref)
            .bind(record.title)
            .bind(record.used_at)
            .bind(record.used_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;

        debug!(
            requester = %record.requester,
            locator = record.locator,
            kind = %record.kind,
            "Persistent cache record upserted"
        );
        Ok(())
    }

    async fn touch(&self, id: i64, used_at: i64) -> Result<bool> {
        let result = retry_on_sqlite_busy("media_cache_touch", || async {
            Ok(
                sqlx::query("UPDATE media_cache SET last_used_at = ? WHERE id = ?")
                    .bind(used_at)
                    .bind(id)
                    .execute(&self.pool)
                    .await?,
            )
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM media_cache WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_unused_before(&self, cutoff_ms: i64) -> Result<u64> {
        let result = retry_on_sqlite_busy("media_cache_purge", || async {
            Ok(sqlx::query("DELETE FROM media_cache WHERE last_used_at < ?")
                .bind(cutoff_ms)
                .execute(&self.pool)
                .await?)
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{init_pool, run_migrations};

    async fn setup_test_db() -> SqlitePool {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn upsert<'a>(artifact_ref: &'a str, used_at: i64) -> MediaCacheUpsert<'a> {
        MediaCacheUpsert {
            requester: RequesterId::new(1),
            locator: "https://vimeo.com/1",
            kind: MediaKind::Video,
            artifact_ref,
            title: Some("clip"),
            used_at,
        }
    }

    #[tokio::test]
    async fn test_get_missing() {
        let repo = SqlxMediaCacheRepository::new(setup_test_db().await);
        let found = repo
            .get(RequesterId::new(1), "https://vimeo.com/1", MediaKind::Video)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_key_includes_kind_and_requester() {
        let repo = SqlxMediaCacheRepository::new(setup_test_db().await);
        repo.upsert(&upsert("ref-1", 1_000)).await.unwrap();

        let other_kind = repo
            .get(RequesterId::new(1), "https://vimeo.com/1", MediaKind::Audio)
            .await
            .unwrap();
        assert!(other_kind.is_none());

        let other_requester = repo
            .get(RequesterId::new(2), "https://vimeo.com/1", MediaKind::Video)
            .await
            .unwrap();
        assert!(other_requester.is_none());
    }

    #[tokio::test]
    async fn test_touch_and_purge() {
        let repo = SqlxMediaCacheRepository::new(setup_test_db().await);
        repo.upsert(&upsert("ref-1", 1_000)).await.unwrap();
        let record = repo
            .get(RequesterId::new(1), "https://vimeo.com/1", MediaKind::Video)
            .await
            .unwrap()
            .unwrap();

        assert!(repo.touch(record.id, 5_000).await.unwrap());
        assert_eq!(repo.purge_unused_before(4_000).await.unwrap(), 0);
        assert_eq!(repo.purge_unused_before(6_000).await.unwrap(), 1);
        assert_eq!(repo.count().await.unwrap(), 0);
        assert!(!repo.touch(record.id, 7_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_reference_and_timestamp() {
        let repo = SqlxMediaCacheRepository::new(setup_test_db().await);
        repo.upsert(&upsert("ref-1", 1_000)).await.unwrap();
        repo.upsert(&MediaCacheUpsert {
            title: None,
            ..upsert("ref-2", 2_000)
        })
        .await
        .unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        let record = repo
            .get(RequesterId::new(1), "https://vimeo.com/1", MediaKind::Video)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.artifact_ref, "ref-2");
        assert_eq!(record.last_used_at, 2_000);
        assert_eq!(record.created_at, 1_000);
        assert_eq!(record.title.as_deref(), Some("clip"));
    }

    #[tokio::test]
    async fn test_concurrent_upserts_leave_one_row() {
        let temp = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", temp.path().join("cache.db").display());
        let pool = init_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = SqlxMediaCacheRepository::new(pool);

        let first = upsert("ref-a", 1_000);
        let second = upsert("ref-b", 1_001);
        let (a, b) = tokio::join!(repo.upsert(&first), repo.upsert(&second));
        a.unwrap();
        b.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        let record = repo
            .get(RequesterId::new(1), "https://vimeo.com/1", MediaKind::Video)
            .await
            .unwrap()
            .unwrap();
        assert!(["ref-a", "ref-b"].contains(&record.artifact_ref.as_str()));
    }
}
