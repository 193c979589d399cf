//! Two-tier result cache.
//!
//! The persistent tier maps (requester, locator, kind) to the artifact
//! reference handed out by the delivery surface and lives indefinitely.
//! The ephemeral tier maps a locator to freshly fetched files on disk, is
//! shared by every requester and lives for a short TTL.

pub mod ephemeral;

use std::path::PathBuf;
use std::sync::Arc;

use media_sources::MediaKind;
use tracing::debug;

use crate::Result;
use crate::database::models::{MediaCacheRecord, MediaCacheUpsert};
use crate::database::repositories::MediaCacheRepository;
use crate::database::time::now_ms;
use crate::domain::RequesterId;
use crate::downloader::UsableFile;
use crate::utils::fs::remove_dir_all_tolerant;

pub use ephemeral::{EphemeralCache, EphemeralCacheConfig, EphemeralHit};

#[derive(Clone)]
pub struct ResultCache {
    persistent: Arc<dyn MediaCacheRepository>,
    ephemeral: Arc<EphemeralCache>,
}

impl ResultCache {
    pub fn new(persistent: Arc<dyn MediaCacheRepository>, ephemeral: Arc<EphemeralCache>) -> Self {
        Self {
            persistent,
            ephemeral,
        }
    }

    pub fn ephemeral(&self) -> &Arc<EphemeralCache> {
        &self.ephemeral
    }

    pub fn persistent(&self) -> &Arc<dyn MediaCacheRepository> {
        &self.persistent
    }

    pub async fn lookup_reference(
        &self,
        requester: RequesterId,
        locator: &str,
        kind: MediaKind,
    ) -> Result<Option<MediaCacheRecord>> {
        self.persistent.get(requester, locator, kind).await
    }

    /// Record a delivery. A second delivery for the same key overwrites the
    /// reference and last-used time.
    pub async fn record_delivery(
        &self,
        requester: RequesterId,
        locator: &str,
        kind: MediaKind,
        artifact_ref: &str,
        title: Option<&str>,
    ) -> Result<()> {
        self.persistent
            .upsert(&MediaCacheUpsert {
                requester,
                locator,
                kind,
                artifact_ref,
                title,
                used_at: now_ms(),
            })
            .await
    }

    pub async fn mark_redelivered(&self, record: &MediaCacheRecord) -> Result<bool> {
        self.persistent.touch(record.id, now_ms()).await
    }

    /// Drop a reference the delivery surface no longer honors.
    pub async fn forget(&self, record: &MediaCacheRecord) -> Result<()> {
        debug!(id = record.id, locator = %record.locator, "Forgetting stale artifact reference");
        self.persistent.delete(record.id).await
    }

    pub fn lookup_files(&self, locator: &str, kind: MediaKind) -> Option<EphemeralHit> {
        self.ephemeral.lookup(locator, kind)
    }

    /// Hand a successful fetch's work directory to the ephemeral tier, or
    /// delete it right away when that tier is disabled.
    pub async fn retain_files(
        &self,
        locator: &str,
        kind: MediaKind,
        work_dir: PathBuf,
        files: Vec<UsableFile>,
        title: Option<String>,
    ) -> Result<()> {
        if self.ephemeral.is_enabled() {
            self.ephemeral.insert(locator, kind, work_dir, files, title);
            return Ok(());
        }
        remove_dir_all_tolerant(&work_dir).await?;
        Ok(())
    }
}
