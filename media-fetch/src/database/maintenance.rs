//! Database maintenance.
//!
//! Purges persistent cache records that have not been used within the
//! retention window, then lets SQLite refresh its query planner statistics.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::Result;
use crate::database::DbPool;
use crate::database::repositories::MediaCacheRepository;
use crate::database::time::ms_ago;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Interval between maintenance runs (default: 24 hours).
    pub interval: Duration,
    /// Persistent cache records unused for longer than this are purged
    /// (default: 90 days).
    pub retention: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            retention: Duration::from_secs(90 * 24 * 60 * 60),
        }
    }
}

pub struct MaintenanceScheduler {
    pool: DbPool,
    media_cache: Arc<dyn MediaCacheRepository>,
    config: MaintenanceConfig,
}

impl MaintenanceScheduler {
    pub fn new(
        pool: DbPool,
        media_cache: Arc<dyn MediaCacheRepository>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            pool,
            media_cache,
            config,
        }
    }

    /// Run maintenance on the configured interval until cancelled.
    pub async fn run(self: Arc<Self>, cancel_token: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Maintenance scheduler stopped");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_maintenance().await {
                        error!(error = %e, "Database maintenance failed");
                    }
                }
            }
        }
    }

    /// Run all maintenance tasks once. Returns the number of purged records.
    pub async fn run_maintenance(&self) -> Result<u64> {
        let cutoff = ms_ago(self.config.retention);
        let purged = self.media_cache.purge_unused_before(cutoff).await?;
        if purged > 0 {
            info!(purged, "Purged unused persistent cache records");
        }

        sqlx::query("PRAGMA optimize").execute(&self.pool).await?;
        debug!("Database maintenance completed");
        Ok(purged)
    }
}
