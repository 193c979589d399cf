//! Ephemeral tier: recently fetched files on disk, shared by all requesters.
//!
//! Entries are keyed by canonical locator only. An entry is valid while its
//! age is below the TTL and its work directory still exists. The sweep is the
//! only code path that deletes directories; lookups that find a dead entry
//! hand its directory to the sweep through a pending queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use media_sources::MediaKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::downloader::UsableFile;
use crate::utils::fs::remove_dir_all_tolerant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralCacheConfig {
    pub enabled: bool,
    /// Entry lifetime (default: 300s).
    pub ttl: Duration,
    /// Interval between sweeps (default: 60s).
    pub sweep_interval: Duration,
}

impl Default for EphemeralCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Files reusable without running the fetch engine.
#[derive(Debug, Clone)]
pub struct EphemeralHit {
    pub work_dir: PathBuf,
    pub files: Vec<UsableFile>,
    pub title: Option<String>,
}

struct CacheEntry {
    work_dir: PathBuf,
    files: Vec<UsableFile>,
    kind: MediaKind,
    title: Option<String>,
    created_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

pub struct EphemeralCache {
    entries: DashMap<String, CacheEntry>,
    /// Directories of evicted entries, deleted by the next sweep.
    pending: Mutex<Vec<PathBuf>>,
    config: EphemeralCacheConfig,
}

impl EphemeralCache {
    pub fn new(config: EphemeralCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            pending: Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &EphemeralCacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `locator`. Expired entries and entries whose directory has
    /// vanished are evicted and reported as a miss.
    pub fn lookup(&self, locator: &str, kind: MediaKind) -> Option<EphemeralHit> {
        if !self.config.enabled {
            return None;
        }

        let entry = self.entries.get(locator)?;
        let alive = !entry.is_expired(self.config.ttl) && entry.work_dir.is_dir();
        if !alive {
            drop(entry); // Release the shard lock before removing
            if let Some((_, dead)) = self.entries.remove(locator) {
                debug!(locator, work_dir = %dead.work_dir.display(), "Evicting dead ephemeral entry");
                self.pending.lock().push(dead.work_dir);
            }
            return None;
        }

        if entry.kind != kind {
            return None;
        }

        Some(EphemeralHit {
            work_dir: entry.work_dir.clone(),
            files: entry.files.clone(),
            title: entry.title.clone(),
        })
    }

    /// Take ownership of a successful fetch's work directory.
    pub fn insert(
        &self,
        locator: &str,
        kind: MediaKind,
        work_dir: PathBuf,
        files: Vec<UsableFile>,
        title: Option<String>,
    ) {
        let entry = CacheEntry {
            work_dir,
            files,
            kind,
            title,
            created_at: Instant::now(),
        };
        let new_dir = entry.work_dir.clone();
        if let Some(old) = self.entries.insert(locator.to_string(), entry)
            && old.work_dir != new_dir
        {
            self.pending.lock().push(old.work_dir);
        }
    }

    /// Whether `dir` belongs to a live entry.
    pub fn owns(&self, dir: &Path) -> bool {
        self.entries.iter().any(|e| e.work_dir == dir)
    }

    /// Evict expired entries and delete every pending directory.
    /// Returns the number of directories actually removed.
    pub async fn sweep(&self) -> usize {
        let ttl = self.config.ttl;
        let mut doomed = std::mem::take(&mut *self.pending.lock());
        self.entries.retain(|_, entry| {
            if entry.is_expired(ttl) {
                doomed.push(entry.work_dir.clone());
                false
            } else {
                true
            }
        });

        let mut removed = 0;
        for dir in doomed {
            match remove_dir_all_tolerant(&dir).await {
                Ok(true) => removed += 1,
                Ok(false) => debug!(dir = %dir.display(), "Ephemeral directory already gone"),
                Err(e) => warn!(error = %e, "Failed to remove ephemeral directory"),
            }
        }
        if removed > 0 {
            info!(removed, remaining = self.entries.len(), "Ephemeral cache swept");
        }
        removed
    }

    /// Sweep on the configured interval until cancelled.
    pub async fn run_sweeper(self: Arc<Self>, cancel_token: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    // Final sweep so expired directories do not outlive the process.
                    self.sweep().await;
                    debug!("Ephemeral cache sweeper stopped");
                    return Ok(());
                }
                _ = interval.tick() => {
                    self.sweep().await;
                }
            }
        }
    }
}
