//! Logging setup with a reloadable filter and daily log files.
//!
//! - Console and file output, timestamps in the local timezone
//! - `LoggingConfig::set_filter` changes the filter at runtime
//! - Rolled files older than [`LOG_RETENTION_DAYS`] are deleted once a day

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::utils::fs::ensure_dir_all_sync_with_op;
use crate::{Error, Result};

pub const DEFAULT_LOG_FILTER: &str = "media_fetch=info,media_sources=info,sqlx=warn";

/// Daily files are named `<prefix>.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "media-fetch.log";

pub const LOG_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

pub struct LoggingConfig {
    handle: FilterHandle,
    log_dir: PathBuf,
}

impl LoggingConfig {
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Replace the active filter, e.g. `media_fetch=debug,sqlx=warn`.
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let filter = EnvFilter::try_new(directive)
            .map_err(|e| Error::validation(format!("Invalid filter directive: {e}")))?;
        self.handle
            .reload(filter)
            .map_err(|e| Error::Other(format!("Failed to reload filter: {e}")))?;
        info!(directive, "Log filter updated");
        Ok(())
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Delete old log files once a day until cancelled.
    pub async fn run_retention(self: Arc<Self>, cancel_token: CancellationToken) -> Result<()> {
        let interval = Duration::from_secs(24 * 60 * 60);
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Log retention task stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = cleanup_old_logs(&self.log_dir, LOG_RETENTION_DAYS, Local::now().date_naive()).await {
                        warn!(error = %e, "Failed to clean up old logs");
                    }
                }
            }
        }
    }
}

/// Delete `<prefix>.YYYY-MM-DD` files dated more than `retention_days`
/// before `today`. Returns the number of files deleted.
pub async fn cleanup_old_logs(log_dir: &Path, retention_days: i64, today: NaiveDate) -> Result<usize> {
    let cutoff = today - chrono::Duration::days(retention_days);
    let mut entries = tokio::fs::read_dir(log_dir)
        .await
        .map_err(|e| Error::io_path("reading log directory", log_dir, e))?;

    let mut deleted = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_path("reading log directory", log_dir, e))?
    {
        let path = entry.path();
        let Some(date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(LOG_FILE_PREFIX))
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };

        if date < cutoff {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    deleted += 1;
                    debug!(path = %path.display(), "Deleted old log file");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete old log file"),
            }
        }
    }

    if deleted > 0 {
        info!(count = deleted, "Cleaned up old log files");
    }
    Ok(deleted)
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(log_dir: &Path, json_output: bool) -> Result<(Arc<LoggingConfig>, WorkerGuard)> {
    ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let initial_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, handle) = reload::Layer::new(initial_filter);

    let (text_file, json_file) = if json_output {
        (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_timer(LocalTimer),
            ),
        )
    } else {
        (
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_timer(LocalTimer),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(text_file)
        .with(json_file)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to set global default subscriber: {e}")))?;

    let config = Arc::new(LoggingConfig {
        handle,
        log_dir: log_dir.to_path_buf(),
    });
    debug!(log_dir = %log_dir.display(), "Logging initialized");
    Ok((config, guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("media_fetch=info"));
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_only_removes_old_dated_logs() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        for name in [
            "media-fetch.log.2026-01-01",
            "media-fetch.log.2026-01-09",
            "media-fetch.log.garbage",
            "other.log.2025-01-01",
        ] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let today = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let deleted = cleanup_old_logs(dir, 7, today).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(!dir.join("media-fetch.log.2026-01-01").exists());
        assert!(dir.join("media-fetch.log.2026-01-09").exists());
        assert!(dir.join("media-fetch.log.garbage").exists());
        assert!(dir.join("other.log.2025-01-01").exists());
    }
}
