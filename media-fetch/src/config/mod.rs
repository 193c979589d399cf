//! Application configuration.
//!
//! Every component config carries its own defaults; [`AppConfig`] aggregates
//! them and overlays `MEDIA_FETCH_*` environment variables. Blank or
//! unparsable values are ignored and the default is kept.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::admission::{AdmissionConfig, AdmissionMode};
use crate::cache::EphemeralCacheConfig;
use crate::database::MaintenanceConfig;
use crate::domain::RequesterId;
use crate::downloader::{EscalatorConfig, YtDlpEngineConfig};
use crate::notification::{DiagnosticsConfig, WebhookAuth, WebhookConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// sqlx SQLite URL (default: `sqlite:media-fetch.db?mode=rwc`).
    pub database_url: String,
    pub log_dir: PathBuf,
    /// Write the log file as JSON lines instead of text.
    pub log_json: bool,
    /// Root of the local delivery outbox.
    pub outbox_dir: PathBuf,
    pub ytdlp: YtDlpEngineConfig,
    pub admission: AdmissionConfig,
    pub escalator: EscalatorConfig,
    pub ephemeral: EphemeralCacheConfig,
    pub diagnostics: DiagnosticsConfig,
    pub maintenance: MaintenanceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:media-fetch.db?mode=rwc".to_string(),
            log_dir: PathBuf::from("logs"),
            log_json: false,
            outbox_dir: PathBuf::from("outbox"),
            ytdlp: YtDlpEngineConfig::default(),
            admission: AdmissionConfig::default(),
            escalator: EscalatorConfig::default(),
            ephemeral: EphemeralCacheConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `MEDIA_FETCH_DATABASE_URL`, `MEDIA_FETCH_LOG_DIR`, `MEDIA_FETCH_LOG_JSON`
    /// - `MEDIA_FETCH_OUTBOX_DIR`, `MEDIA_FETCH_WORK_DIR`, `MEDIA_FETCH_YTDLP_PATH`
    /// - `MEDIA_FETCH_PER_REQUESTER_LIMIT`, `MEDIA_FETCH_GLOBAL_LIMIT`,
    ///   `MEDIA_FETCH_ADMISSION_MODE`, `MEDIA_FETCH_PRIVILEGED` (comma separated ids)
    /// - `MEDIA_FETCH_FETCH_TIMEOUT_SECS`, `MEDIA_FETCH_MAX_FILESIZE_BYTES`
    /// - `MEDIA_FETCH_EPHEMERAL_CACHE`, `MEDIA_FETCH_EPHEMERAL_TTL_SECS`
    /// - `MEDIA_FETCH_WEBHOOK_URL`, `MEDIA_FETCH_WEBHOOK_TOKEN`
    /// - `MEDIA_FETCH_CACHE_RETENTION_DAYS`
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = var("MEDIA_FETCH_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(dir) = var("MEDIA_FETCH_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(json) = var("MEDIA_FETCH_LOG_JSON")
            && let Some(parsed) = parse_bool(&json)
        {
            config.log_json = parsed;
        }
        if let Some(dir) = var("MEDIA_FETCH_OUTBOX_DIR") {
            config.outbox_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("MEDIA_FETCH_WORK_DIR") {
            config.escalator.work_root = PathBuf::from(dir);
        }
        if let Some(path) = var("MEDIA_FETCH_YTDLP_PATH") {
            config.ytdlp.binary_path = path;
        }

        if let Some(limit) = var("MEDIA_FETCH_PER_REQUESTER_LIMIT")
            && let Some(parsed) = parse_positive(&limit)
        {
            config.admission.per_requester_limit = parsed;
        }
        if let Some(limit) = var("MEDIA_FETCH_GLOBAL_LIMIT")
            && let Some(parsed) = parse_positive(&limit)
        {
            config.admission.global_limit = parsed;
        }
        if let Some(mode) = var("MEDIA_FETCH_ADMISSION_MODE") {
            match AdmissionMode::from_str(&mode) {
                Ok(parsed) => config.admission.mode = parsed,
                Err(e) => warn!(error = %e, "Ignoring MEDIA_FETCH_ADMISSION_MODE"),
            }
        }
        if let Some(ids) = var("MEDIA_FETCH_PRIVILEGED") {
            config.admission.privileged = ids
                .split(',')
                .filter(|id| !id.trim().is_empty())
                .filter_map(|id| id.parse::<RequesterId>().ok())
                .collect();
        }

        if let Some(secs) = var("MEDIA_FETCH_FETCH_TIMEOUT_SECS")
            && let Ok(parsed) = secs.trim().parse::<u64>()
            && parsed > 0
        {
            config.escalator.timeout = Duration::from_secs(parsed);
        }
        if let Some(bytes) = var("MEDIA_FETCH_MAX_FILESIZE_BYTES")
            && let Ok(parsed) = bytes.trim().parse::<u64>()
            && parsed > 0
        {
            config.escalator.max_filesize = parsed;
        }

        if let Some(enabled) = var("MEDIA_FETCH_EPHEMERAL_CACHE")
            && let Some(parsed) = parse_bool(&enabled)
        {
            config.ephemeral.enabled = parsed;
        }
        if let Some(secs) = var("MEDIA_FETCH_EPHEMERAL_TTL_SECS")
            && let Ok(parsed) = secs.trim().parse::<u64>()
            && parsed > 0
        {
            config.ephemeral.ttl = Duration::from_secs(parsed);
        }

        if let Some(url) = var("MEDIA_FETCH_WEBHOOK_URL") {
            let mut webhook = WebhookConfig::new(url);
            if let Some(token) = var("MEDIA_FETCH_WEBHOOK_TOKEN") {
                webhook.auth = Some(WebhookAuth::Bearer { token });
            }
            config.diagnostics.webhook = Some(webhook);
        }

        if let Some(days) = var("MEDIA_FETCH_CACHE_RETENTION_DAYS")
            && let Ok(parsed) = days.trim().parse::<u64>()
            && parsed > 0
        {
            config.maintenance.retention = Duration::from_secs(parsed * 24 * 60 * 60);
        }

        config
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_positive(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|n| *n > 0)
}
