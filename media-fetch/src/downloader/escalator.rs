//! Retry escalator.
//!
//! Runs the fetch engine through the ordered attempts of a
//! [`StrategyProfile`], from the rich configuration to the conservative one,
//! inside a fresh work directory and under one wall-clock timeout.
//!
//! On success the work directory is handed to the caller, who owns its
//! deletion. On failure or timeout the escalator removes it.

use media_sources::{Locator, StrategyProfile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::classify::ErrorClassification;
use super::engine::{FetchEngine, FetchMetadata, FetchRequest};
use super::output::{CREDENTIAL_FILE_NAME, UsableFile, clear_work_dir, usable_files};
use crate::credentials::CredentialSource;
use crate::utils::fs::{ensure_dir_all, remove_dir_all_tolerant, remove_file_tolerant};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalatorConfig {
    /// Parent of all per-fetch work directories.
    pub work_root: PathBuf,
    /// Bound on the whole attempt sequence (default: 120s).
    pub timeout: Duration,
    /// Upper bound on produced file size (default: 50 MiB).
    pub max_filesize: u64,
}

impl Default for EscalatorConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("media-fetch"),
            timeout: Duration::from_secs(120),
            max_filesize: 50 * 1024 * 1024,
        }
    }
}

/// What to run: the attempt profile plus optional credential material.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub profile: StrategyProfile,
    pub credential: Option<CredentialSource>,
}

impl FetchPlan {
    pub fn new(profile: StrategyProfile) -> Self {
        Self {
            profile,
            credential: None,
        }
    }

    pub fn with_credential(&self, credential: CredentialSource) -> Self {
        Self {
            profile: self.profile.clone(),
            credential: Some(credential),
        }
    }

    pub fn degraded(&self) -> Self {
        Self {
            profile: self.profile.degraded(),
            credential: self.credential.clone(),
        }
    }
}

/// Why an escalation produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    Classified {
        classification: ErrorClassification,
        message: String,
    },
    Timeout {
        after: Duration,
    },
    NoUsableOutput,
}

impl FetchFailure {
    pub fn classification(&self) -> ErrorClassification {
        match self {
            Self::Classified { classification, .. } => *classification,
            Self::Timeout { .. } => ErrorClassification::Timeout,
            Self::NoUsableOutput => ErrorClassification::Unknown,
        }
    }

    fn from_captured(message: Option<String>) -> Self {
        match message {
            Some(message) => Self::Classified {
                classification: ErrorClassification::classify(&message),
                message,
            },
            None => Self::NoUsableOutput,
        }
    }
}

impl From<FetchFailure> for Error {
    fn from(failure: FetchFailure) -> Self {
        match failure {
            FetchFailure::Classified {
                classification,
                message,
            } => Error::Fetch {
                classification,
                detail: message,
            },
            FetchFailure::Timeout { after } => Error::Timeout(after),
            FetchFailure::NoUsableOutput => Error::NoUsableOutput,
        }
    }
}

/// Result of [`RetryEscalator::execute`].
#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub files: Vec<UsableFile>,
    pub work_dir: PathBuf,
    pub error: Option<FetchFailure>,
    pub metadata: FetchMetadata,
    /// Number of engine invocations made.
    pub attempts: usize,
}

impl EscalationOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

enum AttemptsResult {
    Success {
        files: Vec<UsableFile>,
        metadata: FetchMetadata,
        attempts: usize,
    },
    Failed {
        last_error: Option<String>,
        metadata: FetchMetadata,
        attempts: usize,
    },
}

pub struct RetryEscalator {
    engine: Arc<dyn FetchEngine>,
    config: EscalatorConfig,
}

impl RetryEscalator {
    pub fn new(engine: Arc<dyn FetchEngine>, config: EscalatorConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &EscalatorConfig {
        &self.config
    }

    /// Execute every attempt of `plan` until one produces usable output.
    ///
    /// `Err` is reserved for local I/O failures around the fetch (creating the
    /// work directory, writing credentials). Fetch failures are reported in
    /// [`EscalationOutcome::error`].
    #[instrument(skip(self, plan), fields(locator = %locator, source = %plan.profile.source()))]
    pub async fn execute(&self, locator: &Locator, plan: &FetchPlan) -> Result<EscalationOutcome> {
        let work_dir = self.config.work_root.join(Uuid::new_v4().to_string());
        ensure_dir_all(&work_dir).await?;

        let credential_file = match plan.credential {
            Some(ref credential) => match write_credential_file(&work_dir, credential).await {
                Ok(path) => Some(path),
                Err(e) => {
                    remove_dir_all_tolerant(&work_dir).await?;
                    return Err(e);
                }
            },
            None => None,
        };

        let profile = plan.profile.with_max_filesize(self.config.max_filesize);
        let attempts = self.run_attempts(locator, &profile, &work_dir, credential_file.as_deref());

        let result = match tokio::time::timeout(self.config.timeout, attempts).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "Fetch timed out, discarding work directory");
                remove_dir_all_tolerant(&work_dir).await?;
                return Ok(EscalationOutcome {
                    files: Vec::new(),
                    work_dir,
                    error: Some(FetchFailure::Timeout {
                        after: self.config.timeout,
                    }),
                    metadata: FetchMetadata::new(),
                    attempts: 0,
                });
            }
        };

        match result {
            Ok(AttemptsResult::Success {
                files,
                metadata,
                attempts,
            }) => {
                if let Some(ref path) = credential_file {
                    remove_file_tolerant(path).await?;
                }
                info!(attempts, files = files.len(), "Fetch succeeded");
                Ok(EscalationOutcome {
                    files,
                    work_dir,
                    error: None,
                    metadata,
                    attempts,
                })
            }
            Ok(AttemptsResult::Failed {
                last_error,
                metadata,
                attempts,
            }) => {
                remove_dir_all_tolerant(&work_dir).await?;
                let failure = FetchFailure::from_captured(last_error);
                warn!(
                    attempts,
                    classification = %failure.classification(),
                    "All fetch attempts failed"
                );
                Ok(EscalationOutcome {
                    files: Vec::new(),
                    work_dir,
                    error: Some(failure),
                    metadata,
                    attempts,
                })
            }
            Err(e) => {
                remove_dir_all_tolerant(&work_dir).await?;
                Err(e)
            }
        }
    }

    async fn run_attempts(
        &self,
        locator: &Locator,
        profile: &StrategyProfile,
        work_dir: &Path,
        credential_file: Option<&Path>,
    ) -> Result<AttemptsResult> {
        let attempts = profile.attempts();
        let mut metadata = FetchMetadata::new();
        let mut last_error: Option<String> = None;

        for (idx, options) in attempts.iter().enumerate() {
            let attempt = idx + 1;
            let is_final = attempt == attempts.len();

            if idx > 0 {
                clear_work_dir(work_dir, credential_file).await?;
            }

            debug!(attempt, format = %options.format, "Starting fetch attempt");
            let request = FetchRequest {
                locator: locator.clone(),
                options: options.clone(),
                work_dir: work_dir.to_path_buf(),
                credential_file: credential_file.map(Path::to_path_buf),
            };

            let error = match self.engine.fetch(request).await {
                Ok(output) => {
                    metadata.extend(output.metadata);
                    output.error
                }
                Err(e) => Some(e.to_string()),
            };

            let files = usable_files(work_dir).await?;
            if !files.is_empty() && (error.is_none() || is_final) {
                if let Some(ref error) = error {
                    debug!(attempt, %error, "Accepting output despite captured error");
                }
                return Ok(AttemptsResult::Success {
                    files,
                    metadata,
                    attempts: attempt,
                });
            }

            info!(
                attempt,
                usable = files.len(),
                error = error.as_deref().unwrap_or("none"),
                "Fetch attempt did not produce usable output"
            );
            if error.is_some() {
                last_error = error;
            }
        }

        Ok(AttemptsResult::Failed {
            last_error,
            metadata,
            attempts: attempts.len(),
        })
    }
}

async fn write_credential_file(work_dir: &Path, credential: &CredentialSource) -> Result<PathBuf> {
    let path = work_dir.join(CREDENTIAL_FILE_NAME);
    tokio::fs::write(&path, credential.blob.as_bytes())
        .await
        .map_err(|e| Error::io_path("writing credentials", &path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| Error::io_path("restricting credentials", &path, e))?;
    }

    Ok(path)
}
