//! Fetch engine trait and related types.

use async_trait::async_trait;
use media_sources::{FetchOptions, Locator};
use std::path::PathBuf;

use crate::Result;

/// Best-effort metadata reported by the engine (title, id, duration, ...).
pub type FetchMetadata = serde_json::Map<String, serde_json::Value>;

/// One engine invocation.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub locator: Locator,
    pub options: FetchOptions,
    /// Directory the engine writes into. Created by the caller.
    pub work_dir: PathBuf,
    /// Cookie jar path, when credential material is supplied.
    pub credential_file: Option<PathBuf>,
}

/// Result of one engine invocation.
///
/// The engine continues past internal errors, so a failed fetch usually
/// still returns `Ok` with `error` set to the last captured error line.
#[derive(Debug, Clone, Default)]
pub struct FetchOutput {
    pub files: Vec<PathBuf>,
    pub work_dir: PathBuf,
    pub error: Option<String>,
    pub metadata: FetchMetadata,
}

impl FetchOutput {
    pub fn title(&self) -> Option<&str> {
        self.metadata
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

/// External media extraction engine.
#[async_trait]
pub trait FetchEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one fetch. Dropping the future must abort the fetch.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutput>;

    /// Check if the engine is available (e.g., binary exists).
    async fn is_available(&self) -> bool {
        true
    }
}
