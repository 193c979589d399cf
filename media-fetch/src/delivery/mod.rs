//! Delivery surface boundary.
//!
//! The surface hands artifacts to requesters and returns an opaque reference
//! that allows redelivery without fetching again.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use media_sources::MediaKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::RequesterId;
use crate::utils::fs::ensure_dir_all;
use crate::{Error, Result};

/// Opaque id assigned by a delivery surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait DeliverySurface: Send + Sync {
    async fn deliver(
        &self,
        requester: RequesterId,
        path: &Path,
        kind: MediaKind,
        caption: &str,
    ) -> Result<ArtifactRef>;

    /// Fails when the surface no longer knows `artifact`.
    async fn redeliver(
        &self,
        requester: RequesterId,
        artifact: &ArtifactRef,
        kind: MediaKind,
        caption: &str,
    ) -> Result<()>;
}

/// Delivers into `<root>/<requester>/<ref>.<ext>` on local disk.
pub struct LocalOutboxDelivery {
    root: PathBuf,
}

impl LocalOutboxDelivery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn requester_dir(&self, requester: RequesterId) -> PathBuf {
        self.root.join(requester.to_string())
    }

    /// Stored artifacts are the only entries whose stem is the reference.
    async fn find(&self, requester: RequesterId, artifact: &ArtifactRef) -> Result<Option<PathBuf>> {
        let dir = self.requester_dir(requester);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io_path("reading outbox", &dir, e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_path("reading outbox", &dir, e))?
        {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(artifact.as_str()) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl DeliverySurface for LocalOutboxDelivery {
    async fn deliver(
        &self,
        requester: RequesterId,
        path: &Path,
        kind: MediaKind,
        caption: &str,
    ) -> Result<ArtifactRef> {
        let dir = self.requester_dir(requester);
        ensure_dir_all(&dir).await?;

        let artifact = ArtifactRef::new(Uuid::new_v4().to_string());
        let mut target = dir.join(artifact.as_str());
        if let Some(ext) = path.extension() {
            target.set_extension(ext);
        }
        tokio::fs::copy(path, &target)
            .await
            .map_err(|e| Error::io_path("copying artifact", path, e))?;

        info!(
            %requester,
            %kind,
            artifact = %artifact,
            caption,
            target = %target.display(),
            "Artifact delivered"
        );
        Ok(artifact)
    }

    async fn redeliver(
        &self,
        requester: RequesterId,
        artifact: &ArtifactRef,
        kind: MediaKind,
        caption: &str,
    ) -> Result<()> {
        match self.find(requester, artifact).await? {
            Some(path) => {
                debug!(%requester, %kind, caption, path = %path.display(), "Artifact redelivered");
                Ok(())
            }
            None => Err(Error::delivery(format!("unknown artifact reference {artifact}"))),
        }
    }
}
