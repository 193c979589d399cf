//! Request orchestration.
//!
//! Read order for every request:
//!
//! 1. Persistent tier: a known artifact reference is redelivered, no fetch.
//! 2. Under an admission slot: route, then the ephemeral tier (reuse files
//!    fetched recently for anyone), then the retry escalator with at most one
//!    caller-level fallback.
//! 3. On success the artifact is delivered, the reference is recorded for
//!    this requester and the work directory is handed to the ephemeral tier.

use std::sync::Arc;

use media_sources::{FetchOverrides, Locator, MediaKind};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::admission::AdmissionController;
use crate::cache::ResultCache;
use crate::credentials::CredentialResolver;
use crate::delivery::{ArtifactRef, DeliverySurface};
use crate::domain::RequesterId;
use crate::downloader::{
    ErrorClassification, EscalationOutcome, FetchPlan, RetryEscalator, UsableFile, primary_file,
};
use crate::notification::{DiagnosticEvent, DiagnosticReporter};
use crate::router::{Route, SourceRouter};
use crate::utils::fs::remove_dir_all_tolerant;
use crate::{Error, Result};

/// Diagnostic source used before a module key is known.
const UNROUTED: &str = "unrouted";

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub requester: RequesterId,
    /// Locator as supplied; validated and canonicalized by the router.
    pub locator: String,
    pub kind: MediaKind,
    pub overrides: FetchOverrides,
}

impl DownloadRequest {
    pub fn new(requester: RequesterId, locator: impl Into<String>) -> Self {
        Self {
            requester,
            locator: locator.into(),
            kind: MediaKind::Auto,
            overrides: FetchOverrides::default(),
        }
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_overrides(mut self, overrides: FetchOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

#[derive(Debug)]
pub enum Outcome {
    /// A stored reference was handed out again.
    Redelivered { artifact: ArtifactRef },
    Delivered {
        artifact: ArtifactRef,
        /// Files came from the ephemeral tier instead of a fetch.
        reused_local: bool,
    },
    Failed {
        error: Error,
        user_message: &'static str,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn artifact(&self) -> Option<&ArtifactRef> {
        match self {
            Self::Redelivered { artifact } | Self::Delivered { artifact, .. } => Some(artifact),
            Self::Failed { .. } => None,
        }
    }
}

pub struct Orchestrator {
    admission: Arc<AdmissionController>,
    router: Arc<SourceRouter>,
    escalator: Arc<RetryEscalator>,
    cache: ResultCache,
    delivery: Arc<dyn DeliverySurface>,
    credentials: CredentialResolver,
    diagnostics: Arc<DiagnosticReporter>,
}

impl Orchestrator {
    pub fn new(
        admission: Arc<AdmissionController>,
        router: Arc<SourceRouter>,
        escalator: Arc<RetryEscalator>,
        cache: ResultCache,
        delivery: Arc<dyn DeliverySurface>,
        credentials: CredentialResolver,
        diagnostics: Arc<DiagnosticReporter>,
    ) -> Self {
        Self {
            admission,
            router,
            escalator,
            cache,
            delivery,
            credentials,
            diagnostics,
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn router(&self) -> &Arc<SourceRouter> {
        &self.router
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn handle(&self, request: DownloadRequest) -> Outcome {
        let span = info_span!(
            "download",
            requester = %request.requester,
            locator = %request.locator,
            kind = %request.kind
        );
        self.handle_inner(request).instrument(span).await
    }

    async fn handle_inner(&self, request: DownloadRequest) -> Outcome {
        let locator = match self.router.validate(&request.locator) {
            Ok(locator) => locator,
            Err(e) => return self.fail(&request, UNROUTED, e),
        };

        match self.try_redeliver(&request, &locator).await {
            Ok(Some(artifact)) => return Outcome::Redelivered { artifact },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Persistent cache lookup failed, fetching instead"),
        }

        let admitted = self
            .admission
            .submit(request.requester, self.fetch_and_deliver(&request, locator))
            .await;
        match admitted {
            Ok(outcome) => outcome,
            Err(e) => self.fail(&request, UNROUTED, e),
        }
    }

    /// Redeliver a stored reference. A reference the delivery surface
    /// rejects is stale: it is dropped and the request falls through.
    async fn try_redeliver(
        &self,
        request: &DownloadRequest,
        locator: &Locator,
    ) -> Result<Option<ArtifactRef>> {
        let Some(record) = self
            .cache
            .lookup_reference(request.requester, locator.as_str(), request.kind)
            .await?
        else {
            return Ok(None);
        };

        let artifact = ArtifactRef::new(record.artifact_ref.clone());
        let caption = record.title.as_deref().unwrap_or(locator.as_str());
        match self
            .delivery
            .redeliver(request.requester, &artifact, request.kind, caption)
            .await
        {
            Ok(()) => {
                if let Err(e) = self.cache.mark_redelivered(&record).await {
                    warn!(error = %e, "Failed to update last-used time");
                }
                info!(artifact = %artifact, "Redelivered cached artifact");
                Ok(Some(artifact))
            }
            Err(e) => {
                warn!(artifact = %artifact, error = %e, "Stored reference rejected, fetching again");
                self.cache.forget(&record).await?;
                Ok(None)
            }
        }
    }

    async fn fetch_and_deliver(&self, request: &DownloadRequest, locator: Locator) -> Outcome {
        let route = match self
            .router
            .route_locator(locator, request.kind, &request.overrides)
            .await
        {
            Ok(route) => route,
            Err(e) => return self.fail(request, UNROUTED, e),
        };
        let kind = route.strategy.kind();

        if let Some(hit) = self.cache.lookup_files(route.locator.as_str(), kind) {
            debug!(work_dir = %hit.work_dir.display(), "Ephemeral cache hit");
            match self
                .deliver_files(request, &route, &hit.files, hit.title.as_deref())
                .await
            {
                Ok(artifact) => {
                    return Outcome::Delivered {
                        artifact,
                        reused_local: true,
                    };
                }
                Err(e) => warn!(error = %e, "Reusing cached files failed, fetching again"),
            }
        }

        let fetched = match self.execute_with_fallback(request, &route).await {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(request, route.module_key, e),
        };
        if let Some(failure) = fetched.error {
            return self.fail(request, route.module_key, failure.into());
        }

        let title = fetched.title().map(String::from);
        match self
            .deliver_files(request, &route, &fetched.files, title.as_deref())
            .await
        {
            Ok(artifact) => {
                if let Err(e) = self
                    .cache
                    .retain_files(route.locator.as_str(), kind, fetched.work_dir, fetched.files, title)
                    .await
                {
                    warn!(error = %e, "Failed to hand work directory to the ephemeral cache");
                }
                Outcome::Delivered {
                    artifact,
                    reused_local: false,
                }
            }
            Err(e) => {
                if let Err(cleanup) = remove_dir_all_tolerant(&fetched.work_dir).await {
                    warn!(error = %cleanup, "Failed to remove work directory");
                }
                self.fail(request, route.module_key, e)
            }
        }
    }

    /// Run the escalator, then at most one extra execution: with credentials
    /// after `AuthRequired`, with the degraded profile after `TooLarge`.
    async fn execute_with_fallback(
        &self,
        request: &DownloadRequest,
        route: &Route,
    ) -> Result<EscalationOutcome> {
        let plan = FetchPlan::new(route.strategy.clone());
        let first = self.escalator.execute(&route.locator, &plan).await?;
        let Some(classification) = first.error.as_ref().map(|f| f.classification()) else {
            return Ok(first);
        };

        match classification {
            ErrorClassification::AuthRequired => {
                let source_key = route.source.credential_key();
                let Some(credential) = self.credentials.resolve(request.requester, source_key).await?
                else {
                    debug!(source_key, "Authentication required but no credentials available");
                    return Ok(first);
                };
                info!(scope = %credential.scope, "Retrying with credentials");
                self.escalator
                    .execute(&route.locator, &plan.with_credential(credential))
                    .await
            }
            ErrorClassification::TooLarge => {
                info!("Output too large, retrying with degraded format");
                self.escalator.execute(&route.locator, &plan.degraded()).await
            }
            _ => Ok(first),
        }
    }

    /// Deliver the primary file and record the reference for the requester.
    async fn deliver_files(
        &self,
        request: &DownloadRequest,
        route: &Route,
        files: &[UsableFile],
        title: Option<&str>,
    ) -> Result<ArtifactRef> {
        let primary = primary_file(files).ok_or(Error::NoUsableOutput)?;
        let caption = title.unwrap_or(route.locator.as_str());
        let artifact = self
            .delivery
            .deliver(request.requester, &primary.path, route.strategy.kind(), caption)
            .await?;

        // The file reached the requester; a failed write only costs a future fetch.
        if let Err(e) = self
            .cache
            .record_delivery(
                request.requester,
                route.locator.as_str(),
                request.kind,
                artifact.as_str(),
                title,
            )
            .await
        {
            warn!(error = %e, "Failed to record artifact reference");
            self.diagnostics.report(DiagnosticEvent::from_error(
                route.module_key,
                Some(request.requester),
                Some(route.locator.as_str()),
                &e,
            ));
        }
        Ok(artifact)
    }

    fn fail(&self, request: &DownloadRequest, source: &str, error: Error) -> Outcome {
        warn!(source, error = %error, "Download failed");
        self.diagnostics.report(DiagnosticEvent::from_error(
            source,
            Some(request.requester),
            Some(&request.locator),
            &error,
        ));
        Outcome::Failed {
            user_message: error.user_message(),
            error,
        }
    }
}
