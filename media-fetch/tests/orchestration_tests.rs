//! End-to-end tests for the download flow.
//!
//! A scripted engine stands in for yt-dlp; persistence is an in-memory SQLite
//! database and delivery writes into a temporary outbox.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use media_fetch::admission::{AdmissionConfig, AdmissionController};
use media_fetch::cache::{EphemeralCache, EphemeralCacheConfig, ResultCache};
use media_fetch::credentials::{
    CredentialResolver, CredentialScope, CredentialStore, InMemoryCredentialStore,
};
use media_fetch::database::repositories::{MediaCacheRepository, SqlxMediaCacheRepository};
use media_fetch::database::{init_pool, run_migrations};
use media_fetch::delivery::LocalOutboxDelivery;
use media_fetch::domain::RequesterId;
use media_fetch::downloader::{
    ErrorClassification, EscalatorConfig, FetchEngine, FetchMetadata, FetchOutput, FetchRequest,
    RetryEscalator,
};
use media_fetch::notification::{DiagnosticFlusher, DiagnosticsConfig, diagnostic_channel};
use media_fetch::orchestrator::{DownloadRequest, Orchestrator, Outcome};
use media_fetch::router::{InMemoryToggleStore, SourceRouter, ToggleStore};
use media_fetch::{Error, Result};
use media_sources::{MediaKind, RouteError};
use parking_lot::Mutex;
use tempfile::TempDir;

const VIDEO: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

type Step = dyn Fn(usize, &FetchRequest) -> (Option<&'static str>, Option<&'static str>) + Send + Sync;

/// Engine stub: the step function receives the call index and request and
/// returns (file to write, captured error).
struct StubEngine {
    step: Box<Step>,
    calls: Mutex<Vec<FetchRequest>>,
}

impl StubEngine {
    fn new(
        step: impl Fn(usize, &FetchRequest) -> (Option<&'static str>, Option<&'static str>)
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            step: Box::new(step),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn succeeding() -> Self {
        Self::new(|_, _| (Some("video.mp4"), None))
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn calls(&self) -> Vec<FetchRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl FetchEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutput> {
        let idx = {
            let mut calls = self.calls.lock();
            calls.push(request.clone());
            calls.len() - 1
        };
        let (file, error) = (self.step)(idx, &request);
        if let Some(name) = file {
            tokio::fs::write(request.work_dir.join(name), b"media bytes").await?;
        }
        let mut metadata = FetchMetadata::new();
        metadata.insert("title".to_string(), "Stub title".into());
        Ok(FetchOutput {
            files: Vec::new(),
            work_dir: request.work_dir,
            error: error.map(String::from),
            metadata,
        })
    }
}

struct Harness {
    orchestrator: Orchestrator,
    engine: Arc<StubEngine>,
    toggles: Arc<InMemoryToggleStore>,
    credentials: Arc<InMemoryCredentialStore>,
    persistent: Arc<SqlxMediaCacheRepository>,
    temp: TempDir,
    _flusher: DiagnosticFlusher,
}

impl Harness {
    async fn new(engine: StubEngine) -> Self {
        let temp = TempDir::new().expect("temp dir");
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        run_migrations(&pool).await.expect("migrations");

        let engine = Arc::new(engine);
        let toggles = Arc::new(InMemoryToggleStore::new());
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let persistent = Arc::new(SqlxMediaCacheRepository::new(pool));

        let escalator = RetryEscalator::new(
            engine.clone(),
            EscalatorConfig {
                work_root: temp.path().join("work"),
                ..EscalatorConfig::default()
            },
        );
        let cache = ResultCache::new(
            persistent.clone(),
            Arc::new(EphemeralCache::new(EphemeralCacheConfig::default())),
        );
        let (diagnostics, flusher) = diagnostic_channel(&DiagnosticsConfig::default(), Vec::new());

        let orchestrator = Orchestrator::new(
            Arc::new(AdmissionController::new(AdmissionConfig::default())),
            Arc::new(SourceRouter::new(toggles.clone())),
            Arc::new(escalator),
            cache,
            Arc::new(LocalOutboxDelivery::new(temp.path().join("outbox"))),
            CredentialResolver::new(credentials.clone()),
            diagnostics,
        );

        Self {
            orchestrator,
            engine,
            toggles,
            credentials,
            persistent,
            temp,
            _flusher: flusher,
        }
    }

    async fn fetch(&self, requester: i64, locator: &str) -> Outcome {
        self.orchestrator
            .handle(DownloadRequest::new(RequesterId::new(requester), locator))
            .await
    }

    fn outbox(&self) -> PathBuf {
        self.temp.path().join("outbox")
    }
}

fn fetch_classification(outcome: &Outcome) -> Option<ErrorClassification> {
    match outcome {
        Outcome::Failed { error, .. } => error.classification(),
        _ => None,
    }
}

mod cache_tier_tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_then_redeliver_without_engine() {
        let harness = Harness::new(StubEngine::succeeding()).await;

        let first = harness.fetch(1, VIDEO).await;
        let Outcome::Delivered {
            artifact,
            reused_local,
        } = &first
        else {
            panic!("expected delivery, got {first:?}");
        };
        assert!(!reused_local);
        assert_eq!(harness.persistent.count().await.unwrap(), 1);

        let second = harness.fetch(1, VIDEO).await;
        match second {
            Outcome::Redelivered { artifact: again } => assert_eq!(&again, artifact),
            other => panic!("expected redelivery, got {other:?}"),
        }
        assert_eq!(harness.engine.call_count(), 1);
        assert_eq!(harness.persistent.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_other_requester_reuses_local_files() {
        let harness = Harness::new(StubEngine::succeeding()).await;

        assert!(harness.fetch(1, VIDEO).await.is_success());
        let outcome = harness.fetch(2, VIDEO).await;
        assert!(matches!(
            outcome,
            Outcome::Delivered {
                reused_local: true,
                ..
            }
        ));

        assert_eq!(harness.engine.call_count(), 1);
        // One persistent reference per requester.
        assert_eq!(harness.persistent.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stale_reference_falls_through() {
        let harness = Harness::new(StubEngine::succeeding()).await;

        assert!(harness.fetch(1, VIDEO).await.is_success());
        tokio::fs::remove_dir_all(harness.outbox()).await.unwrap();

        let outcome = harness.fetch(1, VIDEO).await;
        assert!(matches!(outcome, Outcome::Delivered { .. }), "{outcome:?}");
        assert_eq!(harness.persistent.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_kind_is_part_of_the_reference_key() {
        let harness = Harness::new(StubEngine::succeeding()).await;

        assert!(harness.fetch(1, VIDEO).await.is_success());
        let audio = harness
            .orchestrator
            .handle(DownloadRequest::new(RequesterId::new(1), VIDEO).with_kind(MediaKind::Audio))
            .await;
        assert!(matches!(audio, Outcome::Delivered { .. }), "{audio:?}");
        assert_eq!(harness.engine.call_count(), 2);
    }
}

mod escalation_tests {
    use super::*;

    #[tokio::test]
    async fn test_too_large_gets_one_degraded_retry() {
        let engine = StubEngine::new(|_, _| {
            (
                None,
                Some("ERROR: File is larger than max-filesize (73400320 bytes > 52428800 bytes)"),
            )
        });
        let harness = Harness::new(engine).await;

        let outcome = harness.fetch(1, VIDEO).await;
        assert_eq!(fetch_classification(&outcome), Some(ErrorClassification::TooLarge));

        // Two attempts, then the same two under the degraded format.
        let calls = harness.engine.calls();
        assert_eq!(calls.len(), 4);
        assert!(!calls[0].options.format.contains("480"));
        assert!(calls[2].options.format.contains("height<=480"));
        assert!(calls[3].options.format.contains("height<=480"));
        assert!(calls.iter().all(|c| c.options.max_filesize.is_some()));
    }

    #[tokio::test]
    async fn test_degraded_retry_can_succeed() {
        let engine = StubEngine::new(|idx, _| match idx {
            0 | 1 => (None, Some("ERROR: File is larger than max-filesize")),
            _ => (Some("small.mp4"), None),
        });
        let harness = Harness::new(engine).await;

        let outcome = harness.fetch(1, VIDEO).await;
        assert!(matches!(outcome, Outcome::Delivered { .. }), "{outcome:?}");
        assert_eq!(harness.engine.call_count(), 3);
    }

    #[tokio::test]
    async fn test_auth_required_retries_with_stored_credentials() {
        let engine = StubEngine::new(|_, request| match &request.credential_file {
            Some(path) if std::fs::read_to_string(path).is_ok_and(|s| s == "# cookies") => {
                (Some("private.mp4"), None)
            }
            _ => (None, Some("ERROR: [youtube] abc: Sign in to confirm you're not a bot")),
        });
        let harness = Harness::new(engine).await;
        harness
            .credentials
            .set(CredentialScope::Global, "youtube", "# cookies")
            .await
            .unwrap();

        let outcome = harness.fetch(1, VIDEO).await;
        assert!(matches!(outcome, Outcome::Delivered { .. }), "{outcome:?}");

        let calls = harness.engine.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[..2].iter().all(|c| c.credential_file.is_none()));
        assert!(calls[2].credential_file.is_some());
    }

    #[tokio::test]
    async fn test_auth_required_without_credentials_fails() {
        let engine = StubEngine::new(|_, _| (None, Some("ERROR: This video requires authentication")));
        let harness = Harness::new(engine).await;

        let outcome = harness.fetch(1, VIDEO).await;
        assert_eq!(fetch_classification(&outcome), Some(ErrorClassification::AuthRequired));
        assert_eq!(harness.engine.call_count(), 2);
        assert_eq!(harness.persistent.count().await.unwrap(), 0);

        let Outcome::Failed { user_message, .. } = outcome else {
            unreachable!();
        };
        assert_eq!(user_message, ErrorClassification::AuthRequired.user_message());
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_no_work_directory() {
        let engine = StubEngine::new(|_, _| (Some("broken.mp4.part"), Some("ERROR: something odd")));
        let harness = Harness::new(engine).await;

        let outcome = harness.fetch(1, VIDEO).await;
        assert!(!outcome.is_success());

        let work_root = harness.temp.path().join("work");
        let mut entries = tokio::fs::read_dir(&work_root).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}

mod routing_tests {
    use super::*;

    #[tokio::test]
    async fn test_rejected_locator_never_reaches_engine() {
        let harness = Harness::new(StubEngine::succeeding()).await;

        let outcome = harness
            .fetch(1, "https://www.youtube.com/watch?v=abc;reboot")
            .await;
        assert!(matches!(
            outcome,
            Outcome::Failed {
                error: Error::Route(RouteError::SecurityRejection(';')),
                ..
            }
        ));
        assert_eq!(harness.engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_source() {
        let harness = Harness::new(StubEngine::succeeding()).await;

        let outcome = harness.fetch(1, "https://example.com/video").await;
        assert!(matches!(
            outcome,
            Outcome::Failed {
                error: Error::Route(RouteError::UnsupportedSource(_)),
                ..
            }
        ));
        assert_eq!(harness.engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_module_is_refused() {
        let harness = Harness::new(StubEngine::succeeding()).await;
        harness.toggles.set("youtube", false).await.unwrap();

        let outcome = harness.fetch(1, VIDEO).await;
        assert!(matches!(
            outcome,
            Outcome::Failed {
                error: Error::ModuleDisabled(_),
                ..
            }
        ));
        assert_eq!(harness.engine.call_count(), 0);

        harness.toggles.set("youtube", true).await.unwrap();
        assert!(harness.fetch(1, VIDEO).await.is_success());
    }
}
