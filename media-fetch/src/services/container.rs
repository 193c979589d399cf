//! Service container for dependency injection.
//!
//! The ServiceContainer builds every component from an [`AppConfig`], starts
//! the background loops under one [`TaskSupervisor`] and stops them again.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::Result;
use crate::admission::AdmissionController;
use crate::cache::{EphemeralCache, ResultCache};
use crate::config::AppConfig;
use crate::credentials::CredentialResolver;
use crate::database::repositories::{
    MediaCacheRepository, SqlxCredentialStore, SqlxMediaCacheRepository, SqlxToggleStore,
};
use crate::database::{self, MaintenanceScheduler};
use crate::delivery::LocalOutboxDelivery;
use crate::downloader::{FetchEngine, RetryEscalator, YtDlpEngine};
use crate::logging::LoggingConfig;
use crate::notification::{DiagnosticReporter, DiagnosticSink, LogSink, WebhookSink, diagnostic_channel};
use crate::orchestrator::Orchestrator;
use crate::router::SourceRouter;
use crate::tasks::TaskSupervisor;

/// Default shutdown timeout.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: SqlitePool,
    pub orchestrator: Arc<Orchestrator>,
    /// Module toggles, shared with the router.
    pub toggles: Arc<SqlxToggleStore>,
    /// Credential rows, shared with the resolver.
    pub credentials: Arc<SqlxCredentialStore>,
    pub diagnostics: Arc<DiagnosticReporter>,
    supervisor: TaskSupervisor,
}

impl ServiceContainer {
    /// Open the database, wire every component and start the background
    /// tasks. Log retention only runs when `logging` is given.
    pub async fn from_config(
        config: AppConfig,
        logging: Option<Arc<LoggingConfig>>,
    ) -> Result<Self> {
        info!("Initializing service container");

        let pool = database::init_pool(&config.database_url).await?;
        database::run_migrations(&pool).await?;

        // Repositories
        let media_cache: Arc<dyn MediaCacheRepository> =
            Arc::new(SqlxMediaCacheRepository::new(pool.clone()));
        let toggles = Arc::new(SqlxToggleStore::new(pool.clone()));
        let credentials = Arc::new(SqlxCredentialStore::new(pool.clone()));

        // Diagnostics
        let mut sinks: Vec<Arc<dyn DiagnosticSink>> = vec![Arc::new(LogSink)];
        if let Some(webhook) = config.diagnostics.webhook.clone() {
            sinks.push(Arc::new(WebhookSink::new(webhook)?));
        }
        let (diagnostics, flusher) = diagnostic_channel(&config.diagnostics, sinks);

        // Fetch path
        let engine = Arc::new(YtDlpEngine::new(config.ytdlp.clone()));
        if !engine.is_available().await {
            warn!(binary = %config.ytdlp.binary_path, "Fetch engine binary not available, fetches will fail");
        }
        let escalator = Arc::new(RetryEscalator::new(engine, config.escalator.clone()));
        let ephemeral = Arc::new(EphemeralCache::new(config.ephemeral.clone()));
        let cache = ResultCache::new(media_cache.clone(), ephemeral.clone());
        let router = Arc::new(SourceRouter::new(toggles.clone()));
        let admission = Arc::new(AdmissionController::new(config.admission.clone()));

        let orchestrator = Arc::new(Orchestrator::new(
            admission,
            router,
            escalator,
            cache,
            Arc::new(LocalOutboxDelivery::new(config.outbox_dir.clone())),
            CredentialResolver::new(credentials.clone()),
            diagnostics.clone(),
        ));

        // Background tasks
        let supervisor = TaskSupervisor::default();
        supervisor.spawn("ephemeral-sweeper", |token| ephemeral.run_sweeper(token));
        supervisor.spawn("diagnostics-flush", |token| flusher.run(token));
        let maintenance = Arc::new(MaintenanceScheduler::new(
            pool.clone(),
            media_cache,
            config.maintenance.clone(),
        ));
        supervisor.spawn("maintenance", |token| maintenance.run(token));
        if let Some(logging) = logging {
            supervisor.spawn("log-retention", |token| logging.run_retention(token));
        }

        info!(
            mode = %config.admission.mode,
            per_requester_limit = config.admission.per_requester_limit,
            global_limit = config.admission.global_limit,
            ephemeral_cache = config.ephemeral.enabled,
            "Service container initialized"
        );

        Ok(Self {
            pool,
            orchestrator,
            toggles,
            credentials,
            diagnostics,
            supervisor,
        })
    }

    pub fn background_tasks(&self) -> usize {
        self.supervisor.len()
    }

    /// Stop background tasks and close the pool.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        info!("Shutting down services (timeout: {:?})", timeout);
        self.supervisor.shutdown(timeout).await;

        let dropped = self.diagnostics.dropped();
        if dropped > 0 {
            warn!(dropped, "Diagnostic events were dropped");
        }

        info!("Closing database pool...");
        self.pool.close().await;
        info!("Services shut down");
        Ok(())
    }
}
