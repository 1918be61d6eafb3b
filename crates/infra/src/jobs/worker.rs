//! Export worker: claims pending jobs, renders artifacts, records the outcome.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use gradelens_core::{DomainError, DomainResult, ExportJob, ExportJobId, ExportStatus};
use gradelens_events::{Event, EventBus, ExportEvent, Subscription};

use crate::artifacts::ArtifactStorage;
use crate::notifications::NotificationEmitter;

use super::exporter::{ExportError, Exporter};
use super::store::JobStore;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name for logging and `Claimed` events
    pub worker_id: String,
    /// How often to sweep for pending and stuck jobs
    pub poll_interval: Duration,
    /// Claim age after which a `processing` job is considered abandoned
    pub stuck_after: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "export-worker".to_string(),
            poll_interval: Duration::from_secs(5),
            stuck_after: Duration::from_secs(15 * 60),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stuck_after(mut self, stuck_after: Duration) -> Self {
        self.stuck_after = stuck_after;
        self
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_reclaimed: u64,
    pub signals_received: u64,
    pub sweeps: u64,
}

/// Handle to control a spawned worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the loop to exit. A job being
    /// processed is finished first.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.join.await {
            error!(error = %err, "export worker task ended abnormally");
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Background export worker.
///
/// Every job it touches goes through exactly one claim (`pending →
/// processing`) and one terminal transition. Rendering and storage errors,
/// including panics, become a `failed` job with the error message; they are
/// never propagated out of the worker.
pub struct ExportWorker<B> {
    store: Arc<dyn JobStore>,
    exporter: Exporter,
    artifacts: Arc<dyn ArtifactStorage>,
    emitter: NotificationEmitter,
    bus: B,
    config: WorkerConfig,
    stats: Arc<Mutex<WorkerStats>>,
}

impl<B> ExportWorker<B>
where
    B: EventBus<ExportEvent> + 'static,
{
    pub fn new(
        store: Arc<dyn JobStore>,
        exporter: Exporter,
        artifacts: Arc<dyn ArtifactStorage>,
        emitter: NotificationEmitter,
        bus: B,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            exporter,
            artifacts,
            emitter,
            bus,
            config,
            stats: Arc::new(Mutex::new(WorkerStats::default())),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, update: impl FnOnce(&mut WorkerStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }

    /// Claim and process the oldest pending job, if any.
    pub async fn run_once(&self) -> DomainResult<Option<ExportJob>> {
        let Some(job) = self.store.claim_next().await? else {
            return Ok(None);
        };
        self.process_claimed(job).await.map(Some)
    }

    /// Claim one specific job and process it. Fails with `InvalidTransition`
    /// if another worker already holds it.
    pub async fn claim_and_process(&self, job_id: ExportJobId) -> DomainResult<ExportJob> {
        let job = match self.store.claim(job_id).await {
            Ok(job) => job,
            Err(err) => {
                if let DomainError::InvalidTransition { from, to } = &err {
                    warn!(
                        worker = %self.config.worker_id,
                        job_id = %job_id,
                        from = %from,
                        to = %to,
                        "claim rejected"
                    );
                }
                return Err(err);
            }
        };
        self.process_claimed(job).await
    }

    /// Process pending jobs until none are left; returns how many were handled.
    pub async fn drain(&self) -> usize {
        let mut handled = 0;
        loop {
            match self.run_once().await {
                Ok(Some(_)) => handled += 1,
                Ok(None) => break,
                Err(err) => {
                    error!(worker = %self.config.worker_id, error = %err, "export worker iteration failed");
                    break;
                }
            }
        }
        handled
    }

    async fn process_claimed(&self, job: ExportJob) -> DomainResult<ExportJob> {
        info!(
            worker = %self.config.worker_id,
            job_id = %job.id,
            export_type = %job.export_type,
            format = %job.format,
            "claimed export job"
        );
        self.publish(ExportEvent::Claimed {
            job_id: job.id,
            owner_id: job.owner_id,
            worker_id: self.config.worker_id.clone(),
            occurred_at: Utc::now(),
        });

        let produced = AssertUnwindSafe(self.produce(&job))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ExportError::Source(panic_message(panic))));

        let (artifact_ref, result) = match produced {
            Ok(artifact_ref) => {
                let result = self
                    .store
                    .transition(job.id, ExportStatus::Completed, Some(artifact_ref.clone()), None)
                    .await;
                (Some(artifact_ref), result)
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "export failed");
                let result = self
                    .store
                    .transition(job.id, ExportStatus::Failed, None, Some(err.to_string()))
                    .await;
                (None, result)
            }
        };

        match result {
            Ok(finished) => {
                self.finish(&finished).await;
                Ok(finished)
            }
            Err(err) => {
                // Deleted mid-flight, or a transition bug: drop what we produced.
                match &err {
                    DomainError::NotFound => {
                        info!(job_id = %job.id, "export deleted while processing")
                    }
                    DomainError::InvalidTransition { from, to } => warn!(
                        job_id = %job.id,
                        from = %from,
                        to = %to,
                        "terminal transition rejected"
                    ),
                    other => error!(job_id = %job.id, error = %other, "terminal transition failed"),
                }
                if let Some(artifact_ref) = artifact_ref {
                    if let Err(delete_err) = self.artifacts.delete(&artifact_ref).await {
                        warn!(
                            job_id = %job.id,
                            artifact_ref = %artifact_ref,
                            error = %delete_err,
                            "failed to delete orphaned artifact"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    async fn produce(&self, job: &ExportJob) -> Result<String, ExportError> {
        let bytes = self.exporter.render(job, Utc::now()).await?;
        let key = format!("{}/{}.{}", job.owner_id, job.id, job.format.extension());
        let artifact_ref = self
            .artifacts
            .put(&key, bytes, job.format.content_type())
            .await?;
        Ok(artifact_ref)
    }

    /// Stats, lifecycle event and notification for an accepted terminal transition.
    async fn finish(&self, job: &ExportJob) {
        let now = Utc::now();
        match job.status {
            ExportStatus::Completed => {
                self.record(|s| s.jobs_completed += 1);
                info!(job_id = %job.id, artifact_ref = ?job.artifact_ref, "export completed");
                self.publish(ExportEvent::Completed {
                    job_id: job.id,
                    owner_id: job.owner_id,
                    artifact_ref: job.artifact_ref.clone().unwrap_or_default(),
                    occurred_at: now,
                });
            }
            ExportStatus::Failed => {
                self.record(|s| s.jobs_failed += 1);
                self.publish(ExportEvent::Failed {
                    job_id: job.id,
                    owner_id: job.owner_id,
                    error: job.error.clone().unwrap_or_default(),
                    occurred_at: now,
                });
            }
            ExportStatus::Pending | ExportStatus::Processing => return,
        }

        if let Err(err) = self.emitter.export_finished(job).await {
            error!(job_id = %job.id, error = %err, "failed to emit export notification");
        }
    }

    /// Fail `processing` jobs whose claim is older than `stuck_after`.
    ///
    /// Moving forward to `failed` keeps the status machine monotonic; the owner
    /// gets the usual failure notification and may resubmit.
    pub async fn reclaim_stuck(&self) -> DomainResult<usize> {
        let cutoff = chrono::Duration::from_std(self.config.stuck_after)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };

        let message = format!(
            "export timed out after {}s in processing",
            self.config.stuck_after.as_secs()
        );
        let mut reclaimed = 0;
        for job in self.store.list_stuck(cutoff).await? {
            match self
                .store
                .transition(job.id, ExportStatus::Failed, None, Some(message.clone()))
                .await
            {
                Ok(failed) => {
                    warn!(job_id = %job.id, claimed_at = ?job.claimed_at, "reclaimed stuck export");
                    self.record(|s| s.jobs_reclaimed += 1);
                    self.finish(&failed).await;
                    reclaimed += 1;
                }
                // Finished or deleted between the listing and now.
                Err(DomainError::InvalidTransition { .. } | DomainError::NotFound) => {
                    debug!(job_id = %job.id, "stuck export resolved concurrently");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(reclaimed)
    }

    async fn sweep(&self) {
        self.record(|s| s.sweeps += 1);
        if let Err(err) = self.reclaim_stuck().await {
            error!(worker = %self.config.worker_id, error = %err, "stuck-job sweep failed");
        }
        let handled = self.drain().await;
        if handled > 0 {
            debug!(worker = %self.config.worker_id, handled, "sweep processed pending exports");
        }
    }

    fn publish(&self, event: ExportEvent) {
        let event_type = event.event_type();
        match self.bus.publish(event) {
            Ok(receivers) => debug!(event_type, receivers, "published export event"),
            Err(err) => warn!(event_type, error = ?err, "failed to publish export event"),
        }
    }

    /// Spawn the worker loop on the current tokio runtime.
    ///
    /// The loop wakes on `Submitted` events and on every `poll_interval` tick
    /// (which also covers signals missed while busy or lagging).
    pub fn spawn(self) -> WorkerHandle {
        let shutdown = Arc::new(Notify::new());
        let stats = self.stats.clone();
        // Subscribe before returning so no submission after spawn is missed.
        let signals = self.bus.subscribe();

        let join = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { self.run(signals, shutdown).await }
        });

        WorkerHandle {
            shutdown,
            join,
            stats,
        }
    }

    async fn run(self, mut signals: Subscription<ExportEvent>, shutdown: Arc<Notify>) {
        info!(worker = %self.config.worker_id, "export worker started");

        let mut sweep = tokio::time::interval(self.config.poll_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut bus_open = true;

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                signal = signals.recv(), if bus_open => match signal {
                    Some(ExportEvent::Submitted { job_id, .. }) => {
                        debug!(worker = %self.config.worker_id, job_id = %job_id, "submission signal");
                        self.record(|s| s.signals_received += 1);
                        self.drain().await;
                    }
                    Some(_) => {}
                    None => {
                        warn!(worker = %self.config.worker_id, "event bus closed; continuing on sweeps only");
                        bus_open = false;
                    }
                },
                _ = sweep.tick() => self.sweep().await,
            }
        }

        info!(worker = %self.config.worker_id, "export worker stopped");
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("export panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use gradelens_core::{ExportFormat, ExportType, Filters, NotificationType, OwnerId};
    use gradelens_events::InMemoryEventBus;
    use serde_json::json;
    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::artifacts::{ArtifactError, InMemoryArtifactStorage};
    use crate::jobs::exporter::{DomainDataSource, InMemoryDataSource, Row};
    use crate::jobs::InMemoryJobStore;
    use crate::notifications::{InMemoryNotificationStore, NotificationStore};

    type Bus = Arc<InMemoryEventBus<ExportEvent>>;

    struct FailingSource;

    #[async_trait]
    impl DomainDataSource for FailingSource {
        async fn rows(&self, _: OwnerId, _: ExportType) -> Result<Vec<Row>, ExportError> {
            Err(ExportError::Source("gradebook unavailable".to_string()))
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl DomainDataSource for PanickingSource {
        async fn rows(&self, _: OwnerId, _: ExportType) -> Result<Vec<Row>, ExportError> {
            panic!("corrupt gradebook row")
        }
    }

    /// Deletes the owner's jobs while "reading" their rows.
    struct DeletingSource {
        store: Arc<InMemoryJobStore>,
    }

    #[async_trait]
    impl DomainDataSource for DeletingSource {
        async fn rows(&self, owner_id: OwnerId, _: ExportType) -> Result<Vec<Row>, ExportError> {
            for job in self.store.list(owner_id).await.unwrap() {
                self.store.delete(owner_id, job.id).await.unwrap();
            }
            Ok(Vec::new())
        }
    }

    /// Stores artifacts but refuses to delete them.
    #[derive(Default)]
    struct UndeletableArtifacts {
        inner: InMemoryArtifactStorage,
    }

    #[async_trait]
    impl ArtifactStorage for UndeletableArtifacts {
        async fn put(
            &self,
            key: &str,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> Result<String, ArtifactError> {
            self.inner.put(key, bytes, content_type).await
        }

        async fn get(&self, artifact_ref: &str) -> Result<Vec<u8>, ArtifactError> {
            self.inner.get(artifact_ref).await
        }

        async fn delete(&self, _: &str) -> Result<(), ArtifactError> {
            Err(ArtifactError::Io(std::io::Error::other("read-only volume")))
        }
    }

    /// Captures formatted log output for the current thread.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_warnings() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(Level::WARN)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    struct Fixture {
        worker: ExportWorker<Bus>,
        store: Arc<InMemoryJobStore>,
        notifications: Arc<InMemoryNotificationStore>,
        artifacts: Arc<InMemoryArtifactStorage>,
        bus: Bus,
    }

    fn fixture(source: Arc<dyn DomainDataSource>, config: WorkerConfig) -> Fixture {
        let store = InMemoryJobStore::arc();
        let notifications = Arc::new(InMemoryNotificationStore::new());
        let artifacts = Arc::new(InMemoryArtifactStorage::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let worker = ExportWorker::new(
            store.clone(),
            Exporter::new(source),
            artifacts.clone(),
            NotificationEmitter::new(notifications.clone()),
            bus.clone(),
            config,
        );
        Fixture {
            worker,
            store,
            notifications,
            artifacts,
            bus,
        }
    }

    async fn pending(store: &InMemoryJobStore, owner: OwnerId, format: ExportFormat) -> ExportJob {
        store
            .insert(ExportJob::new(
                owner,
                ExportType::StudentData,
                format,
                Filters::new(),
                Utc::now(),
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn successful_export_completes_with_artifact() {
        let source = Arc::new(InMemoryDataSource::new());
        let owner = OwnerId::new();
        let mut row = Row::new();
        row.insert("name".into(), json!("Ada"));
        source.insert_rows(owner, ExportType::StudentData, vec![row]);

        let f = fixture(source, WorkerConfig::default());
        let mut events = f.bus.subscribe();
        let job = pending(&f.store, owner, ExportFormat::Csv).await;

        let done = f.worker.run_once().await.unwrap().unwrap();
        assert_eq!(done.id, job.id);
        assert_eq!(done.status, ExportStatus::Completed);
        let artifact_ref = done.artifact_ref.clone().unwrap();
        assert_eq!(artifact_ref, format!("memory://{owner}/{}.csv", job.id));
        assert_eq!(
            f.artifacts.content_type(&artifact_ref).as_deref(),
            Some("text/csv")
        );

        assert!(matches!(events.try_recv(), Some(ExportEvent::Claimed { .. })));
        assert!(matches!(events.try_recv(), Some(ExportEvent::Completed { .. })));

        let inbox = f.notifications.list(owner, 10).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationType::ExportCompleted);
        assert_eq!(f.worker.stats().jobs_completed, 1);
    }

    #[tokio::test]
    async fn source_error_becomes_failed_job() {
        let f = fixture(Arc::new(FailingSource), WorkerConfig::default());
        let owner = OwnerId::new();
        let job = pending(&f.store, owner, ExportFormat::Pdf).await;

        let done = f.worker.run_once().await.unwrap().unwrap();
        assert_eq!(done.status, ExportStatus::Failed);
        assert_eq!(
            done.error.as_deref(),
            Some("data source failed: gradebook unavailable")
        );
        assert!(done.artifact_ref.is_none());
        assert!(f.artifacts.is_empty());

        let stored = f.store.get(owner, job.id).await.unwrap();
        assert_eq!(stored.status, ExportStatus::Failed);

        let inbox = f.notifications.list(owner, 10).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationType::ExportFailed);
    }

    #[tokio::test]
    async fn panic_during_export_becomes_failed_job() {
        let f = fixture(Arc::new(PanickingSource), WorkerConfig::default());
        let owner = OwnerId::new();
        pending(&f.store, owner, ExportFormat::Csv).await;

        let done = f.worker.run_once().await.unwrap().unwrap();
        assert_eq!(done.status, ExportStatus::Failed);
        assert!(done.error.unwrap().contains("corrupt gradebook row"));
    }

    #[tokio::test]
    async fn already_claimed_job_is_rejected() {
        let f = fixture(Arc::new(InMemoryDataSource::new()), WorkerConfig::default());
        let owner = OwnerId::new();
        let job = pending(&f.store, owner, ExportFormat::Csv).await;
        f.store.claim(job.id).await.unwrap();

        assert!(matches!(
            f.worker.claim_and_process(job.id).await,
            Err(DomainError::InvalidTransition {
                from: ExportStatus::Processing,
                to: ExportStatus::Processing
            })
        ));
        assert!(f.notifications.list(owner, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_claim_is_logged_at_warn() {
        let f = fixture(Arc::new(InMemoryDataSource::new()), WorkerConfig::default());
        let owner = OwnerId::new();
        let job = pending(&f.store, owner, ExportFormat::Csv).await;
        f.store.claim(job.id).await.unwrap();

        let (logs, _guard) = capture_warnings();
        assert!(f.worker.claim_and_process(job.id).await.is_err());

        let text = logs.text();
        assert!(text.contains("WARN"), "{text}");
        assert!(text.contains("claim rejected"), "{text}");
        assert!(text.contains(&job.id.to_string()), "{text}");
        assert!(text.contains("from=processing"), "{text}");
        assert!(text.contains("to=processing"), "{text}");
    }

    #[tokio::test]
    async fn orphaned_artifact_delete_failure_is_logged() {
        let store = InMemoryJobStore::arc();
        let artifacts = Arc::new(UndeletableArtifacts::default());
        let notifications = Arc::new(InMemoryNotificationStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let worker = ExportWorker::new(
            store.clone(),
            Exporter::new(Arc::new(DeletingSource {
                store: store.clone(),
            })),
            artifacts.clone(),
            NotificationEmitter::new(notifications.clone()),
            bus,
            WorkerConfig::default(),
        );
        let owner = OwnerId::new();
        pending(&store, owner, ExportFormat::Csv).await;

        let (logs, _guard) = capture_warnings();
        assert_eq!(worker.run_once().await, Err(DomainError::NotFound));

        // The artifact could not be removed, and the failure is reported.
        assert_eq!(artifacts.inner.len(), 1);
        let text = logs.text();
        assert!(text.contains("failed to delete orphaned artifact"), "{text}");
        assert!(text.contains("read-only volume"), "{text}");
        assert!(notifications.list(owner, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn drain_handles_every_pending_job() {
        let f = fixture(Arc::new(InMemoryDataSource::new()), WorkerConfig::default());
        let owner = OwnerId::new();
        for _ in 0..3 {
            pending(&f.store, owner, ExportFormat::Csv).await;
        }
        assert_eq!(f.worker.drain().await, 3);
        assert_eq!(f.worker.drain().await, 0);
        assert_eq!(f.notifications.unread_count(owner).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn stuck_processing_jobs_are_failed() {
        let config = WorkerConfig::default().with_stuck_after(Duration::from_millis(10));
        let f = fixture(Arc::new(InMemoryDataSource::new()), config);
        let owner = OwnerId::new();
        let job = pending(&f.store, owner, ExportFormat::Csv).await;

        // A worker that claimed the job and then crashed.
        f.store.claim(job.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(f.worker.reclaim_stuck().await.unwrap(), 1);
        let stored = f.store.get(owner, job.id).await.unwrap();
        assert_eq!(stored.status, ExportStatus::Failed);
        assert!(stored.error.unwrap().starts_with("export timed out"));
        assert_eq!(f.worker.stats().jobs_reclaimed, 1);
        assert_eq!(f.notifications.unread_count(owner).await.unwrap(), 1);

        // Nothing left to reclaim.
        assert_eq!(f.worker.reclaim_stuck().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn spawned_worker_wakes_on_submission() {
        let config = WorkerConfig::default().with_poll_interval(Duration::from_secs(3600));
        let f = fixture(Arc::new(InMemoryDataSource::new()), config);
        let owner = OwnerId::new();
        let store = f.store.clone();
        let bus = f.bus.clone();
        let handle = f.worker.spawn();

        let job = pending(&store, owner, ExportFormat::Csv).await;
        bus.publish(ExportEvent::Submitted {
            job_id: job.id,
            owner_id: owner,
            export_type: job.export_type,
            occurred_at: Utc::now(),
        })
        .unwrap();

        let mut status = ExportStatus::Pending;
        for _ in 0..100 {
            status = store.get(owner, job.id).await.unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, ExportStatus::Completed);

        handle.shutdown().await;
    }
}
