//! In-memory wiring of the export pipeline (dev/test).

use std::sync::Arc;

use gradelens_events::{ExportEvent, InMemoryEventBus};

use crate::artifacts::ArtifactStorage;
use crate::jobs::{
    DomainDataSource, ExportService, ExportWorker, Exporter, InMemoryJobStore, WorkerConfig,
};
use crate::notifications::{InMemoryNotificationStore, NotificationEmitter, NotificationInbox};

pub type ExportBus = Arc<InMemoryEventBus<ExportEvent>>;

/// Stores, bus and services sharing one set of in-memory backends.
pub struct Pipeline {
    pub jobs: Arc<InMemoryJobStore>,
    pub notifications: Arc<InMemoryNotificationStore>,
    pub artifacts: Arc<dyn ArtifactStorage>,
    pub bus: ExportBus,
    pub service: ExportService<ExportBus>,
    pub inbox: NotificationInbox,
    pub emitter: NotificationEmitter,
    exporter: Exporter,
}

impl Pipeline {
    pub fn in_memory(source: Arc<dyn DomainDataSource>, artifacts: Arc<dyn ArtifactStorage>) -> Self {
        let jobs = InMemoryJobStore::arc();
        let notifications = Arc::new(InMemoryNotificationStore::new());
        let bus: ExportBus = Arc::new(InMemoryEventBus::new());

        let service = ExportService::new(jobs.clone(), artifacts.clone(), bus.clone());
        let inbox = NotificationInbox::new(notifications.clone());
        let emitter = NotificationEmitter::new(notifications.clone());

        Self {
            jobs,
            notifications,
            artifacts,
            bus,
            service,
            inbox,
            emitter,
            exporter: Exporter::new(source),
        }
    }

    /// A worker over this pipeline's stores. Several workers may run at once;
    /// each job is still claimed by exactly one of them.
    pub fn worker(&self, config: WorkerConfig) -> ExportWorker<ExportBus> {
        ExportWorker::new(
            self.jobs.clone(),
            self.exporter.clone(),
            self.artifacts.clone(),
            self.emitter.clone(),
            self.bus.clone(),
            config,
        )
    }
}

impl core::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}
