//! Infrastructure layer: job and notification stores, the export worker,
//! artifact storage, configuration and the worker binary's ingress.

pub mod artifacts;
pub mod config;
pub mod ingress;
pub mod jobs;
pub mod notifications;
pub mod pipeline;


pub use artifacts::{ArtifactError, ArtifactStorage, FsArtifactStorage, InMemoryArtifactStorage};
pub use config::{ConfigError, PipelineConfig};
pub use ingress::{IngressStats, seed_data_source, submit_lines};
pub use jobs::{
    DomainDataSource, ExportError, ExportRequest, ExportService, ExportWorker, Exporter,
    InMemoryDataSource, InMemoryJobStore, JobStore, Row, WorkerConfig, WorkerHandle, WorkerStats,
};
pub use notifications::{
    InMemoryNotificationStore, NotificationEmitter, NotificationInbox, NotificationStore,
};
pub use pipeline::{ExportBus, Pipeline};
