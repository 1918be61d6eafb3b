//! Export jobs: submission, storage, rendering and the background worker.
//!
//! ## Flow
//!
//! - `ExportService::submit` persists a `pending` job and publishes
//!   `ExportEvent::Submitted`
//! - `ExportWorker` claims it (`pending → processing`), renders the artifact
//!   with `Exporter` and stores it
//! - the job ends `completed` with an artifact reference, or `failed` with an
//!   error message; either way the owner gets exactly one notification
//!
//! Status only ever moves forward. A `processing` job whose worker vanished is
//! failed by the worker's periodic sweep once it is older than `stuck_after`.

pub mod exporter;
pub mod service;
pub mod store;
pub mod worker;

pub use exporter::{DomainDataSource, ExportError, Exporter, InMemoryDataSource, Row};
pub use service::{ExportRequest, ExportService};
pub use store::{InMemoryJobStore, JobStore};
pub use worker::{ExportWorker, WorkerConfig, WorkerHandle, WorkerStats};
