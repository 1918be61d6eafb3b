//! Client-facing side of the job store: submission, lookup and deletion.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gradelens_core::{
    DomainError, DomainResult, ExportFormat, ExportJob, ExportJobId, ExportType, Filters, OwnerId,
};
use gradelens_events::{Event, EventBus, ExportEvent};

use crate::artifacts::ArtifactStorage;

use super::store::JobStore;

/// Export submission payload as received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub export_type: String,
    pub export_format: String,
    #[serde(default)]
    pub filters: Filters,
}

impl ExportRequest {
    pub fn new(export_type: impl Into<String>, export_format: impl Into<String>) -> Self {
        Self {
            export_type: export_type.into(),
            export_format: export_format.into(),
            filters: Filters::new(),
        }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.filters.insert(key.into(), value);
        self
    }
}

/// Submission, lookup and deletion of export jobs.
///
/// Submission persists the job and publishes `ExportEvent::Submitted` as the
/// worker's wake-up signal; it never waits for processing.
pub struct ExportService<B> {
    store: Arc<dyn JobStore>,
    artifacts: Arc<dyn ArtifactStorage>,
    bus: B,
}

impl<B: Clone> Clone for ExportService<B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            artifacts: self.artifacts.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<B> ExportService<B>
where
    B: EventBus<ExportEvent>,
{
    pub fn new(store: Arc<dyn JobStore>, artifacts: Arc<dyn ArtifactStorage>, bus: B) -> Self {
        Self {
            store,
            artifacts,
            bus,
        }
    }

    /// Validate and persist a new `pending` job, then signal the worker.
    ///
    /// Unknown `export_type`/`export_format` values fail with
    /// `DomainError::Validation` before anything is written.
    pub async fn submit(&self, owner_id: OwnerId, request: ExportRequest) -> DomainResult<ExportJob> {
        let export_type: ExportType = request.export_type.parse()?;
        let format: ExportFormat = request.export_format.parse()?;
        self.submit_typed(owner_id, export_type, format, request.filters)
            .await
    }

    pub async fn submit_typed(
        &self,
        owner_id: OwnerId,
        export_type: ExportType,
        format: ExportFormat,
        filters: Filters,
    ) -> DomainResult<ExportJob> {
        let now = Utc::now();
        let job = self
            .store
            .insert(ExportJob::new(owner_id, export_type, format, filters, now))
            .await?;

        info!(
            job_id = %job.id,
            owner_id = %owner_id,
            export_type = %export_type,
            format = %format,
            "export submitted"
        );
        self.publish(ExportEvent::Submitted {
            job_id: job.id,
            owner_id,
            export_type,
            occurred_at: now,
        });

        Ok(job)
    }

    pub async fn get(&self, owner_id: OwnerId, job_id: ExportJobId) -> DomainResult<ExportJob> {
        self.store.get(owner_id, job_id).await
    }

    /// Jobs of an owner, newest first.
    pub async fn list(&self, owner_id: OwnerId) -> DomainResult<Vec<ExportJob>> {
        self.store.list(owner_id).await
    }

    /// Delete a job. A completed job's artifact is removed as well
    /// (best-effort: a failed artifact delete is logged, not surfaced).
    pub async fn delete(&self, owner_id: OwnerId, job_id: ExportJobId) -> DomainResult<()> {
        let removed = self.store.delete(owner_id, job_id).await?;

        if let Some(artifact_ref) = removed.artifact_ref.as_deref() {
            if let Err(err) = self.artifacts.delete(artifact_ref).await {
                warn!(job_id = %job_id, artifact_ref, error = %err, "failed to delete artifact");
            }
        }

        info!(job_id = %job_id, owner_id = %owner_id, status = %removed.status, "export deleted");
        self.publish(ExportEvent::Deleted {
            job_id,
            owner_id,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Resolve a completed job's artifact bytes.
    pub async fn artifact(
        &self,
        owner_id: OwnerId,
        job_id: ExportJobId,
    ) -> DomainResult<(ExportJob, Vec<u8>)> {
        let job = self.store.get(owner_id, job_id).await?;
        let artifact_ref = job.artifact_ref.clone().ok_or_else(|| {
            DomainError::validation(format!("export {job_id} is {}, no artifact yet", job.status))
        })?;
        let bytes = self.artifacts.get(&artifact_ref).await?;
        Ok((job, bytes))
    }

    fn publish(&self, event: ExportEvent) {
        let event_type = event.event_type();
        match self.bus.publish(event) {
            Ok(receivers) => debug!(event_type, receivers, "published export event"),
            Err(err) => warn!(event_type, error = ?err, "failed to publish export event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use gradelens_core::ExportStatus;
    use gradelens_events::InMemoryEventBus;
    use serde_json::json;

    use super::*;
    use crate::artifacts::InMemoryArtifactStorage;
    use crate::jobs::InMemoryJobStore;

    type Bus = Arc<InMemoryEventBus<ExportEvent>>;

    fn service() -> (ExportService<Bus>, Arc<InMemoryJobStore>, Bus, Arc<InMemoryArtifactStorage>) {
        let store = InMemoryJobStore::arc();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let artifacts = Arc::new(InMemoryArtifactStorage::new());
        let service = ExportService::new(store.clone(), artifacts.clone(), bus.clone());
        (service, store, bus, artifacts)
    }

    #[tokio::test]
    async fn submit_persists_pending_and_signals() {
        let (service, _, bus, _) = service();
        let mut sub = bus.subscribe();
        let owner = OwnerId::new();

        let job = service
            .submit(
                owner,
                ExportRequest::new("student_data", "csv").with_filter("class", json!("7A")),
            )
            .await
            .unwrap();

        assert_eq!(job.status, ExportStatus::Pending);
        assert_eq!(job.export_type, ExportType::StudentData);
        assert_eq!(job.filters["class"], json!("7A"));
        assert!(job.artifact_ref.is_none());

        match sub.try_recv() {
            Some(ExportEvent::Submitted { job_id, owner_id, .. }) => {
                assert_eq!(job_id, job.id);
                assert_eq!(owner_id, owner);
            }
            other => panic!("expected Submitted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bogus_export_type_creates_no_row() {
        let (service, _, bus, _) = service();
        let mut sub = bus.subscribe();
        let owner = OwnerId::new();

        let err = service
            .submit(owner, ExportRequest::new("bogus", "csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = service
            .submit(owner, ExportRequest::new("student_data", "docx"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        assert!(service.list(owner).await.unwrap().is_empty());
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn request_deserializes_without_filters() {
        let req: ExportRequest =
            serde_json::from_value(json!({"export_type": "class_summary", "export_format": "pdf"}))
                .unwrap();
        assert!(req.filters.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_row_and_artifact() {
        let (service, store, _, artifacts) = service();
        let owner = OwnerId::new();
        let job = service
            .submit(owner, ExportRequest::new("analytics_data", "csv"))
            .await
            .unwrap();

        let artifact_ref = artifacts.put("k.csv", b"x".to_vec(), "text/csv").await.unwrap();
        store.claim(job.id).await.unwrap();
        store
            .transition(job.id, ExportStatus::Completed, Some(artifact_ref.clone()), None)
            .await
            .unwrap();

        let (_, bytes) = service.artifact(owner, job.id).await.unwrap();
        assert_eq!(bytes, b"x");

        service.delete(owner, job.id).await.unwrap();
        assert!(artifacts.is_empty());
        assert_eq!(service.get(owner, job.id).await, Err(DomainError::NotFound));
        assert_eq!(service.delete(owner, job.id).await, Err(DomainError::NotFound));
    }

    #[tokio::test]
    async fn artifact_of_pending_job_is_a_validation_error() {
        let (service, _, _, _) = service();
        let owner = OwnerId::new();
        let job = service
            .submit(owner, ExportRequest::new("student_data", "pdf"))
            .await
            .unwrap();
        assert!(matches!(
            service.artifact(owner, job.id).await,
            Err(DomainError::Validation(_))
        ));
    }
}
