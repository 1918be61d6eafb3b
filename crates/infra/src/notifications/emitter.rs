use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use gradelens_core::{
    DomainError, DomainResult, ExportJob, ExportStatus, Notification, NotificationType, OwnerId,
};

use super::store::NotificationStore;

/// Creates notification records for system events.
///
/// There is no de-duplication: each call creates one record. The export
/// worker calls [`NotificationEmitter::export_finished`] only after its own
/// terminal transition was accepted by the job store, and the status machine
/// accepts exactly one terminal transition per job.
#[derive(Clone)]
pub struct NotificationEmitter {
    store: Arc<dyn NotificationStore>,
}

impl NotificationEmitter {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    pub async fn emit(
        &self,
        owner_id: OwnerId,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        action_ref: Option<String>,
    ) -> DomainResult<Notification> {
        let notification = Notification::new(owner_id, kind, title, message, action_ref, Utc::now());
        self.emit_notification(notification).await
    }

    /// Persist a fully built notification (e.g. one carrying metadata).
    pub async fn emit_notification(&self, notification: Notification) -> DomainResult<Notification> {
        let stored = self.store.insert(notification).await?;
        debug!(
            owner_id = %stored.owner_id,
            notification_id = %stored.id,
            kind = %stored.kind,
            "notification emitted"
        );
        Ok(stored)
    }

    /// Notification for a job that reached `Completed` or `Failed`.
    pub async fn export_finished(&self, job: &ExportJob) -> DomainResult<Notification> {
        let label = job.export_type.label();
        let (kind, title, message) = match job.status {
            ExportStatus::Completed => (
                NotificationType::ExportCompleted,
                "Export ready".to_string(),
                format!("{label} export ({}) is ready to download.", job.format),
            ),
            ExportStatus::Failed => (
                NotificationType::ExportFailed,
                "Export failed".to_string(),
                format!(
                    "{label} export ({}) failed: {}",
                    job.format,
                    job.error.as_deref().unwrap_or("unknown error")
                ),
            ),
            other => {
                return Err(DomainError::validation(format!(
                    "job {} is {other}, not terminal",
                    job.id
                )));
            }
        };

        let mut notification = Notification::new(
            job.owner_id,
            kind,
            title,
            message,
            Some(format!("/exports/{}", job.id)),
            Utc::now(),
        )
        .with_metadata("job_id", json!(job.id))
        .with_metadata("export_type", json!(job.export_type))
        .with_metadata("format", json!(job.format));
        if let Some(artifact_ref) = &job.artifact_ref {
            notification = notification.with_metadata("artifact_ref", json!(artifact_ref));
        }

        self.emit_notification(notification).await
    }

    /// Notification for a generated report outside the export pipeline.
    pub async fn report_generated(
        &self,
        owner_id: OwnerId,
        report_name: &str,
        action_ref: Option<String>,
    ) -> DomainResult<Notification> {
        self.emit(
            owner_id,
            NotificationType::ReportGenerated,
            "Report generated",
            format!("{report_name} is available."),
            action_ref,
        )
        .await
    }
}

impl core::fmt::Debug for NotificationEmitter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NotificationEmitter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use gradelens_core::{ExportFormat, ExportType, Filters};

    use super::*;
    use crate::notifications::InMemoryNotificationStore;

    fn emitter() -> (NotificationEmitter, Arc<InMemoryNotificationStore>) {
        let store = Arc::new(InMemoryNotificationStore::new());
        (NotificationEmitter::new(store.clone()), store)
    }

    fn processing_job() -> ExportJob {
        let mut job = ExportJob::new(
            OwnerId::new(),
            ExportType::ProgressReports,
            ExportFormat::Pdf,
            Filters::new(),
            Utc::now(),
        );
        job.apply_transition(ExportStatus::Processing, None, None, Utc::now())
            .unwrap();
        job
    }

    #[tokio::test]
    async fn completed_job_yields_export_completed() {
        let (emitter, store) = emitter();
        let mut job = processing_job();
        job.apply_transition(
            ExportStatus::Completed,
            Some("memory://x.pdf".into()),
            None,
            Utc::now(),
        )
        .unwrap();

        let n = emitter.export_finished(&job).await.unwrap();
        assert_eq!(n.kind, NotificationType::ExportCompleted);
        assert_eq!(n.action_ref, Some(format!("/exports/{}", job.id)));
        assert_eq!(n.metadata["artifact_ref"], json!("memory://x.pdf"));
        assert!(n.message.starts_with("Progress reports export (pdf)"));
        assert_eq!(store.unread_count(job.owner_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_job_carries_error_message() {
        let (emitter, _) = emitter();
        let mut job = processing_job();
        job.apply_transition(ExportStatus::Failed, None, Some("no rows".into()), Utc::now())
            .unwrap();

        let n = emitter.export_finished(&job).await.unwrap();
        assert_eq!(n.kind, NotificationType::ExportFailed);
        assert!(n.message.ends_with("failed: no rows"));
    }

    #[tokio::test]
    async fn non_terminal_job_is_rejected() {
        let (emitter, store) = emitter();
        let job = processing_job();
        assert!(matches!(
            emitter.export_finished(&job).await,
            Err(DomainError::Validation(_))
        ));
        assert_eq!(store.unread_count(job.owner_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn report_generated_is_a_plain_emit() {
        let (emitter, store) = emitter();
        let owner = OwnerId::new();
        let n = emitter
            .report_generated(owner, "Term 2 report cards", Some("/reports/term-2".into()))
            .await
            .unwrap();
        assert_eq!(n.kind, NotificationType::ReportGenerated);
        assert_eq!(store.list(owner, 10).await.unwrap().len(), 1);
    }
}
