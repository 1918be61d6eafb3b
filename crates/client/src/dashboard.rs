//! Dashboard client: export history and notifications behind the query cache.

use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use gradelens_core::{
    DomainError, DomainResult, ExportJob, ExportJobId, Notification, NotificationId, OwnerId,
};
use gradelens_events::{EventBus, ExportEvent};
use gradelens_infra::notifications::DEFAULT_LIST_LIMIT;
use gradelens_infra::{ExportRequest, ExportService, NotificationInbox};

use crate::download::{Download, download_filename};
use crate::query_cache::QueryCache;
use crate::types::{CachedQueryResult, QueryOptions};

pub fn jobs_key(owner_id: OwnerId) -> String {
    format!("jobs:{owner_id}")
}

pub fn notifications_key(owner_id: OwnerId) -> String {
    format!("notifications:{owner_id}")
}

pub fn unread_key(owner_id: OwnerId) -> String {
    format!("unread:{owner_id}")
}

/// One owner's view of the pipeline.
///
/// Reads go through the query cache; every mutation invalidates the keys it
/// affects, so the next read refetches.
pub struct DashboardClient<B> {
    owner_id: OwnerId,
    exports: ExportService<B>,
    inbox: NotificationInbox,
    jobs: QueryCache<Vec<ExportJob>>,
    notifications: QueryCache<Vec<Notification>>,
    unread: QueryCache<usize>,
    options: QueryOptions,
}

impl<B> DashboardClient<B>
where
    B: EventBus<ExportEvent> + Clone + 'static,
{
    pub fn new(owner_id: OwnerId, exports: ExportService<B>, inbox: NotificationInbox) -> Self {
        Self {
            owner_id,
            exports,
            inbox,
            jobs: QueryCache::new(),
            notifications: QueryCache::new(),
            unread: QueryCache::new(),
            options: QueryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    // ---- exports ----

    /// Cached export history, newest first.
    pub fn jobs(&self) -> CachedQueryResult<Vec<ExportJob>> {
        self.jobs
            .read(&jobs_key(self.owner_id), self.list_jobs(), self.options.clone())
    }

    pub async fn refresh_jobs(&self) -> CachedQueryResult<Vec<ExportJob>> {
        self.jobs
            .fetch(&jobs_key(self.owner_id), self.list_jobs(), self.options.clone())
            .await
    }

    fn list_jobs(
        &self,
    ) -> impl Fn() -> BoxFuture<'static, DomainResult<Vec<ExportJob>>>
    + Send
    + Sync
    + 'static {
        let exports = self.exports.clone();
        let owner_id = self.owner_id;
        move || {
            let exports = exports.clone();
            async move { exports.list(owner_id).await }.boxed()
        }
    }

    pub async fn submit(&self, request: ExportRequest) -> DomainResult<ExportJob> {
        let job = self.exports.submit(self.owner_id, request).await?;
        self.jobs.invalidate(&jobs_key(self.owner_id));
        Ok(job)
    }

    pub async fn delete_export(&self, job_id: ExportJobId) -> DomainResult<()> {
        self.exports.delete(self.owner_id, job_id).await?;
        self.jobs.invalidate(&jobs_key(self.owner_id));
        Ok(())
    }

    /// Poll the export history until `job_id` reaches a terminal status.
    ///
    /// Each round invalidates the history and refetches it. Bound the wait
    /// with `tokio::time::timeout`.
    pub async fn wait_for_export(&self, job_id: ExportJobId, poll: Duration) -> DomainResult<ExportJob> {
        let key = jobs_key(self.owner_id);
        loop {
            self.jobs.invalidate(&key);
            let result = self.refresh_jobs().await;
            if let Some(error) = result.error {
                debug!(key = %key, error = %error, "export history refresh failed; polling again");
            }
            match result
                .value
                .as_ref()
                .and_then(|jobs| jobs.iter().find(|j| j.id == job_id))
            {
                Some(job) if job.status.is_terminal() => return Ok(job.clone()),
                Some(_) => {}
                None if result.value.is_some() => return Err(DomainError::NotFound),
                None => {}
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Resolve a completed export for saving.
    pub async fn download(&self, job_id: ExportJobId) -> DomainResult<Download> {
        let (job, bytes) = self.exports.artifact(self.owner_id, job_id).await?;
        Ok(Download {
            filename: download_filename(job.export_type, job.format, Utc::now().date_naive()),
            content_type: job.format.content_type(),
            bytes,
        })
    }

    // ---- notifications ----

    pub fn notifications(&self) -> CachedQueryResult<Vec<Notification>> {
        self.notifications.read(
            &notifications_key(self.owner_id),
            self.list_notifications(),
            self.options.clone(),
        )
    }

    pub async fn refresh_notifications(&self) -> CachedQueryResult<Vec<Notification>> {
        self.notifications
            .fetch(
                &notifications_key(self.owner_id),
                self.list_notifications(),
                self.options.clone(),
            )
            .await
    }

    fn list_notifications(
        &self,
    ) -> impl Fn() -> BoxFuture<'static, DomainResult<Vec<Notification>>>
    + Send
    + Sync
    + 'static {
        let inbox = self.inbox.clone();
        let owner_id = self.owner_id;
        move || {
            let inbox = inbox.clone();
            async move { inbox.list(owner_id, DEFAULT_LIST_LIMIT).await }.boxed()
        }
    }

    /// Badge count.
    pub fn unread_count(&self) -> CachedQueryResult<usize> {
        self.unread
            .read(&unread_key(self.owner_id), self.count_unread(), self.options.clone())
    }

    pub async fn refresh_unread_count(&self) -> CachedQueryResult<usize> {
        self.unread
            .fetch(&unread_key(self.owner_id), self.count_unread(), self.options.clone())
            .await
    }

    fn count_unread(
        &self,
    ) -> impl Fn() -> BoxFuture<'static, DomainResult<usize>> + Send + Sync + 'static
    {
        let inbox = self.inbox.clone();
        let owner_id = self.owner_id;
        move || {
            let inbox = inbox.clone();
            async move { inbox.unread_count(owner_id).await }.boxed()
        }
    }

    pub async fn mark_read(&self, id: NotificationId) -> DomainResult<Notification> {
        let notification = self.inbox.mark_read(self.owner_id, id).await?;
        self.invalidate_notifications();
        Ok(notification)
    }

    pub async fn mark_all_read(&self) -> DomainResult<usize> {
        let changed = self.inbox.mark_all_read(self.owner_id).await?;
        self.invalidate_notifications();
        Ok(changed)
    }

    pub async fn delete_notification(&self, id: NotificationId) -> DomainResult<()> {
        self.inbox.delete(self.owner_id, id).await?;
        self.invalidate_notifications();
        Ok(())
    }

    fn invalidate_notifications(&self) {
        self.notifications
            .invalidate(&notifications_key(self.owner_id));
        self.unread.invalidate(&unread_key(self.owner_id));
    }

    // ---- lifecycle ----

    /// The dashboard regained focus.
    pub fn on_focus(&self) -> usize {
        self.jobs.on_focus() + self.notifications.on_focus() + self.unread.on_focus()
    }

    /// Mark every query of this owner stale.
    pub fn invalidate_all(&self) {
        self.jobs.invalidate(&jobs_key(self.owner_id));
        self.invalidate_notifications();
    }
}

impl<B> core::fmt::Debug for DashboardClient<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DashboardClient")
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}
