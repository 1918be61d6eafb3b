//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gradelens_core::{DomainError, DomainResult, Entity, ExportJob, ExportJobId, ExportStatus, OwnerId};

/// Job store abstraction.
///
/// Owner-scoped reads (`get`, `list`, `delete`) report rows of another owner
/// as `NotFound`. Worker-side writes (`transition`, `claim*`) are not scoped.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job. The job must be `Pending` and carry no claim,
    /// outcome or artifact yet.
    async fn insert(&self, job: ExportJob) -> DomainResult<ExportJob>;

    async fn get(&self, owner_id: OwnerId, job_id: ExportJobId) -> DomainResult<ExportJob>;

    /// All jobs of an owner, newest first.
    async fn list(&self, owner_id: OwnerId) -> DomainResult<Vec<ExportJob>>;

    /// Remove a job, returning the removed row.
    async fn delete(&self, owner_id: OwnerId, job_id: ExportJobId) -> DomainResult<ExportJob>;

    /// Move a job to `next`, enforcing the monotonic status machine.
    async fn transition(
        &self,
        job_id: ExportJobId,
        next: ExportStatus,
        artifact_ref: Option<String>,
        error: Option<String>,
    ) -> DomainResult<ExportJob>;

    /// Claim a specific job (`Pending → Processing`). Exactly one of any number
    /// of concurrent claims on the same job succeeds.
    async fn claim(&self, job_id: ExportJobId) -> DomainResult<ExportJob> {
        self.transition(job_id, ExportStatus::Processing, None, None)
            .await
    }

    /// Claim the oldest pending job, if any.
    async fn claim_next(&self) -> DomainResult<Option<ExportJob>>;

    /// `Processing` jobs claimed before `claimed_before`.
    async fn list_stuck(&self, claimed_before: DateTime<Utc>) -> DomainResult<Vec<ExportJob>>;
}

/// In-memory job store for tests/dev.
///
/// Every mutation happens under one write lock, which makes the status check
/// and the status write of a claim a single compare-and-swap.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<ExportJobId, ExportJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> DomainResult<RwLockReadGuard<'_, HashMap<ExportJobId, ExportJob>>> {
        self.jobs
            .read()
            .map_err(|_| DomainError::storage("job store lock poisoned"))
    }

    fn write(&self) -> DomainResult<RwLockWriteGuard<'_, HashMap<ExportJobId, ExportJob>>> {
        self.jobs
            .write()
            .map_err(|_| DomainError::storage("job store lock poisoned"))
    }
}

/// First lifecycle field a pending job should not carry yet.
fn premature_field(job: &ExportJob) -> Option<&'static str> {
    if job.artifact_ref.is_some() || !job.artifact_invariant_holds() {
        Some("artifact_ref")
    } else if job.error.is_some() {
        Some("error")
    } else if job.claimed_at.is_some() {
        Some("claimed_at")
    } else if job.completed_at.is_some() {
        Some("completed_at")
    } else {
        None
    }
}

fn newest_first(jobs: &mut [ExportJob]) {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: ExportJob) -> DomainResult<ExportJob> {
        if job.status != ExportStatus::Pending {
            return Err(DomainError::invalid_transition(
                job.status,
                ExportStatus::Pending,
            ));
        }
        if let Some(field) = premature_field(&job) {
            return Err(DomainError::validation(format!(
                "new job {} must not have {field} set",
                job.id
            )));
        }
        let mut jobs = self.write()?;
        if jobs.contains_key(&job.id) {
            return Err(DomainError::validation(format!(
                "job already exists: {}",
                job.id
            )));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, owner_id: OwnerId, job_id: ExportJobId) -> DomainResult<ExportJob> {
        let jobs = self.read()?;
        jobs.get(&job_id)
            .filter(|j| j.is_owned_by(owner_id))
            .cloned()
            .ok_or(DomainError::NotFound)
    }

    async fn list(&self, owner_id: OwnerId) -> DomainResult<Vec<ExportJob>> {
        let jobs = self.read()?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.is_owned_by(owner_id))
            .cloned()
            .collect();
        newest_first(&mut result);
        Ok(result)
    }

    async fn delete(&self, owner_id: OwnerId, job_id: ExportJobId) -> DomainResult<ExportJob> {
        let mut jobs = self.write()?;
        match jobs.get(&job_id) {
            Some(job) if job.is_owned_by(owner_id) => {}
            _ => return Err(DomainError::NotFound),
        }
        jobs.remove(&job_id).ok_or(DomainError::NotFound)
    }

    async fn transition(
        &self,
        job_id: ExportJobId,
        next: ExportStatus,
        artifact_ref: Option<String>,
        error: Option<String>,
    ) -> DomainResult<ExportJob> {
        let mut jobs = self.write()?;
        let job = jobs.get_mut(&job_id).ok_or(DomainError::NotFound)?;
        job.apply_transition(next, artifact_ref, error, Utc::now())?;
        Ok(job.clone())
    }

    async fn claim_next(&self) -> DomainResult<Option<ExportJob>> {
        let mut jobs = self.write()?;

        // FIFO: oldest pending first.
        let next_id = jobs
            .values()
            .filter(|j| j.status == ExportStatus::Pending)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|j| j.id);

        let Some(job_id) = next_id else {
            return Ok(None);
        };
        let job = jobs.get_mut(&job_id).ok_or(DomainError::NotFound)?;
        job.apply_transition(ExportStatus::Processing, None, None, Utc::now())?;
        Ok(Some(job.clone()))
    }

    async fn list_stuck(&self, claimed_before: DateTime<Utc>) -> DomainResult<Vec<ExportJob>> {
        let jobs = self.read()?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| {
                j.status == ExportStatus::Processing
                    && j.claimed_at.is_some_and(|at| at < claimed_before)
            })
            .cloned()
            .collect();
        result.sort_by_key(|j| j.claimed_at);
        Ok(result)
    }
}
