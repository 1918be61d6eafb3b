//! Export jobs: closed enumerations and the monotonic status machine.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{ExportJobId, OwnerId};

/// Opaque filter mapping, interpreted only by the export worker.
pub type Filters = BTreeMap<String, serde_json::Value>;

/// What an export extracts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportType {
    StudentData,
    AssessmentResults,
    ProgressReports,
    ClassSummary,
    AnalyticsData,
}

impl ExportType {
    pub const ALL: [ExportType; 5] = [
        ExportType::StudentData,
        ExportType::AssessmentResults,
        ExportType::ProgressReports,
        ExportType::ClassSummary,
        ExportType::AnalyticsData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportType::StudentData => "student_data",
            ExportType::AssessmentResults => "assessment_results",
            ExportType::ProgressReports => "progress_reports",
            ExportType::ClassSummary => "class_summary",
            ExportType::AnalyticsData => "analytics_data",
        }
    }

    /// Human-readable label used in notification titles and report headers.
    pub fn label(&self) -> &'static str {
        match self {
            ExportType::StudentData => "Student data",
            ExportType::AssessmentResults => "Assessment results",
            ExportType::ProgressReports => "Progress reports",
            ExportType::ClassSummary => "Class summary",
            ExportType::AnalyticsData => "Analytics data",
        }
    }
}

impl core::fmt::Display for ExportType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExportType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown export_type: {s:?}")))
    }
}

/// Artifact format.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

impl core::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(ExportFormat::Csv),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(DomainError::validation(format!(
                "unknown export_format: {other:?}"
            ))),
        }
    }
}

/// Export job status.
///
/// Monotonic: `Pending → Processing → {Completed, Failed}`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Processing => "processing",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::Failed)
    }

    /// Whether `next` is the immediate successor of `self` in the status machine.
    pub fn can_transition_to(&self, next: ExportStatus) -> bool {
        matches!(
            (self, next),
            (ExportStatus::Pending, ExportStatus::Processing)
                | (ExportStatus::Processing, ExportStatus::Completed)
                | (ExportStatus::Processing, ExportStatus::Failed)
        )
    }
}

impl core::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted export request with a status lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: ExportJobId,
    pub owner_id: OwnerId,
    pub export_type: ExportType,
    pub format: ExportFormat,
    pub filters: Filters,
    pub status: ExportStatus,
    /// Set only when `status == Completed`.
    pub artifact_ref: Option<String>,
    /// Set only when `status == Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When a worker claimed the job (entered `Processing`).
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExportJob {
    /// Create a new `Pending` job.
    pub fn new(
        owner_id: OwnerId,
        export_type: ExportType,
        format: ExportFormat,
        filters: Filters,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ExportJobId::new(),
            owner_id,
            export_type,
            format,
            filters,
            status: ExportStatus::Pending,
            artifact_ref: None,
            error: None,
            created_at: now,
            claimed_at: None,
            completed_at: None,
        }
    }

    /// Apply a status transition, enforcing the status machine and the
    /// artifact invariant. On error the job is left untouched.
    pub fn apply_transition(
        &mut self,
        next: ExportStatus,
        artifact_ref: Option<String>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::invalid_transition(self.status, next));
        }

        match next {
            ExportStatus::Pending => {
                return Err(DomainError::invalid_transition(self.status, next));
            }
            ExportStatus::Processing => {
                self.claimed_at = Some(now);
            }
            ExportStatus::Completed => {
                let artifact = artifact_ref
                    .filter(|a| !a.trim().is_empty())
                    .ok_or_else(|| DomainError::invalid_transition(self.status, next))?;
                self.artifact_ref = Some(artifact);
                self.completed_at = Some(now);
            }
            ExportStatus::Failed => {
                let message = error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "export failed".to_string());
                self.error = Some(message);
                self.completed_at = Some(now);
            }
        }

        self.status = next;
        Ok(())
    }

    /// `artifact_ref` is non-empty iff the job is completed.
    pub fn artifact_invariant_holds(&self) -> bool {
        let has_artifact = self.artifact_ref.as_deref().is_some_and(|a| !a.is_empty());
        has_artifact == (self.status == ExportStatus::Completed)
    }
}

impl Entity for ExportJob {
    type Id = ExportJobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}
