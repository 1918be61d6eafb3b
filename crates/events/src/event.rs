use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gradelens_core::{ExportJobId, ExportType, OwnerId};

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "export.submitted").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred.
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Export job lifecycle facts, published after the job store has accepted
/// the corresponding write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExportEvent {
    Submitted {
        job_id: ExportJobId,
        owner_id: OwnerId,
        export_type: ExportType,
        occurred_at: DateTime<Utc>,
    },
    Claimed {
        job_id: ExportJobId,
        owner_id: OwnerId,
        worker_id: String,
        occurred_at: DateTime<Utc>,
    },
    Completed {
        job_id: ExportJobId,
        owner_id: OwnerId,
        artifact_ref: String,
        occurred_at: DateTime<Utc>,
    },
    Failed {
        job_id: ExportJobId,
        owner_id: OwnerId,
        error: String,
        occurred_at: DateTime<Utc>,
    },
    Deleted {
        job_id: ExportJobId,
        owner_id: OwnerId,
        occurred_at: DateTime<Utc>,
    },
}

impl ExportEvent {
    pub fn job_id(&self) -> ExportJobId {
        match self {
            ExportEvent::Submitted { job_id, .. }
            | ExportEvent::Claimed { job_id, .. }
            | ExportEvent::Completed { job_id, .. }
            | ExportEvent::Failed { job_id, .. }
            | ExportEvent::Deleted { job_id, .. } => *job_id,
        }
    }

    pub fn owner_id(&self) -> OwnerId {
        match self {
            ExportEvent::Submitted { owner_id, .. }
            | ExportEvent::Claimed { owner_id, .. }
            | ExportEvent::Completed { owner_id, .. }
            | ExportEvent::Failed { owner_id, .. }
            | ExportEvent::Deleted { owner_id, .. } => *owner_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportEvent::Completed { .. } | ExportEvent::Failed { .. })
    }
}

impl Event for ExportEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ExportEvent::Submitted { .. } => "export.submitted",
            ExportEvent::Claimed { .. } => "export.claimed",
            ExportEvent::Completed { .. } => "export.completed",
            ExportEvent::Failed { .. } => "export.failed",
            ExportEvent::Deleted { .. } => "export.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ExportEvent::Submitted { occurred_at, .. }
            | ExportEvent::Claimed { occurred_at, .. }
            | ExportEvent::Completed { occurred_at, .. }
            | ExportEvent::Failed { occurred_at, .. }
            | ExportEvent::Deleted { occurred_at, .. } => *occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let ev = ExportEvent::Deleted {
            job_id: ExportJobId::new(),
            owner_id: OwnerId::new(),
            occurred_at: Utc::now(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "deleted");
        assert_eq!(ev.event_type(), "export.deleted");
        assert!(!ev.is_terminal());
    }
}
