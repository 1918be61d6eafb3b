//! Notifications: system-originated messages with one-way read tracking.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::DomainError;
use crate::id::{NotificationId, OwnerId};

/// Kind of triggering event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ExportCompleted,
    ExportFailed,
    ReportGenerated,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ExportCompleted => "export_completed",
            NotificationType::ExportFailed => "export_failed",
            NotificationType::ReportGenerated => "report_generated",
            NotificationType::System => "system",
        }
    }
}

impl core::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "export_completed" => Ok(NotificationType::ExportCompleted),
            "export_failed" => Ok(NotificationType::ExportFailed),
            "report_generated" => Ok(NotificationType::ReportGenerated),
            "system" => Ok(NotificationType::System),
            other => Err(DomainError::validation(format!(
                "unknown notification type: {other:?}"
            ))),
        }
    }
}

/// A notification record.
///
/// `is_read` only ever moves `false → true`; see [`Notification::mark_read`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub owner_id: OwnerId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    /// Optional deep-link target.
    pub action_ref: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        owner_id: OwnerId,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        action_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            owner_id,
            kind,
            title: title.into(),
            message: message.into(),
            is_read: false,
            action_ref,
            metadata: BTreeMap::new(),
            created_at: now,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Mark as read. Returns `true` if the state changed.
    pub fn mark_read(&mut self) -> bool {
        let changed = !self.is_read;
        self.is_read = true;
        changed
    }
}

impl Entity for Notification {
    type Id = NotificationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_read_is_one_way() {
        let mut n = Notification::new(
            OwnerId::new(),
            NotificationType::System,
            "t",
            "m",
            None,
            Utc::now(),
        );
        assert!(n.mark_read());
        assert!(!n.mark_read());
        assert!(n.is_read);
    }

    #[test]
    fn serializes_kind_as_type() {
        let n = Notification::new(
            OwnerId::new(),
            NotificationType::ExportCompleted,
            "Export ready",
            "done",
            Some("/exports".into()),
            Utc::now(),
        );
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "export_completed");
        assert_eq!(json["is_read"], false);
    }
}
