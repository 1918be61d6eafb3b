//! `gradelens-core`: domain building blocks for the export pipeline.
//!
//! This crate contains **pure domain** types (no infrastructure concerns):
//! export jobs and their status machine, notifications, identifiers and the
//! shared error taxonomy.

pub mod entity;
pub mod error;
pub mod export;
pub mod id;
pub mod notification;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use export::{ExportFormat, ExportJob, ExportStatus, ExportType, Filters};
pub use id::{ExportJobId, NotificationId, OwnerId};
pub use notification::{Notification, NotificationType};
