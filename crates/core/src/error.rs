//! Domain error model.

use thiserror::Error;

use crate::export::ExportStatus;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every store, worker and inbox operation surfaces one of these kinds to its
/// caller. `NotFound` deliberately carries no identifier: a row owned by another
/// identity is reported exactly like a missing row.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input outside a closed enumeration (or otherwise malformed).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing, or owned by a different identity.
    #[error("not found")]
    NotFound,

    /// Status-machine violation. Indicates a worker or caller bug.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: ExportStatus, to: ExportStatus },

    /// The export worker's own processing failure.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Backing storage failed (lock poisoning, IO).
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(from: ExportStatus, to: ExportStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Stable machine-readable code, used in logs and client payloads.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::NotFound => "not_found",
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::Upstream(_) => "upstream_failure",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::Storage(_) => "storage_error",
        }
    }
}
