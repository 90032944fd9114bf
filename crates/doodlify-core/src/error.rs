//! Error taxonomy shared by every doodlify crate.
//!
//! Library seams return `anyhow::Result`; the typed [`DoodlifyError`] travels
//! inside it so callers can `downcast_ref` to decide between per-unit recording
//! and aborting the phase. [`ErrorKind`] is the serializable projection stored in
//! the ledger and in phase reports.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DoodlifyError {
    /// Unreadable or invalid configuration. Fatal before any mutation.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// An external collaborator (git, hosting API, transform command) failed.
    #[error("{collaborator} unavailable: {message}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        message: String,
    },

    /// A single file transformation failed.
    #[error("transform failed for {path}: {message}")]
    TransformFailure { path: String, message: String },

    /// Restore was requested for a file without a backup sibling.
    #[error("no backup found for {}", path.display())]
    BackupMissing { path: PathBuf },

    /// Push was requested for an event that already has a pull request.
    #[error("event \"{event_id}\" is already pushed")]
    AlreadyPushed { event_id: String },

    #[error("event not found: \"{event_id}\"")]
    EventNotFound { event_id: String },
}

impl DoodlifyError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            collaborator,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::CollaboratorUnavailable { .. } => ErrorKind::CollaboratorUnavailable,
            Self::TransformFailure { .. } => ErrorKind::TransformFailure,
            Self::BackupMissing { .. } => ErrorKind::BackupMissing,
            Self::AlreadyPushed { .. } => ErrorKind::AlreadyPushed,
            Self::EventNotFound { .. } => ErrorKind::Configuration,
        }
    }
}

/// Serializable error classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    CollaboratorUnavailable,
    TransformFailure,
    BackupMissing,
    AlreadyPushed,
    /// Uncommitted workspace changes were stashed before a branch switch.
    WorkspaceStashed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl ErrorKind {
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::WorkspaceStashed | ErrorKind::AlreadyPushed => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Classify an arbitrary error, falling back to `fallback` when it does not
    /// carry a [`DoodlifyError`].
    pub fn of(err: &anyhow::Error, fallback: ErrorKind) -> ErrorKind {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<DoodlifyError>())
            .map(DoodlifyError::kind)
            .unwrap_or(fallback)
    }
}
