//! Error types for refacl

use thiserror::Error;

/// The main error type for access-control operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    #[error("invalid ref pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("group {0:?} not found")]
    NoSuchGroup(String),

    #[error("stale base revision {expected}, project is now at {actual}")]
    StaleBase { expected: String, actual: String },

    #[error("project {0:?} not found")]
    NoSuchProject(String),

    #[error("project {0:?} already exists")]
    ProjectExists(String),

    #[error("revision {0} not found")]
    NoSuchRevision(String),

    #[error("unknown permission {0:?}")]
    InvalidPermission(String),

    #[error("invalid section: {0}")]
    InvalidSection(String),

    #[error("invalid parent: {0}")]
    InvalidParent(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("settings error: {0}")]
    Settings(String),
}

impl AclError {
    pub(crate) fn pattern(pattern: &str, reason: impl Into<String>) -> Self {
        AclError::InvalidPattern { pattern: pattern.to_string(), reason: reason.into() }
    }
}

impl From<serde_json::Error> for AclError {
    fn from(e: serde_json::Error) -> Self {
        AclError::Serialization(e.to_string())
    }
}

/// Result type alias for refacl operations
pub type Result<T> = std::result::Result<T, AclError>;

/// Convert any storage-layer error to AclError
pub fn err<E: std::error::Error>(e: E) -> AclError {
    AclError::Storage(e.to_string())
}
