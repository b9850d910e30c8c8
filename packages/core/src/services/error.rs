//! Service Layer Error Types
//!
//! One error enum per service surface. Storage and collaborator errors are
//! wrapped; business rule violations get their own variants so callers (and the
//! merge worker's retry policy) can tell them apart.

use crate::blob::BlobError;
use crate::db::DatabaseError;
use crate::mq::QueueError;
use crate::operations::PathError;
use thiserror::Error;

/// Namespace engine errors
#[derive(Error, Debug)]
pub enum NamespaceError {
    /// Malformed input; nothing was read or written
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Caller may not act on the addressed tenant
    #[error("Caller '{caller}' is not authorized for tenant '{tenant}'")]
    Unauthorized { caller: String, tenant: String },

    /// The graph's current shape refuses the operation
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database operation failed: {0}")]
    Database(DatabaseError),
}

impl NamespaceError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an unauthorized error for `caller` acting on `tenant`
    pub fn unauthorized(caller: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self::Unauthorized {
            caller: caller.into(),
            tenant: tenant.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Only storage failures are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<DatabaseError> for NamespaceError {
    fn from(err: DatabaseError) -> Self {
        if err.is_constraint_violation() {
            Self::Conflict(err.to_string())
        } else {
            Self::Database(err)
        }
    }
}

impl From<PathError> for NamespaceError {
    fn from(err: PathError) -> Self {
        if err.is_conflict() {
            Self::Conflict(err.to_string())
        } else {
            Self::Validation(err.to_string())
        }
    }
}

/// Merge failure classes driving the worker's retry policy
#[derive(Error, Debug)]
pub enum MergeError {
    /// Retrying cannot help; dead-letter immediately
    #[error("Permanent merge failure: {0}")]
    Permanent(String),

    /// Retry after backoff
    #[error("Transient merge failure: {0}")]
    Transient(String),
}

impl MergeError {
    /// Create a permanent merge failure
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Create a transient merge failure
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Whether the worker should retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<NamespaceError> for MergeError {
    fn from(err: NamespaceError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

impl From<BlobError> for MergeError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidKey(_) => Self::Permanent(err.to_string()),
            // Missing chunks may still be in flight from another upload
            _ => Self::Transient(err.to_string()),
        }
    }
}

/// Upload pipeline errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid upload: {0}")]
    Invalid(String),

    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    #[error("Blob storage failed: {0}")]
    Blob(#[from] BlobError),

    #[error("Queue failed: {0}")]
    Queue(#[from] QueueError),

    /// Chunk tracker or hash registry failure
    #[error("Bookkeeping store failed: {0}")]
    Store(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The upload task ended without reporting a result
    #[error("Upload task aborted: {0}")]
    Aborted(String),
}

impl UploadError {
    /// Create an invalid upload error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Export pipeline errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    #[error("Blob download failed: {0}")]
    Blob(#[from] BlobError),

    #[error("Export I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download task failed: {0}")]
    Task(String),
}
