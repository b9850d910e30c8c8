//! Database Error Types
//!
//! Errors raised by the graph store, the chunk list cache and the content-hash
//! registry. Service layers wrap these; the namespace engine maps
//! `ConstraintViolation` onto its own `Conflict` variant.

use std::path::PathBuf;
use thiserror::Error;

/// Storage operation errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open or connect to a backend
    #[error("Failed to connect to database at {path}: {reason}")]
    ConnectionFailed { path: PathBuf, reason: String },

    /// Failed to initialize schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// A read or write statement failed
    #[error("Query failed: {context}")]
    QueryFailed { context: String },

    /// A transaction was cancelled and nothing was written
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    /// Two transactions touched the same keys; running it again may succeed
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    /// A uniqueness or tree-shape guard refused the write
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// Stored data could not be decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SurrealDB operation error
    #[error("Graph store operation failed: {0}")]
    SurrealError(#[from] surrealdb::Error),

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a query failed error
    pub fn query_failed(context: impl Into<String>) -> Self {
        Self::QueryFailed {
            context: context.into(),
        }
    }

    /// Create a transaction aborted error
    pub fn transaction_aborted(msg: impl Into<String>) -> Self {
        Self::TransactionAborted(msg.into())
    }

    /// Create a write conflict error
    pub fn write_conflict(msg: impl Into<String>) -> Self {
        Self::WriteConflict(msg.into())
    }

    /// Create a constraint violation error
    pub fn constraint_violation(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// True when a guard refused the write, as opposed to a storage failure
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }

    pub fn is_write_conflict(&self) -> bool {
        matches!(self, Self::WriteConflict(_))
    }
}
