//! Error types for path rules
//!
//! Raised by the pure path operations before anything touches the graph. The
//! namespace service turns them into validation or conflict errors.

use thiserror::Error;

/// Path rule violations
///
/// # Examples
///
/// ```rust
/// use graphdisk_core::operations::{normalize_path, PathError};
///
/// let err = normalize_path("t1/../t2").unwrap_err();
/// assert!(matches!(err, PathError::ParentTraversal { .. }));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Nothing left after normalisation
    #[error("Path is empty: {what}")]
    Empty { what: String },

    /// `..` is never resolved
    #[error("Parent traversal is not allowed: {path}")]
    ParentTraversal { path: String },

    /// `remoteDisk` / `trashDisk` used as a regular segment
    #[error("Reserved segment name: {segment}")]
    ReservedSegment { segment: String },

    /// A node on the way to the leaf is a file
    #[error("Path component is not a directory: {name}")]
    NotADirectory { name: String },

    /// File leafs must carry the blob name chosen by the uploader
    #[error("File leaf '{name}' requires a file name")]
    MissingFileName { name: String },

    /// The tenant mount itself cannot be a file
    #[error("Tenant node '{tenant}' must be a directory")]
    TenantMustBeDirectory { tenant: String },
}

impl PathError {
    pub fn empty(what: impl Into<String>) -> Self {
        Self::Empty { what: what.into() }
    }

    pub fn reserved(segment: impl Into<String>) -> Self {
        Self::ReservedSegment {
            segment: segment.into(),
        }
    }

    pub fn not_a_directory(name: impl Into<String>) -> Self {
        Self::NotADirectory { name: name.into() }
    }

    /// Violations that depend on what is already in the graph
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::NotADirectory { .. })
    }
}
