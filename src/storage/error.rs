//! Storage layer error types
//!
//! Callers branch on the kind of failure: a rejected path, a missing file or
//! revision, a conflicting rename target. Everything else is an opaque
//! `OperationFailed` annotated with the operation and path that produced it.

use std::path::PathBuf;

use thiserror::Error;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// a caller-supplied path resolves outside the repository root,
    /// or targets the repository control area
    #[error("path traversal rejected: {0}")]
    PathTraversal(String),

    /// the requested file, commit or revision does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// the target of a rename already exists
    #[error("conflict: {0} already exists")]
    Conflict(String),

    /// the revision has no parent to restore from
    #[error("revision {0} has no parent")]
    NoParent(String),

    /// the location exists but holds no usable repository
    #[error("not a valid repository: {0}")]
    NotARepository(PathBuf),

    /// any other failure, annotated with what was being attempted
    #[error("{op} failed for '{path}': {source}")]
    OperationFailed {
        op: &'static str,
        path: String,
        #[source]
        source: FailureCause,
    },
}

/// the underlying cause of an `OperationFailed`
#[derive(Debug, Error)]
pub enum FailureCause {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }

    /// check if this error is a rejected path
    pub fn is_path_traversal(&self) -> bool {
        matches!(self, StorageError::PathTraversal(_))
    }

    /// Retry policy belongs to the caller; nothing here is retried.
    pub fn is_retriable(&self) -> bool {
        false
    }

    pub(crate) fn failed(op: &'static str, path: impl Into<String>, source: impl Into<FailureCause>) -> Self {
        StorageError::OperationFailed {
            op,
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn internal(op: &'static str, path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::failed(op, path, FailureCause::Internal(msg.into()))
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Attach operation and path context to a git or io failure.
pub(crate) trait Context<T> {
    fn context(self, op: &'static str, path: &str) -> StorageResult<T>;
}

impl<T, E> Context<T> for Result<T, E>
where
    E: Into<FailureCause>,
{
    fn context(self, op: &'static str, path: &str) -> StorageResult<T> {
        self.map_err(|e| StorageError::failed(op, path, e))
    }
}
