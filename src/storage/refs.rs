//! Revision and reference resolution.
//!
//! Callers name revisions with plain strings: full or abbreviated ids,
//! `HEAD`, `HEAD~2`, branch names. This module turns those into commits and
//! maps "no such thing" onto `NotFound`, leaving genuine repository failures
//! as `OperationFailed`.

use git2::{Commit, ErrorCode, Repository};

use crate::storage::error::{Context, StorageError, StorageResult};

/// Resolves references and revision strings to commits.
pub struct RefResolver;

impl RefResolver {
    /// The current tip, or `None` for a repository without commits.
    pub fn head_commit(repo: &Repository) -> StorageResult<Option<Commit<'_>>> {
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                return Ok(None)
            }
            Err(e) => return Err(StorageError::failed("resolve HEAD", "HEAD", e)),
        };

        let commit = head.peel_to_commit().context("resolve HEAD", "HEAD")?;
        Ok(Some(commit))
    }

    /// The current tip, or `NotFound` when there is no history yet.
    pub fn require_head(repo: &Repository) -> StorageResult<Commit<'_>> {
        Self::head_commit(repo)?
            .ok_or_else(|| StorageError::NotFound("HEAD (repository has no commits)".to_string()))
    }

    /// Resolve a revision string to a commit.
    ///
    /// An empty revision means the current tip. Anything that does not name
    /// a commit is `NotFound`.
    pub fn resolve<'r>(repo: &'r Repository, revision: &str) -> StorageResult<Commit<'r>> {
        if revision.is_empty() {
            return Self::require_head(repo);
        }

        let object = repo
            .revparse_single(revision)
            .map_err(|e| Self::not_found_or_failed(e, revision))?;

        object
            .peel_to_commit()
            .map_err(|e| Self::not_found_or_failed(e, revision))
    }

    // only "no such revision" codes map to NotFound; a damaged object store
    // or ref database stays an OperationFailed
    fn not_found_or_failed(err: git2::Error, revision: &str) -> StorageError {
        match err.code() {
            ErrorCode::NotFound
            | ErrorCode::InvalidSpec
            | ErrorCode::Ambiguous
            | ErrorCode::UnbornBranch
            | ErrorCode::Peel => StorageError::NotFound(format!("revision {}", revision)),
            _ => StorageError::failed("resolve revision", revision, err),
        }
    }
}
