//!  Blob access for file snapshots.
//!
//! Page content is opaque bytes. Reading a file "at a revision" means walking
//! the commit's tree down to the entry and loading its blob.

use std::path::Path;

use git2::{Blob, ObjectType, Repository, Tree};

use crate::storage::error::{Context, StorageError, StorageResult};
use crate::storage::path::to_slash;

/// The blob stored at `rel` inside `tree`, or `None` if there is no file there.
///
/// Directories (sub-trees) and submodule entries are reported as absent.
pub fn blob_in_tree<'r>(repo: &'r Repository, tree: &Tree<'_>, rel: &Path) -> StorageResult<Option<Blob<'r>>> {
    let entry = match tree.get_path(rel) {
        Ok(entry) => entry,
        Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::failed("read tree entry", to_slash(rel), e)),
    };

    if entry.kind() != Some(ObjectType::Blob) {
        return Ok(None);
    }

    let blob = repo.find_blob(entry.id()).context("read blob", &to_slash(rel))?;
    Ok(Some(blob))
}

/// File content at `rel` as of `commit`.
pub fn read_at(repo: &Repository, commit: &git2::Commit<'_>, rel: &Path) -> StorageResult<Vec<u8>> {
    let path = to_slash(rel);
    let tree = commit.tree().context("read tree", &path)?;

    blob_in_tree(repo, &tree, rel)?
        .map(|blob| blob.content().to_vec())
        .ok_or_else(|| StorageError::NotFound(format!("{} at revision {}", path, commit.id())))
}

/// Split blob content into lines the way blame numbers them.
///
/// A trailing newline terminates the last line rather than starting a new
/// empty one.
pub fn split_lines(content: &[u8]) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }

    let body = content.strip_suffix(b"\n").unwrap_or(content);
    body.split(|b| *b == b'\n')
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect()
}
