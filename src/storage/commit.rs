//!  Commit creation and history traversal
//!
//! every successful mutation of the wiki ends here:
//! - the index is written out as a tree
//! - a commit is created on top of the current tip (if the tree changed)
//!
//! this module also owns the commit -> metadata projection, the tree diffs
//! behind it, and the path-filtered history walk.

use std::path::Path;

use git2::{Diff, DiffFormat, DiffOptions, Repository, Revwalk, Sort, Tree};
use log::debug;

use crate::storage::error::{Context, StorageError, StorageResult};
use crate::storage::refs::RefResolver;
use crate::storage::types::{Author, CommitId, CommitMetadata};

/// Commit whatever is staged in the index on top of HEAD.
///
/// Returns `None` without creating anything when the staged tree is identical
/// to the tip's tree.
pub fn commit_index(repo: &Repository, message: &str, author: &Author) -> StorageResult<Option<CommitId>> {
    let mut index = repo.index().context("read index", "")?;
    let tree_id = index.write_tree().context("write tree", "")?;

    let head = RefResolver::head_commit(repo)?;
    if let Some(ref parent) = head {
        if parent.tree_id() == tree_id {
            debug!("nothing staged relative to {}, skipping commit", parent.id());
            return Ok(None);
        }
    }

    let tree = repo.find_tree(tree_id).context("commit", "")?;
    let sig = author.to_git2_signature().context("commit", "")?;
    let parents: Vec<&git2::Commit<'_>> = head.iter().collect();

    let oid = repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .context("commit", "")?;
    let id = CommitId::new(oid);
    debug!("created commit {} by {}: {}", id.short(), author, message.lines().next().unwrap_or(""));
    Ok(Some(id))
}

/// Project a commit to its metadata.
///
/// The file list costs a tree diff against the first parent, so it is only
/// computed when `include_files` is set.
pub fn project(repo: &Repository, commit: &git2::Commit<'_>, include_files: bool) -> StorageResult<CommitMetadata> {
    let files = if include_files {
        let diff = first_parent_diff(repo, commit)?;
        Some(changed_paths(&diff))
    } else {
        None
    };
    Ok(CommitMetadata::from_git2(commit, files))
}

/// Diff between a commit's first parent and the commit itself.
///
/// A root commit is diffed against the empty tree, so every file shows up
/// as added.
pub fn first_parent_diff<'r>(repo: &'r Repository, commit: &git2::Commit<'_>) -> StorageResult<Diff<'r>> {
    let rev = commit.id().to_string();
    let new_tree = commit.tree().context("read tree", &rev)?;
    let old_tree = match commit.parent_count() {
        0 => None,
        _ => Some(
            commit
                .parent(0)
                .and_then(|p| p.tree())
                .context("read parent tree", &rev)?,
        ),
    };
    diff_trees(repo, old_tree.as_ref(), Some(&new_tree), &rev)
}

/// compute the diff between two trees
pub fn diff_trees<'r>(
    repo: &'r Repository,
    old: Option<&Tree<'_>>,
    new: Option<&Tree<'_>>,
    context: &str,
) -> StorageResult<Diff<'r>> {
    let mut opts = DiffOptions::new();
    repo.diff_tree_to_tree(old, new, Some(&mut opts))
        .context("diff trees", context)
}

/// paths touched by a diff, in diff order
pub fn changed_paths(diff: &Diff<'_>) -> Vec<String> {
    diff.deltas()
        .filter_map(|delta| delta.new_file().path().or_else(|| delta.old_file().path()))
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect()
}

/// Render a diff as unified patch text.
pub fn patch_text(diff: &Diff<'_>, context: &str) -> StorageResult<String> {
    let mut out: Vec<u8> = Vec::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        match line.origin() {
            origin @ ('+' | '-' | ' ') => out.push(origin as u8),
            _ => {}
        }
        out.extend_from_slice(line.content());
        true
    })
    .context("format patch", context)?;

    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Whether `commit` changed `rel` relative to its first parent.
///
/// Compares tree entry ids, so it works for files and directories alike. The
/// repository root (empty path) is touched by every commit.
pub fn touches_path(commit: &git2::Commit<'_>, rel: &Path) -> StorageResult<bool> {
    if rel.as_os_str().is_empty() {
        return Ok(true);
    }

    let rev = commit.id().to_string();
    let tree = commit.tree().context("read tree", &rev)?;
    let current = entry_id(&tree, rel);

    let previous = match commit.parent_count() {
        0 => None,
        _ => {
            let parent_tree = commit
                .parent(0)
                .and_then(|p| p.tree())
                .context("read parent tree", &rev)?;
            entry_id(&parent_tree, rel)
        }
    };

    Ok(current != previous)
}

fn entry_id(tree: &Tree<'_>, rel: &Path) -> Option<git2::Oid> {
    tree.get_path(rel).ok().map(|entry| entry.id())
}

/// iterate over commit history, newest first
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    /// start a walk from the current tip; `None` for an empty repository
    pub fn from_head(repo: &'repo Repository) -> StorageResult<Option<Self>> {
        let head = match RefResolver::head_commit(repo)? {
            Some(head) => head.id(),
            None => return Ok(None),
        };

        let mut revwalk = repo.revwalk().context("walk history", "HEAD")?;
        revwalk.push(head).context("walk history", "HEAD")?;
        revwalk
            .set_sorting(Sort::TIME | Sort::TOPOLOGICAL)
            .context("walk history", "HEAD")?;

        Ok(Some(Self { repo, revwalk }))
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<git2::Commit<'repo>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => Some(
                self.repo
                    .find_commit(oid)
                    .context("walk history", &oid.to_string()),
            ),
            Err(e) => Some(Err(StorageError::failed("walk history", "HEAD", e))),
        }
    }
}

/// Default commit messages for wiki operations.
pub struct CommitMessage;

impl CommitMessage {
    /// the caller's message, or `fallback` if it is blank
    pub fn or_default(message: &str, fallback: impl FnOnce() -> String) -> String {
        if message.trim().is_empty() {
            fallback()
        } else {
            message.to_string()
        }
    }

    pub fn store(path: &str) -> String {
        format!("Update {}", path)
    }

    pub fn delete(path: &str) -> String {
        format!("Delete {}", path)
    }

    pub fn rename(old: &str, new: &str) -> String {
        format!("Rename {} to {}", old, new)
    }

    pub fn revert(summary: &str, full_id: &str) -> String {
        format!("Revert \"{}\"\n\nThis reverts commit {}.", summary, full_id)
    }
}
