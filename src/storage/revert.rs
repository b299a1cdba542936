//! Compensating reverts.
//!
//! A revert never rewinds history. It restores every path the target commit
//! touched to its state in the target's first parent, and records that as a
//! new commit on top of the current tip.

use std::fs;
use std::path::Path;

use git2::{Index, Repository, Tree};
use log::debug;

use crate::storage::blob;
use crate::storage::commit::{self, commit_index, CommitMessage};
use crate::storage::error::{Context, StorageError, StorageResult};
use crate::storage::path::to_slash;
use crate::storage::refs::RefResolver;
use crate::storage::repository::WikiRepository;
use crate::storage::types::{Author, CommitId};

impl WikiRepository {
    /// Undo `revision` with a new commit.
    ///
    /// Fails with `NoParent` for the root commit. Returns the id of the new
    /// commit, or `None` if the working tree already matched the restored
    /// state and nothing was committed.
    pub fn revert(&self, revision: &str, message: &str, author: &Author) -> StorageResult<Option<CommitId>> {
        let author = self.effective_author(author);

        self.with_repo(|repo| {
            let target = RefResolver::resolve(repo, revision)?;
            let full_id = target.id().to_string();
            if target.parent_count() == 0 {
                return Err(StorageError::NoParent(revision.to_string()));
            }

            let parent = target.parent(0).context("read parent", &full_id)?;
            let parent_tree = parent.tree().context("read parent tree", &full_id)?;
            let diff = commit::first_parent_diff(repo, &target)?;

            let mut index = repo.index().context("read index", &full_id)?;
            for path in commit::changed_paths(&diff) {
                self.restore_path(repo, &mut index, &parent_tree, &path)?;
            }
            index.write().context("write index", &full_id)?;

            let summary = target.summary().unwrap_or("").to_string();
            let message = CommitMessage::or_default(message, || CommitMessage::revert(&summary, &full_id));
            commit_index(repo, &message, &author)
        })
    }

    /// Put `path` back the way `parent_tree` has it, in both the working
    /// tree and the index.
    fn restore_path(&self, repo: &Repository, index: &mut Index, parent_tree: &Tree<'_>, path: &str) -> StorageResult<()> {
        let rel = Path::new(path);
        let full = self.guard().absolute(rel);

        match blob::blob_in_tree(repo, parent_tree, rel)? {
            Some(previous) => {
                debug!("revert: restoring {}", path);
                // the target may have turned this file into a directory, or a
                // parent directory into a file
                if full.is_dir() {
                    fs::remove_dir_all(&full).context("remove directory", path)?;
                    index.remove_dir(rel, 0).context("unstage directory", path)?;
                }
                self.clear_file_ancestors(index, rel)?;
                if let Some(dir) = full.parent() {
                    fs::create_dir_all(dir).context("create directories", path)?;
                }
                fs::write(&full, previous.content()).context("write file", path)?;
                index.add_path(rel).context("stage file", path)?;
            }
            None => {
                debug!("revert: removing {}", path);
                // absent, or shadowed by a file restored over one of its parents
                if let Ok(meta) = fs::symlink_metadata(&full) {
                    if !meta.is_dir() {
                        fs::remove_file(&full).context("remove file", path)?;
                        self.prune_empty_parents(&full);
                    }
                }
                if index.get_path(rel, 0).is_some() {
                    index.remove_path(rel).context("unstage file", path)?;
                }
            }
        }
        Ok(())
    }

    fn clear_file_ancestors(&self, index: &mut Index, rel: &Path) -> StorageResult<()> {
        for ancestor in rel.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            let full = self.guard().absolute(ancestor);
            let is_file = fs::symlink_metadata(&full).map(|m| !m.is_dir()).unwrap_or(false);
            if is_file {
                let shown = to_slash(ancestor);
                fs::remove_file(&full).context("remove file", &shown)?;
                if index.get_path(ancestor, 0).is_some() {
                    index.remove_path(ancestor).context("unstage file", &shown)?;
                }
            }
        }
        Ok(())
    }

    /// Remove directories left empty above `full`, stopping at the first
    /// one that still has entries (or is not a directory).
    fn prune_empty_parents(&self, full: &Path) {
        let root = self.guard().root();
        let mut dir = full.parent();
        while let Some(current) = dir {
            if current == root || fs::remove_dir(current).is_err() {
                break;
            }
            debug!("revert: removed empty directory {}", current.display());
            dir = current.parent();
        }
    }
}
