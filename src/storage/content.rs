//! Reading and mutating tracked files.
//!
//! Each mutation writes the working tree, stages the affected paths and
//! records exactly one commit, or none when nothing actually changed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use git2::{Index, Repository, Status};
use log::debug;

use crate::storage::blob;
use crate::storage::commit::{commit_index, CommitMessage};
use crate::storage::error::{Context, StorageError, StorageResult};
use crate::storage::path::{is_control_path, to_slash};
use crate::storage::refs::RefResolver;
use crate::storage::repository::WikiRepository;
use crate::storage::types::{Author, FileStat};

/// What a path currently is in the working tree, probed once before delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    Missing,
    File,
    EmptyDir,
    Dir,
}

impl PathKind {
    fn probe(full: &Path) -> std::io::Result<Self> {
        let meta = match fs::symlink_metadata(full) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PathKind::Missing),
            Err(e) => return Err(e),
        };

        if !meta.is_dir() {
            return Ok(PathKind::File);
        }
        match fs::read_dir(full)?.next() {
            None => Ok(PathKind::EmptyDir),
            Some(_) => Ok(PathKind::Dir),
        }
    }
}

impl WikiRepository {
    // ==================== Lock-free Probes ====================

    /// Whether `path` exists in the working tree.
    ///
    /// Never fails: invalid paths, the control area and I/O errors all
    /// read as `false`.
    pub fn exists(&self, path: &str) -> bool {
        match self.guard().validate(path) {
            Ok(rel) if !is_control_path(&rel) => self
                .guard()
                .absolute(&rel)
                .try_exists()
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Whether `path` is a directory in the working tree.
    pub fn is_dir(&self, path: &str) -> bool {
        match self.guard().validate(path) {
            Ok(rel) if !is_control_path(&rel) => self.guard().absolute(&rel).is_dir(),
            _ => false,
        }
    }

    /// Size and modification time of a working-tree entry.
    pub fn stat(&self, path: &str) -> StorageResult<FileStat> {
        let rel = self.guard().validate(path)?;
        let meta = match fs::metadata(self.guard().absolute(&rel)) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => return Err(StorageError::failed("stat", path, e)),
        };

        Ok(FileStat {
            size: meta.len(),
            modified: meta.modified().ok(),
            is_dir: meta.is_dir(),
        })
    }

    // ==================== Content Operations ====================

    /// Read a file.
    ///
    /// An empty `revision` reads the working tree; anything else reads the
    /// file as it was in that commit. A missing file or unresolvable revision
    /// is `NotFound`.
    pub fn load(&self, path: &str, revision: &str) -> StorageResult<Vec<u8>> {
        let rel = self.guard().validate(path)?;

        self.with_repo(|repo| {
            if revision.is_empty() {
                return match fs::read(self.guard().absolute(&rel)) {
                    Ok(bytes) => Ok(bytes),
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        Err(StorageError::NotFound(path.to_string()))
                    }
                    Err(e) => Err(StorageError::failed("read file", path, e)),
                };
            }

            let commit = RefResolver::resolve(repo, revision)?;
            blob::read_at(repo, &commit, &rel)
        })
    }

    /// Write `content` to `path` and commit it.
    ///
    /// Returns `false` without committing when the content matches what the
    /// last commit already holds. A blank message gets a default.
    pub fn store(&self, path: &str, content: &[u8], message: &str, author: &Author) -> StorageResult<bool> {
        let rel = self.guard().validate_target(path)?;
        let path = to_slash(&rel);
        if path.is_empty() {
            return Err(StorageError::internal("store", path, "cannot write to the repository root"));
        }
        let author = self.effective_author(author);

        self.with_repo(|repo| {
            let full = self.guard().absolute(&rel);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).context("create directories", &path)?;
            }
            fs::write(&full, content).context("write file", &path)?;

            stage(repo, &rel, &path)?;

            let status = repo.status_file(&rel).context("file status", &path)?;
            if !status.intersects(staged_changes()) {
                debug!("store {}: content unchanged, nothing to commit", path);
                return Ok(false);
            }

            let message = CommitMessage::or_default(message, || CommitMessage::store(&path));
            let created = commit_index(repo, &message, &author)?;
            Ok(created.is_some())
        })
    }

    /// Remove `path` and commit the removal.
    ///
    /// Already-absent paths succeed without doing anything. An empty
    /// directory was never tracked, so it is removed without a commit.
    pub fn delete(&self, path: &str, message: &str, author: &Author) -> StorageResult<()> {
        let rel = self.guard().validate_target(path)?;
        let path = to_slash(&rel);
        if path.is_empty() {
            return Err(StorageError::internal("delete", path, "cannot delete the repository root"));
        }
        let author = self.effective_author(author);

        self.with_repo(|repo| {
            let full = self.guard().absolute(&rel);
            let kind = PathKind::probe(&full).context("stat", &path)?;
            debug!("delete {}: {:?}", path, kind);

            let mut index = repo.index().context("read index", &path)?;
            match kind {
                PathKind::Missing => return Ok(()),
                PathKind::EmptyDir => {
                    fs::remove_dir(&full).context("remove directory", &path)?;
                    return Ok(());
                }
                PathKind::File => {
                    fs::remove_file(&full).context("remove file", &path)?;
                    index.remove_path(&rel).context("unstage file", &path)?;
                }
                PathKind::Dir => {
                    fs::remove_dir_all(&full).context("remove directory", &path)?;
                    index.remove_dir(&rel, 0).context("unstage directory", &path)?;
                }
            }
            index.write().context("write index", &path)?;

            let message = CommitMessage::or_default(message, || CommitMessage::delete(&path));
            commit_index(repo, &message, &author)?;
            Ok(())
        })
    }

    /// Move `old` to `new` and commit the move.
    ///
    /// Refuses with `Conflict` if `new` already exists.
    pub fn rename(&self, old: &str, new: &str, message: &str, author: &Author) -> StorageResult<()> {
        let old_rel = self.guard().validate_target(old)?;
        let new_rel = self.guard().validate_target(new)?;
        let old_path = to_slash(&old_rel);
        let new_path = to_slash(&new_rel);
        if old_path.is_empty() || new_path.is_empty() {
            return Err(StorageError::internal("rename", old_path, "cannot rename the repository root"));
        }
        let author = self.effective_author(author);

        self.with_repo(|repo| {
            let old_full = self.guard().absolute(&old_rel);
            let new_full = self.guard().absolute(&new_rel);

            if fs::symlink_metadata(&new_full).is_ok() {
                return Err(StorageError::Conflict(new_path.clone()));
            }
            let kind = PathKind::probe(&old_full).context("stat", &old_path)?;
            if kind == PathKind::Missing {
                return Err(StorageError::NotFound(old_path.clone()));
            }

            if let Some(parent) = new_full.parent() {
                fs::create_dir_all(parent).context("create directories", &new_path)?;
            }
            fs::rename(&old_full, &new_full).context("move file", &old_path)?;

            // exact paths only: index pathspecs would treat `*` and `[` in
            // page names as globs and skip ignored targets
            let mut index = repo.index().context("read index", &old_path)?;
            if kind == PathKind::File {
                if index.get_path(&old_rel, 0).is_some() {
                    index.remove_path(&old_rel).context("unstage old path", &old_path)?;
                }
                index.add_path(&new_rel).context("stage new path", &new_path)?;
            } else {
                for (old_entry, new_entry) in tracked_below(&index, &old_rel, &new_rel) {
                    index.remove_path(&old_entry).context("unstage old path", &old_path)?;
                    index.add_path(&new_entry).context("stage new path", &new_path)?;
                }
            }
            index.write().context("write index", &new_path)?;

            let message =
                CommitMessage::or_default(message, || CommitMessage::rename(&old_path, &new_path));
            commit_index(repo, &message, &author)?;
            Ok(())
        })
    }
}

/// Index entries under directory `old`, paired with where they land under `new`.
fn tracked_below(index: &Index, old: &Path, new: &Path) -> Vec<(PathBuf, PathBuf)> {
    index
        .iter()
        .filter_map(|entry| {
            let tracked = PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned());
            let rest = tracked.strip_prefix(old).ok()?;
            if rest.as_os_str().is_empty() {
                return None;
            }
            let moved = new.join(rest);
            Some((tracked, moved))
        })
        .collect()
}

fn stage(repo: &Repository, rel: &Path, path: &str) -> StorageResult<()> {
    let mut index = repo.index().context("read index", path)?;
    index.add_path(rel).context("stage file", path)?;
    index.write().context("write index", path)
}

fn staged_changes() -> Status {
    Status::INDEX_NEW
        | Status::INDEX_MODIFIED
        | Status::INDEX_DELETED
        | Status::INDEX_RENAMED
        | Status::INDEX_TYPECHANGE
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WikiRepository) {
        let dir = TempDir::new().unwrap();
        let repo = WikiRepository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn alice() -> Author {
        Author::new("Alice", "alice@example.com")
    }

    fn commit_count(repo: &WikiRepository) -> usize {
        repo.log("", 0).map(|l| l.len()).unwrap_or(0)
    }

    #[test]
    fn test_store_and_load_round_trip() {
        let (_dir, repo) = setup();

        assert!(repo.store("page.md", b"# Hello\n", "create", &alice()).unwrap());
        assert_eq!(repo.load("page.md", "").unwrap(), b"# Hello\n");
        assert!(repo.exists("page.md"));
    }

    #[test]
    fn test_store_empty_and_binary_content() {
        let (_dir, repo) = setup();
        let binary = vec![0u8, 1, 2, 255, 254, b'\n', 0];

        assert!(repo.store("empty.md", b"", "empty", &alice()).unwrap());
        assert!(repo.store("blob.bin", &binary, "binary", &alice()).unwrap());

        assert_eq!(repo.load("empty.md", "").unwrap(), b"");
        assert_eq!(repo.load("blob.bin", "").unwrap(), binary);
        assert_eq!(repo.load("blob.bin", "HEAD").unwrap(), binary);
    }

    #[test]
    fn test_store_creates_parent_directories() {
        let (_dir, repo) = setup();

        repo.store("folder/sub/page.md", b"nested", "", &alice()).unwrap();
        assert!(repo.is_dir("folder/sub"));
        assert_eq!(repo.load("folder/sub/page.md", "").unwrap(), b"nested");
        assert_eq!(repo.head().unwrap().message, "Update folder/sub/page.md");
    }

    #[test]
    fn test_store_identical_content_is_noop() {
        let (_dir, repo) = setup();

        assert!(repo.store("a.md", b"v1", "create", &alice()).unwrap());
        assert!(!repo.store("a.md", b"v1", "noop", &alice()).unwrap());
        assert_eq!(commit_count(&repo), 1);
        assert_eq!(repo.head().unwrap().message, "create");
    }

    #[test]
    fn test_load_at_revision() {
        let (_dir, repo) = setup();

        repo.store("a.md", b"v1", "one", &alice()).unwrap();
        let first = repo.head().unwrap();
        repo.store("a.md", b"v2", "two", &alice()).unwrap();

        assert_eq!(repo.load("a.md", &first.revision).unwrap(), b"v1");
        assert_eq!(repo.load("a.md", &first.full_revision).unwrap(), b"v1");
        assert_eq!(repo.load("a.md", "").unwrap(), b"v2");
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"v1", "one", &alice()).unwrap();

        assert!(repo.load("missing.md", "").unwrap_err().is_not_found());
        assert!(repo.load("missing.md", "HEAD").unwrap_err().is_not_found());
        assert!(repo.load("a.md", "0000000").unwrap_err().is_not_found());
        assert!(repo.load("a.md", "not-a-revision").unwrap_err().is_not_found());
    }

    #[test]
    fn test_traversal_rejected_without_mutation() {
        let (dir, repo) = setup();
        repo.store("a.md", b"v1", "one", &alice()).unwrap();

        for bad in ["../escape.md", "/tmp/abs.md", "a/../../escape.md"] {
            assert!(repo.store(bad, b"x", "", &alice()).unwrap_err().is_path_traversal());
            assert!(repo.load(bad, "").unwrap_err().is_path_traversal());
            assert!(repo.delete(bad, "", &alice()).unwrap_err().is_path_traversal());
            assert!(repo.rename("a.md", bad, "", &alice()).unwrap_err().is_path_traversal());
            assert!(repo.rename(bad, "b.md", "", &alice()).unwrap_err().is_path_traversal());
            assert!(!repo.exists(bad));
        }

        assert!(!dir.path().parent().unwrap().join("escape.md").exists());
        assert!(repo.exists("a.md"));
        assert_eq!(commit_count(&repo), 1);
    }

    #[test]
    fn test_control_area_rejected() {
        let (_dir, repo) = setup();

        let err = repo.store(".git/hooks/pre-commit", b"evil", "", &alice()).unwrap_err();
        assert!(err.is_path_traversal());
        assert!(repo.delete(".git", "", &alice()).unwrap_err().is_path_traversal());
        assert!(!repo.exists(".git"));
    }

    #[test]
    fn test_delete_file() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"v1", "create", &alice()).unwrap();

        repo.delete("a.md", "", &alice()).unwrap();
        assert!(!repo.exists("a.md"));
        assert_eq!(commit_count(&repo), 2);
        assert_eq!(repo.head().unwrap().message, "Delete a.md");
        assert!(repo.load("a.md", "HEAD").unwrap_err().is_not_found());
        assert_eq!(repo.load("a.md", "HEAD~1").unwrap(), b"v1");
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"v1", "create", &alice()).unwrap();

        repo.delete("never.md", "", &alice()).unwrap();
        assert_eq!(commit_count(&repo), 1);
    }

    #[test]
    fn test_delete_empty_directory_without_commit() {
        let (dir, repo) = setup();
        repo.store("a.md", b"v1", "create", &alice()).unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        repo.delete("empty", "", &alice()).unwrap();
        assert!(!repo.exists("empty"));
        assert_eq!(commit_count(&repo), 1);
    }

    #[test]
    fn test_delete_directory_recursively() {
        let (_dir, repo) = setup();
        repo.store("folder/a.md", b"a", "a", &alice()).unwrap();
        repo.store("folder/sub/b.md", b"b", "b", &alice()).unwrap();
        repo.store("keep.md", b"k", "k", &alice()).unwrap();

        repo.delete("folder", "drop folder", &alice()).unwrap();
        assert!(!repo.exists("folder"));
        assert!(repo.exists("keep.md"));
        assert_eq!(commit_count(&repo), 4);
        assert!(repo.load("folder/sub/b.md", "HEAD").unwrap_err().is_not_found());
    }

    #[test]
    fn test_rename_preserves_content() {
        let (_dir, repo) = setup();
        repo.store("old.md", b"content", "create", &alice()).unwrap();

        repo.rename("old.md", "folder/new.md", "", &alice()).unwrap();
        assert!(!repo.exists("old.md"));
        assert!(repo.exists("folder/new.md"));
        assert_eq!(repo.load("folder/new.md", "").unwrap(), b"content");
        assert_eq!(repo.load("folder/new.md", "HEAD").unwrap(), b"content");
        assert!(repo.load("old.md", "HEAD").unwrap_err().is_not_found());
        assert_eq!(repo.head().unwrap().message, "Rename old.md to folder/new.md");
    }

    #[test]
    fn test_rename_onto_existing_conflicts() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"a", "a", &alice()).unwrap();
        repo.store("b.md", b"b", "b", &alice()).unwrap();

        let err = repo.rename("a.md", "b.md", "", &alice()).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(repo.load("a.md", "").unwrap(), b"a");
        assert_eq!(repo.load("b.md", "").unwrap(), b"b");
        assert_eq!(commit_count(&repo), 2);
    }

    #[test]
    fn test_rename_missing_source() {
        let (_dir, repo) = setup();
        let err = repo.rename("ghost.md", "b.md", "", &alice()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_rename_directory() {
        let (_dir, repo) = setup();
        repo.store("docs/a.md", b"a", "a", &alice()).unwrap();
        repo.store("docs/sub/b.md", b"b", "b", &alice()).unwrap();

        repo.rename("docs", "archive/docs", "", &alice()).unwrap();
        assert_eq!(repo.load("archive/docs/sub/b.md", "HEAD").unwrap(), b"b");
        assert!(repo.load("docs/a.md", "HEAD").unwrap_err().is_not_found());
    }

    #[test]
    fn test_rename_glob_characters_are_literal() {
        let (_dir, repo) = setup();
        repo.store("ab.md", b"ab", "ab", &alice()).unwrap();
        repo.store("a*.md", b"star", "star", &alice()).unwrap();
        repo.store("p1.md", b"p1", "p1", &alice()).unwrap();
        repo.store("p[12].md", b"brackets", "brackets", &alice()).unwrap();

        repo.rename("a*.md", "star.md", "", &alice()).unwrap();
        repo.rename("p[12].md", "brackets.md", "", &alice()).unwrap();

        assert_eq!(repo.load("ab.md", "HEAD").unwrap(), b"ab");
        assert_eq!(repo.load("p1.md", "HEAD").unwrap(), b"p1");
        assert_eq!(repo.load("star.md", "HEAD").unwrap(), b"star");
        assert_eq!(repo.load("brackets.md", "HEAD").unwrap(), b"brackets");
        assert!(repo.load("a*.md", "HEAD").unwrap_err().is_not_found());
        assert!(repo.load("p[12].md", "HEAD").unwrap_err().is_not_found());
        assert_eq!(repo.head().unwrap().message, "Rename p[12].md to brackets.md");
    }

    #[test]
    fn test_rename_directory_with_glob_name() {
        let (_dir, repo) = setup();
        repo.store("d*/x.md", b"x", "x", &alice()).unwrap();
        repo.store("dd/y.md", b"y", "y", &alice()).unwrap();

        repo.rename("d*", "moved", "", &alice()).unwrap();
        assert_eq!(repo.load("moved/x.md", "HEAD").unwrap(), b"x");
        assert_eq!(repo.load("dd/y.md", "HEAD").unwrap(), b"y");
        assert!(repo.load("d*/x.md", "HEAD").unwrap_err().is_not_found());
    }

    #[test]
    fn test_rename_onto_ignored_name_is_still_committed() {
        let (_dir, repo) = setup();
        repo.store(".gitignore", b"*.bak\n", "ignore backups", &alice()).unwrap();
        repo.store("page.md", b"body", "create", &alice()).unwrap();

        repo.rename("page.md", "page.bak", "", &alice()).unwrap();
        assert_eq!(repo.load("page.bak", "HEAD").unwrap(), b"body");
        assert!(repo.load("page.md", "HEAD").unwrap_err().is_not_found());
        assert_eq!(commit_count(&repo), 3);
    }

    #[test]
    fn test_probes_read_io_errors_as_false() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"a", "a", &alice()).unwrap();

        // ENOTDIR: a file used as a directory
        assert!(!repo.exists("a.md/child"));
        assert!(!repo.is_dir("a.md/child"));

        // ENAMETOOLONG
        let long = "x".repeat(300);
        assert!(!repo.exists(&long));
        assert!(!repo.is_dir(&long));
    }

    #[test]
    fn test_stat() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"12345", "a", &alice()).unwrap();

        let stat = repo.stat("a.md").unwrap();
        assert_eq!(stat.size, 5);
        assert!(!stat.is_dir);
        assert!(stat.modified.is_some());
        assert!(repo.stat("nope.md").unwrap_err().is_not_found());
        assert!(repo.stat("../x").unwrap_err().is_path_traversal());
    }
}
