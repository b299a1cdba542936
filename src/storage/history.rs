//! History queries: per-path log, blame, diffs and commit inspection.
//!
//! Routine queries (`metadata`, `log`) project commits without their file
//! lists. Only `show_commit` pays for a tree diff.

use std::path::Path;

use git2::{BlameOptions, Repository};

use crate::storage::blob;
use crate::storage::commit::{self, HistoryIterator};
use crate::storage::error::{Context, StorageError, StorageResult};
use crate::storage::path::to_slash;
use crate::storage::refs::RefResolver;
use crate::storage::repository::WikiRepository;
use crate::storage::types::{git_time, BlameLine, CommitId, CommitMetadata};

impl WikiRepository {
    /// Metadata for a revision, or for the newest commit that touched `path`.
    ///
    /// With a non-empty `revision` the commit is resolved directly, whether
    /// or not it touched `path`. The file list is never populated.
    pub fn metadata(&self, path: &str, revision: &str) -> StorageResult<CommitMetadata> {
        let rel = self.guard().validate(path)?;

        self.with_repo(|repo| {
            if !revision.is_empty() {
                let commit = RefResolver::resolve(repo, revision)?;
                return commit::project(repo, &commit, false);
            }

            let mut found = walk_path(repo, &rel, 1)?;
            match found.pop() {
                Some(meta) => Ok(meta),
                None => Err(no_history(path)),
            }
        })
    }

    /// Commits that touched `path`, newest first.
    ///
    /// An empty path is the whole repository. `max_count <= 0` means no
    /// limit. No matching commit at all is `NotFound`.
    pub fn log(&self, path: &str, max_count: i64) -> StorageResult<Vec<CommitMetadata>> {
        let rel = self.guard().validate(path)?;
        let limit = usize::try_from(max_count).unwrap_or(0);

        self.with_repo(|repo| {
            let entries = walk_path(repo, &rel, limit)?;
            if entries.is_empty() {
                return Err(no_history(path));
            }
            Ok(entries)
        })
    }

    /// Per-line attribution of `path` at `revision` (the tip if empty).
    pub fn blame(&self, path: &str, revision: &str) -> StorageResult<Vec<BlameLine>> {
        let rel = self.guard().validate(path)?;
        let display = to_slash(&rel);
        if display.is_empty() {
            return Err(StorageError::NotFound("cannot blame the repository root".to_string()));
        }

        self.with_repo(|repo| {
            let commit = RefResolver::resolve(repo, revision)?;
            let content = blob::read_at(repo, &commit, &rel)?;
            let lines = blob::split_lines(&content);

            let mut opts = BlameOptions::new();
            opts.newest_commit(commit.id());
            let blame = repo
                .blame_file(&rel, Some(&mut opts))
                .map_err(|e| match e.code() {
                    git2::ErrorCode::NotFound => StorageError::NotFound(display.clone()),
                    _ => StorageError::failed("blame", display.clone(), e),
                })?;

            lines
                .into_iter()
                .enumerate()
                .map(|(i, content)| -> StorageResult<BlameLine> {
                    let line_number = i + 1;
                    let hunk = blame.get_line(line_number).ok_or_else(|| {
                        StorageError::internal("blame", display.clone(), format!("no hunk for line {}", line_number))
                    })?;
                    let signature = hunk.final_signature();

                    Ok(BlameLine {
                        revision: CommitId::new(hunk.final_commit_id()).short(),
                        author_name: signature.name().unwrap_or("Unknown").to_string(),
                        timestamp: git_time(signature.when()),
                        line_number,
                        content,
                    })
                })
                .collect()
        })
    }

    /// Unified patch from `rev_a` to `rev_b`.
    pub fn diff(&self, rev_a: &str, rev_b: &str) -> StorageResult<String> {
        self.with_repo(|repo| {
            let a = RefResolver::resolve(repo, rev_a)?;
            let b = RefResolver::resolve(repo, rev_b)?;
            let context = format!("{}..{}", rev_a, rev_b);

            let old_tree = a.tree().context("read tree", rev_a)?;
            let new_tree = b.tree().context("read tree", rev_b)?;
            let diff = commit::diff_trees(repo, Some(&old_tree), Some(&new_tree), &context)?;
            commit::patch_text(&diff, &context)
        })
    }

    /// Full inspection of one commit: metadata with its file list, plus the
    /// patch against its first parent.
    pub fn show_commit(&self, revision: &str) -> StorageResult<(CommitMetadata, String)> {
        self.with_repo(|repo| {
            let commit = RefResolver::resolve(repo, revision)?;
            let diff = commit::first_parent_diff(repo, &commit)?;

            let files = commit::changed_paths(&diff);
            let patch = commit::patch_text(&diff, revision)?;
            Ok((CommitMetadata::from_git2(&commit, Some(files)), patch))
        })
    }
}

/// Walk history from the tip, collecting commits that touched `rel`.
///
/// Stops as soon as `limit` entries are found; `limit == 0` walks everything.
fn walk_path(repo: &Repository, rel: &Path, limit: usize) -> StorageResult<Vec<CommitMetadata>> {
    let walk = match HistoryIterator::from_head(repo)? {
        Some(walk) => walk,
        None => return Ok(Vec::new()),
    };

    let mut entries = Vec::new();
    for commit in walk {
        let commit = commit?;
        if !commit::touches_path(&commit, rel)? {
            continue;
        }
        entries.push(commit::project(repo, &commit, false)?);
        if limit > 0 && entries.len() >= limit {
            break;
        }
    }
    Ok(entries)
}

fn no_history(path: &str) -> StorageError {
    if path.is_empty() {
        StorageError::NotFound("history (repository has no commits)".to_string())
    } else {
        StorageError::NotFound(format!("history for {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Author;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WikiRepository) {
        let dir = TempDir::new().unwrap();
        let repo = WikiRepository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn alice() -> Author {
        Author::new("Alice", "alice@example.com")
    }

    fn bob() -> Author {
        Author::new("Bob", "bob@example.com")
    }

    #[test]
    fn test_log_newest_first() {
        let (_dir, repo) = setup();
        for i in 1..=4 {
            repo.store("a.md", format!("v{}", i).as_bytes(), &format!("edit {}", i), &alice())
                .unwrap();
        }

        let log = repo.log("a.md", 0).unwrap();
        let messages: Vec<_> = log.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(messages, vec!["edit 4", "edit 3", "edit 2", "edit 1"]);
        assert!(log.iter().all(|m| m.files.is_none()));

        let latest = repo.log("a.md", 1).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].message, "edit 4");

        assert_eq!(repo.log("a.md", -3).unwrap().len(), 4);
    }

    #[test]
    fn test_log_filters_by_path() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"a1", "a1", &alice()).unwrap();
        repo.store("folder/b.md", b"b1", "b1", &alice()).unwrap();
        repo.store("a.md", b"a2", "a2", &alice()).unwrap();
        repo.store("folder/c.md", b"c1", "c1", &alice()).unwrap();

        let a: Vec<_> = repo.log("a.md", 0).unwrap().into_iter().map(|m| m.message).collect();
        assert_eq!(a, vec!["a2", "a1"]);

        let folder: Vec<_> = repo.log("folder", 0).unwrap().into_iter().map(|m| m.message).collect();
        assert_eq!(folder, vec!["c1", "b1"]);

        assert_eq!(repo.log("", 0).unwrap().len(), 4);
    }

    #[test]
    fn test_log_without_history_is_not_found() {
        let (_dir, repo) = setup();
        assert!(repo.log("", 0).unwrap_err().is_not_found());

        repo.store("a.md", b"a", "a", &alice()).unwrap();
        assert!(repo.log("never.md", 0).unwrap_err().is_not_found());
        assert!(repo.log("../x", 0).unwrap_err().is_path_traversal());
    }

    #[test]
    fn test_metadata_latest_touching_commit() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"a1", "a1", &alice()).unwrap();
        repo.store("b.md", b"b1", "b1", &bob()).unwrap();

        let meta = repo.metadata("a.md", "").unwrap();
        assert_eq!(meta.message, "a1");
        assert_eq!(meta.author_name, "Alice");
        assert!(meta.files.is_none());

        // an explicit revision resolves regardless of the path
        let head = repo.metadata("a.md", "HEAD").unwrap();
        assert_eq!(head.message, "b1");
        assert_eq!(head.author_email, "bob@example.com");
        assert_eq!(head.revision.len(), 7);
        assert!(head.full_revision.starts_with(&head.revision));

        assert!(repo.metadata("ghost.md", "").unwrap_err().is_not_found());
        assert!(repo.metadata("a.md", "nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_blame_attributes_lines() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"one\ntwo\n", "first", &alice()).unwrap();
        let first = repo.head().unwrap();
        repo.store("a.md", b"one\ntwo\nthree\n", "second", &bob()).unwrap();
        let second = repo.head().unwrap();

        let blame = repo.blame("a.md", "").unwrap();
        assert_eq!(blame.len(), 3);
        assert_eq!(
            blame.iter().map(|l| l.line_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(blame[0].revision, first.revision);
        assert_eq!(blame[0].author_name, "Alice");
        assert_eq!(blame[0].content, "one");
        assert_eq!(blame[2].revision, second.revision);
        assert_eq!(blame[2].author_name, "Bob");
        assert_eq!(blame[2].content, "three");

        let old = repo.blame("a.md", &first.revision).unwrap();
        assert_eq!(old.len(), 2);
        assert!(old.iter().all(|l| l.revision == first.revision));
    }

    #[test]
    fn test_blame_line_count_without_trailing_newline() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"x\ny\nz", "xyz", &alice()).unwrap();
        let blame = repo.blame("a.md", "").unwrap();
        assert_eq!(blame.len(), 3);
        assert_eq!(blame[2].content, "z");
    }

    #[test]
    fn test_blame_keeps_blank_lines_and_replaces_invalid_utf8() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"head\n\n\xff\xfe\n\n", "raw", &alice()).unwrap();

        let blame = repo.blame("a.md", "").unwrap();
        let contents: Vec<_> = blame.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, vec!["head", "", "\u{FFFD}\u{FFFD}", ""]);
        assert_eq!(repo.load("a.md", "").unwrap(), b"head\n\n\xff\xfe\n\n");
    }

    #[test]
    fn test_blame_missing() {
        let (_dir, repo) = setup();
        assert!(repo.blame("a.md", "").unwrap_err().is_not_found());

        repo.store("a.md", b"x\n", "x", &alice()).unwrap();
        assert!(repo.blame("b.md", "").unwrap_err().is_not_found());
        assert!(repo.blame("a.md", "deadbeef").unwrap_err().is_not_found());
    }

    #[test]
    fn test_diff_between_revisions() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"old line\n", "v1", &alice()).unwrap();
        let v1 = repo.head().unwrap();
        repo.store("a.md", b"new line\n", "v2", &alice()).unwrap();
        let v2 = repo.head().unwrap();

        let patch = repo.diff(&v1.revision, &v2.revision).unwrap();
        assert!(patch.contains("-old line"));
        assert!(patch.contains("+new line"));

        assert!(repo.diff(&v1.revision, "bogus").unwrap_err().is_not_found());
        assert!(repo.diff("bogus", &v2.revision).unwrap_err().is_not_found());
    }

    #[test]
    fn test_show_commit_populates_files() {
        let (_dir, repo) = setup();
        repo.store("a.md", b"a\n", "root", &alice()).unwrap();
        repo.store("folder/b.md", b"b\n", "add b", &alice()).unwrap();

        let (meta, patch) = repo.show_commit("HEAD").unwrap();
        assert_eq!(meta.message, "add b");
        assert_eq!(meta.files, Some(vec!["folder/b.md".to_string()]));
        assert!(patch.contains("+b"));

        let (root, root_patch) = repo.show_commit("HEAD~1").unwrap();
        assert_eq!(root.files, Some(vec!["a.md".to_string()]));
        assert!(root_patch.contains("+a"));

        assert!(repo.show_commit("nope").unwrap_err().is_not_found());
    }
}
