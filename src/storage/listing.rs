//! Recursive working-tree listing.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::path::{to_slash, CONTROL_DIR};
use crate::storage::repository::WikiRepository;
use crate::storage::types::{ListOptions, Listing};

impl WikiRepository {
    /// List files and directories below `path` (the root if empty).
    ///
    /// Returned paths are relative to the repository root and sorted. The
    /// control directory and every name in `options.exclude` are pruned with
    /// their whole subtree, and a root inside the control directory is
    /// refused as `PathTraversal`. Unreadable entries are skipped; only a
    /// failure at the listing root is reported.
    pub fn list(&self, path: &str, options: &ListOptions) -> StorageResult<Listing> {
        let rel = self.guard().validate_target(path)?;
        let root = self.guard().absolute(&rel);

        self.with_repo(|_repo| {
            match fs::metadata(&root) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    return Err(StorageError::internal("list", path, "not a directory"))
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(StorageError::NotFound(path.to_string()))
                }
                Err(e) => return Err(StorageError::failed("list", path, e)),
            }

            let mut walker = WalkDir::new(&root).min_depth(1);
            if let Some(depth) = options.depth {
                walker = walker.max_depth(depth);
            }

            let control = self.path().join(CONTROL_DIR);
            let mut listing = Listing::default();
            let entries = walker
                .into_iter()
                .filter_entry(|entry| !is_pruned(entry, &control, &options.exclude))
                .filter_map(Result::ok);

            for entry in entries {
                let relative = match entry.path().strip_prefix(self.path()) {
                    Ok(relative) => to_slash(relative),
                    Err(_) => continue,
                };
                if entry.file_type().is_dir() {
                    listing.directories.push(relative);
                } else {
                    listing.files.push(relative);
                }
            }

            listing.files.sort();
            listing.directories.sort();
            Ok(listing)
        })
    }
}

fn is_pruned(entry: &DirEntry, control: &Path, exclude: &[String]) -> bool {
    if entry.path() == control {
        return true;
    }
    let name = entry.file_name();
    exclude.iter().any(|ex| name == ex.as_str())
}
