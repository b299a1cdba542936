//! Path validation for caller-supplied filenames.
//!
//! Every public operation runs its paths through [`PathGuard`] before it
//! touches the disk or the repository. Filenames come from untrusted callers,
//! so anything that escapes the repository root after normalization is
//! rejected outright.

use std::path::{Component, Path, PathBuf};

use log::warn;
use path_clean::PathClean;

use crate::storage::error::{StorageError, StorageResult};

/// Name of the repository control directory at the root of the working tree.
pub const CONTROL_DIR: &str = ".git";

/// Validates relative paths against a fixed repository root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate `path` and return its cleaned, root-relative form.
    ///
    /// An empty path (or one that cleans down to `.`) is the repository root
    /// and comes back as an empty `PathBuf`.
    pub fn validate(&self, path: &str) -> StorageResult<PathBuf> {
        if path.is_empty() {
            return Ok(PathBuf::new());
        }

        let cleaned = Path::new(path).clean();
        if cleaned == Path::new(".") {
            return Ok(PathBuf::new());
        }

        if cleaned.is_absolute() || cleaned.has_root() {
            return Err(reject(path, "absolute path"));
        }
        if cleaned.starts_with("..") {
            return Err(reject(path, "escapes the repository root"));
        }
        if cleaned
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(reject(path, "unexpected path component"));
        }

        let joined = self.root.join(&cleaned);
        if !joined.starts_with(&self.root) || joined == self.root {
            return Err(reject(path, "does not resolve within the repository root"));
        }

        Ok(cleaned)
    }

    /// Like [`validate`](Self::validate), but also refuses the repository
    /// control area. Used for every mutation target and listing root.
    pub fn validate_target(&self, path: &str) -> StorageResult<PathBuf> {
        let rel = self.validate(path)?;
        if is_control_path(&rel) {
            return Err(reject(path, "targets the repository control area"));
        }
        Ok(rel)
    }

    /// Absolute location of a validated relative path.
    pub fn absolute(&self, rel: &Path) -> PathBuf {
        if rel.as_os_str().is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }
}

/// True when the first component of `rel` is the control directory.
pub fn is_control_path(rel: &Path) -> bool {
    rel.components()
        .next()
        .map(|c| c.as_os_str() == CONTROL_DIR)
        .unwrap_or(false)
}

/// Render a relative path with forward slashes, as git and callers expect.
pub fn to_slash(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn reject(path: &str, reason: &str) -> StorageError {
    warn!("rejected path {:?}: {}", path, reason);
    StorageError::PathTraversal(path.to_string())
}
