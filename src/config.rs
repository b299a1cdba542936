//! Store configuration.

use std::path::PathBuf;

use crate::storage::Author;

/// Configuration for opening a wiki repository.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the repository working directory.
    pub path: PathBuf,
    /// Initialize a new repository if none exists at `path`.
    pub create_if_missing: bool,
    /// Initial branch name for newly created repositories.
    pub default_branch: String,
    /// File name of the reload sentinel inside the control directory.
    pub reload_signal: String,
    /// Identity stamped on commits whose author name is blank.
    pub fallback_author: Author,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("wiki"),
            create_if_missing: false,
            default_branch: "main".to_string(),
            reload_signal: "wikistore-reload".to_string(),
            fallback_author: Author::system(),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set the initial branch for new repositories.
    pub fn default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Set the reload sentinel file name.
    pub fn reload_signal(mut self, name: impl Into<String>) -> Self {
        self.reload_signal = name.into();
        self
    }

    /// Set the author used when callers pass an anonymous one.
    pub fn fallback_author(mut self, author: Author) -> Self {
        self.fallback_author = author;
        self
    }
}
