//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, TimeZone, Utc};
use git2::Oid;
use serde::Serialize;

/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected. The inner Oid is only accessible within the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse CommitId from a hex string
    pub fn from_hex(hex: &str) -> Result<Self, git2::Error> {
        Oid::from_str(hex).map(CommitId)
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Author of a change, supplied per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// identity used when a caller leaves the author name blank
    pub fn system() -> Self {
        Self::new("Wiki", "wiki@localhost")
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.trim().is_empty()
    }

    /// convert to git2::Signature stamped with the current time
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for Author {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Metadata describing one commit.
///
/// `files` is only populated by detailed inspection
/// ([`show_commit`](crate::storage::WikiRepository::show_commit)); listing and
/// lookup leave it unset so they never pay for a tree diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitMetadata {
    /// abbreviated commit id
    pub revision: String,
    pub full_revision: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

impl CommitMetadata {
    pub(crate) fn from_git2(commit: &git2::Commit<'_>, files: Option<Vec<String>>) -> Self {
        let author = commit.author();
        let id = CommitId::new(commit.id());

        Self {
            revision: id.short(),
            full_revision: id.to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@unknown").to_string(),
            timestamp: git_time(commit.time()),
            message: commit.message().unwrap_or("").to_string(),
            files,
        }
    }

    /// first line of the message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// Attribution for a single line of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlameLine {
    /// abbreviated id of the commit that last touched the line
    pub revision: String,
    pub author_name: String,
    pub timestamp: DateTime<Utc>,
    /// 1-based
    pub line_number: usize,
    /// line text without its newline; bytes that are not valid UTF-8 are
    /// replaced with U+FFFD, so use `load` for the exact bytes
    pub content: String,
}

/// Size and modification time of a working-tree entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
}

/// Options for [`list`](crate::storage::WikiRepository::list).
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// how far below the listing root to descend; `None` is unbounded
    pub depth: Option<usize>,
    /// path segment names pruned at any depth
    pub exclude: Vec<String>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.exclude.push(name.into());
        self
    }
}

/// Result of a recursive listing. Paths are repository-relative and sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub files: Vec<String>,
    pub directories: Vec<String>,
}

pub(crate) fn git_time(time: git2::Time) -> DateTime<Utc> {
    Utc.timestamp_opt(time.seconds(), 0)
        .single()
        .unwrap_or_else(Utc::now)
}
