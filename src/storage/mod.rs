//! storage layer for wikistore
//!
//! this module wraps a single git working tree as the wiki's persistence
//! core. Every page edit becomes a commit; history, blame, diffs and reverts
//! are read back out of the same repository. Nothing outside this module
//! touches git2 directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WikiRepository                          │
//! │   (one handle, one lock, reload signal, PathGuard gate)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!     ┌──────────────┬─────────┴────┬──────────────┐
//!     ▼              ▼              ▼              ▼
//! ┌─────────┐   ┌─────────┐   ┌─────────┐   ┌─────────┐
//! │ content │   │ history │   │ revert  │   │ listing │
//! └─────────┘   └─────────┘   └─────────┘   └─────────┘
//!     │              │              │
//!     └──────────────┼──────────────┘
//!                    ▼
//!       ┌──────────────────────────┐
//!       │  commit · refs · blob    │
//!       └──────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use wikistore::storage::{Author, WikiRepository};
//!
//! let repo = WikiRepository::open_or_init("./wiki")?;
//! let alice = Author::new("Alice", "alice@example.com");
//!
//! // one save, one commit
//! let changed = repo.store("folder/page.md", b"# Hello\n", "create page", &alice)?;
//! assert!(changed);
//!
//! // saving the same bytes again commits nothing
//! assert!(!repo.store("folder/page.md", b"# Hello\n", "", &alice)?);
//!
//! let history = repo.log("folder/page.md", 0)?;
//! let (details, patch) = repo.show_commit(&history[0].revision)?;
//! # Ok::<(), wikistore::storage::StorageError>(())
//! ```

mod blob;
mod commit;
mod content;
mod error;
mod history;
mod listing;
mod path;
mod refs;
mod repository;
mod revert;
mod types;

// Re-export public API
pub use commit::CommitMessage;
pub use error::{FailureCause, StorageError, StorageResult};
pub use path::{PathGuard, CONTROL_DIR};
pub use repository::WikiRepository;
pub use types::{Author, BlameLine, CommitId, CommitMetadata, FileStat, ListOptions, Listing};
