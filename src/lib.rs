//! wikistore - A Git-backed versioned document store
//!
//! This crate is the persistence core of a wiki. Every page edit is recorded
//! as an immutable commit in a local git repository, which gives full
//! history, line-level blame, diffs, and reverts that append a compensating
//! commit instead of rewriting anything.
//!
//! # Example
//!
//! ```no_run
//! use wikistore::storage::{Author, WikiRepository};
//!
//! let repo = WikiRepository::open_or_init("./wiki").unwrap();
//! let author = Author::new("Alice", "alice@example.com");
//! repo.store("page.md", b"v1", "create", &author).unwrap();
//! repo.store("page.md", b"v2", "update", &author).unwrap();
//!
//! let update = repo.metadata("page.md", "").unwrap();
//! repo.revert(&update.revision, "", &author).unwrap();
//! assert_eq!(repo.load("page.md", "").unwrap(), b"v1");
//! ```

pub mod config;
pub mod storage;

pub use config::StoreConfig;
pub use storage::{StorageError, StorageResult, WikiRepository};
