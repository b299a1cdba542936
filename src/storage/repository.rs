//!   Core Git repository wrapper.
//!
//!  This is the central component of the storage layer. It owns the open
//!  `git2::Repository` behind a single lock and hands it to the content,
//!  history, revert and listing operations, which live in their own modules
//!  as further `impl WikiRepository` blocks.
//!
//!  Before every repository access the handle looks for the reload sentinel
//!  in the control directory. An out-of-band process (a sync job, an admin
//!  running git by hand) drops that file after mutating the repository; the
//!  handle deletes it and reopens the repository before continuing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{ErrorCode, Repository, RepositoryInitOptions};
use log::{debug, info};
use parking_lot::Mutex;

use crate::config::StoreConfig;
use crate::storage::commit;
use crate::storage::error::{Context, StorageError, StorageResult};
use crate::storage::path::PathGuard;
use crate::storage::refs::RefResolver;
use crate::storage::types::{Author, CommitMetadata};

/// The wiki's versioned document store.
///
/// Clone this to share across threads - it uses Arc internally, and every
/// clone serializes on the same lock.
#[derive(Clone)]
pub struct WikiRepository {
    inner: Arc<WikiRepositoryInner>,
}

struct WikiRepositoryInner {
    repo: Mutex<Repository>,
    guard: PathGuard,
    signal_path: PathBuf,
    config: StoreConfig,
}

impl WikiRepository {
    /// Open an existing repository.
    ///
    /// Fails with `NotARepository` when `path` holds no repository, so the
    /// caller can decide to initialize one instead.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(StoreConfig::new(path.as_ref()))
    }

    /// Initialize a new repository, creating the directory if needed.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::init_with_config(StoreConfig::new(path.as_ref()))
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(StoreConfig::new(path.as_ref()).create_if_missing(true))
    }

    /// Open with custom configuration, initializing if `create_if_missing`
    /// is set and nothing usable is there yet.
    pub fn open_with_config(config: StoreConfig) -> StorageResult<Self> {
        match open_git2(&config.path) {
            Ok(repo) => Self::from_git2(repo, config),
            Err(StorageError::NotARepository(_)) if config.create_if_missing => {
                Self::init_with_config(config)
            }
            Err(e) => Err(e),
        }
    }

    /// Initialize with custom configuration.
    pub fn init_with_config(config: StoreConfig) -> StorageResult<Self> {
        let display = config.path.display().to_string();
        fs::create_dir_all(&config.path).context("create repository", &display)?;

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(&config.default_branch);
        let repo = Repository::init_opts(&config.path, &opts).context("init repository", &display)?;

        info!("initialized wiki repository at {}", display);
        Self::from_git2(repo, config)
    }

    fn from_git2(repo: Repository, config: StoreConfig) -> StorageResult<Self> {
        // bare repositories have no working tree to store pages in
        let root = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| StorageError::NotARepository(config.path.clone()))?;
        let signal_path = repo.path().join(&config.reload_signal);

        Ok(Self {
            inner: Arc::new(WikiRepositoryInner {
                repo: Mutex::new(repo),
                guard: PathGuard::new(root),
                signal_path,
                config,
            }),
        })
    }

    /// Get the repository root (working directory).
    pub fn path(&self) -> &Path {
        self.inner.guard.root()
    }

    /// Get the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub(crate) fn guard(&self) -> &PathGuard {
        &self.inner.guard
    }

    /// Run `f` with exclusive access to the repository.
    ///
    /// Every repository-touching operation, read or write, goes through here.
    /// A pending reload signal is consumed before `f` sees the repository.
    pub(crate) fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let mut repo = self.inner.repo.lock();
        self.reload_if_signaled(&mut repo)?;
        f(&repo)
    }

    fn reload_if_signaled(&self, repo: &mut Repository) -> StorageResult<()> {
        match fs::remove_file(&self.inner.signal_path) {
            Ok(()) => {
                info!("reload signal found, reopening {}", self.path().display());
                *repo = reopen(self.path())?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::failed(
                "consume reload signal",
                self.inner.signal_path.display().to_string(),
                e,
            )),
        }
    }

    /// Drop the reload sentinel, as an external process does after changing
    /// the repository behind this handle's back.
    pub fn signal_reload(&self) -> StorageResult<()> {
        fs::write(&self.inner.signal_path, b"")
            .context("write reload signal", &self.inner.signal_path.display().to_string())
    }

    /// Whether a reload signal is waiting to be consumed.
    pub fn reload_pending(&self) -> bool {
        self.inner.signal_path.exists()
    }

    /// Reopen the repository now, regardless of any signal.
    pub fn reload(&self) -> StorageResult<()> {
        let mut repo = self.inner.repo.lock();
        *repo = reopen(self.path())?;
        debug!("reopened {}", self.path().display());
        Ok(())
    }

    /// Metadata of the current tip, or `NotFound` for an empty repository.
    pub fn head(&self) -> StorageResult<CommitMetadata> {
        self.with_repo(|repo| {
            let head = RefResolver::require_head(repo)?;
            commit::project(repo, &head, false)
        })
    }

    /// The author to stamp on a commit: the caller's, unless it is blank.
    pub(crate) fn effective_author(&self, author: &Author) -> Author {
        if author.is_anonymous() {
            self.inner.config.fallback_author.clone()
        } else {
            author.clone()
        }
    }
}

fn open_git2(path: &Path) -> StorageResult<Repository> {
    if !path.exists() {
        return Err(StorageError::NotARepository(path.to_path_buf()));
    }
    Repository::open(path).map_err(|e| match e.code() {
        ErrorCode::NotFound => StorageError::NotARepository(path.to_path_buf()),
        _ => StorageError::failed("open repository", path.display().to_string(), e),
    })
}

fn reopen(root: &Path) -> StorageResult<Repository> {
    Repository::open(root).context("reopen repository", &root.display().to_string())
}
