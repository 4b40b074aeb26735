//! Process-wide mirror store
//!
//! One bare repository per distinct fetch URL lives under the mirrors root.
//! The store knows where a mirror lives, whether it is usable, and hands out
//! repository handles through a [`RepositoryStore`].

pub mod location;
pub mod store;
pub mod sync;

pub use location::MirrorLocator;
pub use store::{CachingStore, DirectStore};
pub use sync::MirrorSynchronizer;

use crate::error::Result;
use crate::traits::RepositoryStore;
use git2::Repository;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Observed state of a mirror directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    /// Nothing on disk
    Absent,
    /// Something on disk that cannot be opened as a repository
    Invalid,
    /// Opens as a repository
    Valid,
}

/// Shared mirror registry: locations, handles and per-mirror fetch locks
pub struct MirrorStore {
    locator: MirrorLocator,
    repositories: Box<dyn RepositoryStore>,
    fetch_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl MirrorStore {
    /// Store over `locator` using `repositories` for handles
    pub fn new(locator: MirrorLocator, repositories: Box<dyn RepositoryStore>) -> Self {
        Self {
            locator,
            repositories,
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// URL-to-directory mapping
    pub fn locator(&self) -> &MirrorLocator {
        &self.locator
    }

    /// Handle store
    pub fn repositories(&self) -> &dyn RepositoryStore {
        self.repositories.as_ref()
    }

    /// Mirror directory for a fetch URL
    pub fn mirror_dir(&self, url: &str) -> PathBuf {
        self.locator.mirror_dir(url)
    }

    /// Inspect the directory without modifying it
    pub fn state(&self, dir: &Path) -> MirrorState {
        if !dir.exists() {
            MirrorState::Absent
        } else if Repository::open(dir).is_ok() {
            MirrorState::Valid
        } else {
            MirrorState::Invalid
        }
    }

    /// Take a handle; fails with `Error::Structural`
    pub fn open(&self, dir: &Path) -> Result<Repository> {
        self.repositories.open(dir)
    }

    /// Return a handle for reuse
    pub fn close(&self, dir: &Path, repo: Repository) {
        self.repositories.close(dir, repo)
    }

    /// Drop retained handles for a directory about to change underneath them
    pub fn evict(&self, dir: &Path) {
        self.repositories.evict(dir)
    }

    /// Lock serializing fetches into one mirror directory
    pub fn fetch_lock(&self, dir: &Path) -> Arc<Mutex<()>> {
        self.fetch_locks
            .lock()
            .entry(dir.to_path_buf())
            .or_default()
            .clone()
    }

    /// Release all retained handles
    pub fn shutdown(&self) {
        self.repositories.shutdown();
        self.fetch_locks.lock().clear();
    }
}
