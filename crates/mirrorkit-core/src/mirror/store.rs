//! Repository handle stores

use crate::error::{Error, Result};
use crate::traits::RepositoryStore;
use git2::Repository;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

fn open_structural(dir: &Path) -> Result<Repository> {
    Repository::open(dir).map_err(|source| Error::Structural {
        dir: dir.to_path_buf(),
        source,
    })
}

/// Opens a fresh handle for every request and drops it on close
#[derive(Debug, Default)]
pub struct DirectStore;

impl RepositoryStore for DirectStore {
    fn open(&self, dir: &Path) -> Result<Repository> {
        open_structural(dir)
    }

    fn close(&self, _dir: &Path, repo: Repository) {
        drop(repo);
    }

    fn evict(&self, _dir: &Path) {}

    fn shutdown(&self) {}
}

/// Keeps closed handles in a bounded LRU cache for reuse
///
/// `open` takes a handle out of the cache, so a cached handle always has a
/// single user.
pub struct CachingStore {
    cache: Mutex<LruCache<PathBuf, Repository>>,
}

impl CachingStore {
    /// Cache holding at most `capacity` idle handles
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of idle handles
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether no handle is idle
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RepositoryStore for CachingStore {
    fn open(&self, dir: &Path) -> Result<Repository> {
        if let Some(repo) = self.cache.lock().pop(dir) {
            return Ok(repo);
        }
        open_structural(dir)
    }

    fn close(&self, dir: &Path, repo: Repository) {
        self.cache.lock().put(dir.to_path_buf(), repo);
    }

    fn evict(&self, dir: &Path) {
        self.cache.lock().pop(dir);
    }

    fn shutdown(&self) {
        let mut cache = self.cache.lock();
        tracing::debug!(handles = cache.len(), "releasing cached repository handles");
        cache.clear();
    }
}

/// Store variant selected by the cache capacity
pub fn store_for_capacity(capacity: usize) -> Box<dyn RepositoryStore> {
    match NonZeroUsize::new(capacity) {
        Some(capacity) => Box::new(CachingStore::new(capacity)),
        None => Box::new(DirectStore),
    }
}
