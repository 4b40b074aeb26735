//! Capability traits at the core's seams
//!
//! The core never talks to a transport or an object store directly; it goes
//! through these two narrow interfaces, each with a native and an in-process
//! (or cached and direct) variant chosen at construction.

use crate::error::{GitContext, Result};
use git2::{Oid, Repository};
use std::collections::BTreeMap;
use std::path::Path;

/// Transport-level git commands run against a repository directory.
///
/// `fetch` always fetches from the `origin` remote. Every method fails with a
/// transport error that the synchronizer retries exactly once after
/// recreating the mirror.
pub trait GitExecutable: Send + Sync {
    /// Create a repository at `dir`
    fn init(&self, dir: &Path, bare: bool) -> Result<()>;

    /// Register a remote
    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<()>;

    /// Fetch from `origin`; `None` uses the remote's configured refspecs
    fn fetch(&self, dir: &Path, refspec: Option<&str>, shallow: bool) -> Result<()>;

    /// Force-delete a local branch
    fn delete_branch(&self, dir: &Path, name: &str) -> Result<()>;

    /// Create a local branch at `start_point`
    fn create_branch(&self, dir: &Path, name: &str, start_point: &str) -> Result<()>;

    /// All refs of the repository, name to hex object id
    fn show_refs(&self, dir: &Path) -> Result<BTreeMap<String, String>>;
}

/// Object store access through repository handles.
///
/// Handles are moved out by `open` and handed back by `close`, so a handle is
/// never used by two callers at once.
pub trait RepositoryStore: Send + Sync {
    /// Open the repository at `dir`; fails with `Error::Structural`
    fn open(&self, dir: &Path) -> Result<Repository>;

    /// Give a handle back once the caller is done with it
    fn close(&self, dir: &Path, repo: Repository);

    /// Forget any retained handle for `dir`
    fn evict(&self, dir: &Path);

    /// Release every retained handle
    fn shutdown(&self);

    /// Resolve a fully qualified ref name
    fn resolve_ref(&self, repo: &Repository, name: &str) -> Option<Oid> {
        repo.refname_to_id(name).ok()
    }

    /// Read blob bytes
    fn read_blob(&self, repo: &Repository, id: Oid) -> Result<Vec<u8>> {
        let blob = repo
            .find_blob(id)
            .git_context(|| format!("reading blob {}", id))?;
        Ok(blob.content().to_vec())
    }

    /// Whether `id` names a commit present in the object store
    fn has_commit(&self, repo: &Repository, id: Oid) -> bool {
        repo.find_commit(id).is_ok()
    }
}
