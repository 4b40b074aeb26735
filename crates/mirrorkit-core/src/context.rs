//! Per-operation scope
//!
//! An [`OperationContext`] owns every repository handle opened while serving
//! one request. Handles are reused for every lookup against the same
//! directory and handed back to the shared store exactly once, when the
//! context is dropped, whether the operation succeeded or not.

use crate::config::VcsRoot;
use crate::error::{Error, Result};
use crate::git::Revision;
use crate::mirror::{MirrorState, MirrorStore, MirrorSynchronizer};
use crate::support::GitSupport;
use crate::tree::{self, FlatTree};
use crate::types::RevisionRef;
use git2::{Oid, Repository};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

/// Request-scoped handle owner; not shared between threads
pub struct OperationContext<'s> {
    support: &'s GitSupport,
    root: VcsRoot,
    root_dir: PathBuf,
    operation: String,
    repositories: RefCell<HashMap<PathBuf, Rc<Repository>>>,
    fetched: RefCell<HashSet<PathBuf>>,
}

impl<'s> OperationContext<'s> {
    pub(crate) fn new(support: &'s GitSupport, root: &VcsRoot, operation: &str) -> Self {
        Self {
            support,
            root_dir: support.store().locator().repository_dir(root),
            root: root.clone(),
            operation: operation.to_string(),
            repositories: RefCell::new(HashMap::new()),
            fetched: RefCell::new(HashSet::new()),
        }
    }

    /// Owning support object
    pub fn support(&self) -> &'s GitSupport {
        self.support
    }

    /// Shared mirror store
    pub fn store(&self) -> &'s MirrorStore {
        self.support.store()
    }

    /// Root this operation works on
    pub fn root(&self) -> &VcsRoot {
        &self.root
    }

    /// Repository directory of the root
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Operation name, e.g. `retrieving content`
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Synchronizer over the shared store and transport
    pub fn synchronizer(&self) -> MirrorSynchronizer<'s> {
        self.support.synchronizer()
    }

    /// Mirror directory for a fetch URL
    pub fn mirror_dir(&self, url: &str) -> PathBuf {
        self.store().mirror_dir(url)
    }

    /// Handle for the root repository
    pub fn repository(&self) -> Result<Rc<Repository>> {
        let dir = self.root_dir.clone();
        self.repository_at(&dir, &self.root.fetch_url)
    }

    /// Handle for the mirror of `url`
    pub fn repository_for(&self, url: &str) -> Result<Rc<Repository>> {
        self.repository_at(&self.mirror_dir(url), url)
    }

    /// Handle for the repository at `dir`, creating the mirror when it is
    /// absent or unusable. Opening failures abort the operation.
    pub fn repository_at(&self, dir: &Path, url: &str) -> Result<Rc<Repository>> {
        if let Some(repo) = self.repositories.borrow().get(dir) {
            return Ok(Rc::clone(repo));
        }
        if self.store().state(dir) != MirrorState::Valid {
            self.synchronizer().prepare_mirror(dir, url)?;
        }
        let repo = Rc::new(self.store().open(dir)?);
        self.repositories
            .borrow_mut()
            .insert(dir.to_path_buf(), Rc::clone(&repo));
        Ok(repo)
    }

    /// Drop the handle for `dir` after the directory changed on disk
    pub fn discard(&self, dir: &Path) {
        let removed = self.repositories.borrow_mut().remove(dir);
        if removed.is_some() {
            debug!(dir = %dir.display(), "discarding repository handle");
        }
        self.store().evict(dir);
    }

    /// Record a fetch of `dir`; false when it was already fetched in this context
    pub fn mark_fetched(&self, dir: &Path) -> bool {
        self.fetched.borrow_mut().insert(dir.to_path_buf())
    }

    /// Number of handles currently owned
    pub fn open_handles(&self) -> usize {
        self.repositories.borrow().len()
    }

    /// Make the commit named by `version` available in the root's mirror.
    ///
    /// Nothing is fetched when the commit is already present.
    pub fn ensure_commit_loaded(&self, version: &str) -> Result<Oid> {
        let commit = Revision::parse(version)?;
        let present = {
            let repo = self.repository()?;
            self.store().repositories().has_commit(&repo, commit)
        };
        if !present {
            self.synchronizer().ensure_revision(
                &self.root_dir,
                &self.root.fetch_url,
                &RevisionRef::on_branch(commit, self.root.branch.as_str()),
            )?;
            self.discard(&self.root_dir);
        }
        Ok(commit)
    }

    /// Submodule-aware tree of a root commit under the root's policy
    pub fn tree(&self, commit: Oid) -> Result<FlatTree> {
        tree::flatten(self, commit, self.root.submodule_policy, true)
    }

    /// Attach the operation name to an error.
    ///
    /// `FileNotFound` and already wrapped errors pass through unchanged.
    pub fn wrap_error(&self, err: Error) -> Error {
        match err {
            Error::FileNotFound { .. } | Error::Operation { .. } => err,
            other => Error::Operation {
                operation: self.operation.clone(),
                source: Box::new(other),
            },
        }
    }

    /// End the operation, releasing every handle
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for OperationContext<'_> {
    fn drop(&mut self) {
        let store = self.support.store();
        for (dir, repo) in self.repositories.get_mut().drain() {
            match Rc::try_unwrap(repo) {
                Ok(repo) => store.close(&dir, repo),
                Err(_) => debug!(dir = %dir.display(), "handle still in use at context end, dropping"),
            }
        }
    }
}
