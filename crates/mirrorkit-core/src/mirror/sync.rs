//! Mirror synchronization protocol
//!
//! Decides whether a fetch is needed to make a commit available in a mirror,
//! performs the smallest fetch that can provide it, and recovers from broken
//! mirrors by recreating them from scratch. All steps for one mirror run under
//! that mirror's fetch lock.

use crate::error::{Error, GitContext, Result};
use crate::git::{Revision, ALL_BRANCHES_REFSPEC};
use crate::mirror::{MirrorState, MirrorStore};
use crate::traits::GitExecutable;
use crate::types::RevisionRef;
use git2::{Oid, Repository};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const TMP_BRANCH_PREFIX: &str = "tmp_branch_for_build";

/// Brings mirrors up to date through a [`GitExecutable`]
pub struct MirrorSynchronizer<'a> {
    store: &'a MirrorStore,
    git: &'a dyn GitExecutable,
}

impl<'a> MirrorSynchronizer<'a> {
    /// Synchronizer over a store and a transport
    pub fn new(store: &'a MirrorStore, git: &'a dyn GitExecutable) -> Self {
        Self { store, git }
    }

    /// Make `wanted` available in the mirror at `dir`.
    ///
    /// A fetch is skipped when no outdated refs were found and the local ref
    /// for `wanted_ref` (or, without a ref, the object store) already has the
    /// commit. Otherwise the branch is fetched, then every branch if the commit
    /// is still missing. Fails with `Error::Sync` when the commit cannot be
    /// made available.
    pub fn ensure_present(
        &self,
        dir: &Path,
        url: &str,
        wanted_ref: Option<&str>,
        wanted: Oid,
    ) -> Result<()> {
        let lock = self.store.fetch_lock(dir);
        let _guard = lock.lock();

        let created = self.prepare_locked(dir, url)?;
        // Leftover locks would block the outdated-ref cleanup below
        remove_ref_locks(dir);
        let full_ref = wanted_ref.map(Revision::expand_ref);

        let fetch_required = created || {
            let repo = self.store.open(dir)?;
            let decision = self.fetch_required(&repo, full_ref.as_deref(), wanted);
            self.store.close(dir, repo);
            decision?
        };

        if !fetch_required {
            debug!(dir = %dir.display(), commit = %Revision::short(&wanted), "fetch not required");
            return Ok(());
        }

        let refspec = wanted_ref.map(Revision::branch_refspec);
        self.fetch_with_recovery(dir, url, refspec.as_deref())?;
        if self.contains_commit(dir, wanted)? {
            return Ok(());
        }

        debug!(
            dir = %dir.display(),
            commit = %Revision::short(&wanted),
            "commit still missing, fetching all branches"
        );
        self.fetch_with_recovery(dir, url, Some(ALL_BRANCHES_REFSPEC))?;
        if self.contains_commit(dir, wanted)? {
            return Ok(());
        }

        Err(Error::Sync {
            dir: dir.to_path_buf(),
            url: url.to_string(),
            reason: format!("commit {} not found after fetching all branches", wanted),
            source: None,
        })
    }

    /// [`ensure_present`](Self::ensure_present) for a [`RevisionRef`]
    pub fn ensure_revision(&self, dir: &Path, url: &str, wanted: &RevisionRef) -> Result<()> {
        self.ensure_present(dir, url, wanted.branch.as_deref(), wanted.commit)
    }

    /// Create the mirror if it is absent or unusable; no fetch is made
    pub fn prepare_mirror(&self, dir: &Path, url: &str) -> Result<()> {
        let lock = self.store.fetch_lock(dir);
        let _guard = lock.lock();
        self.prepare_locked(dir, url).map(drop)
    }

    /// Fetch every branch of `url` into the mirror, creating it if needed
    pub fn fetch_all_branches(&self, dir: &Path, url: &str) -> Result<()> {
        let lock = self.store.fetch_lock(dir);
        let _guard = lock.lock();
        self.prepare_locked(dir, url)?;
        self.fetch_with_recovery(dir, url, Some(ALL_BRANCHES_REFSPEC))
    }

    /// Shallow-fetch one commit of the mirror into another repository.
    ///
    /// A temporary branch is created in the mirror at `commit`, fetched with
    /// depth 1 into `target_dir` as `refs/remotes/origin/<branch>`, and deleted
    /// again whatever the outcome. `target_dir` is created with the mirror as
    /// its `origin` when absent.
    pub fn shallow_fetch_into(
        &self,
        mirror_dir: &Path,
        target_dir: &Path,
        branch: &str,
        commit: Oid,
    ) -> Result<()> {
        let lock = self.store.fetch_lock(mirror_dir);
        let _guard = lock.lock();

        self.prepare_target(mirror_dir, target_dir)?;

        let existing = self.git.show_refs(mirror_dir)?;
        let tmp = (0..)
            .map(|n| {
                if n == 0 {
                    TMP_BRANCH_PREFIX.to_string()
                } else {
                    format!("{}{}", TMP_BRANCH_PREFIX, n)
                }
            })
            .find(|name| !existing.contains_key(&Revision::expand_ref(name)))
            .unwrap_or_else(|| TMP_BRANCH_PREFIX.to_string());

        self.git
            .create_branch(mirror_dir, &tmp, &commit.to_string())?;
        let short = branch.strip_prefix("refs/heads/").unwrap_or(branch);
        let refspec = format!("+refs/heads/{}:refs/remotes/origin/{}", tmp, short);
        let fetched = self.git.fetch(target_dir, Some(&refspec), true);
        if let Err(e) = self.git.delete_branch(mirror_dir, &tmp) {
            warn!(dir = %mirror_dir.display(), branch = %tmp, error = %e, "failed to delete temporary branch");
        }
        fetched?;
        info!(
            target = %target_dir.display(),
            commit = %Revision::short(&commit),
            "shallow fetch finished"
        );
        Ok(())
    }

    fn prepare_target(&self, mirror_dir: &Path, target_dir: &Path) -> Result<()> {
        let mirror_url = mirror_dir.to_string_lossy();
        match Repository::open(target_dir) {
            Ok(repo) => {
                if repo.find_remote("origin").is_err() {
                    self.git.add_remote(target_dir, "origin", &mirror_url)?;
                }
                Ok(())
            }
            Err(_) => {
                if target_dir.exists() {
                    std::fs::remove_dir_all(target_dir)?;
                }
                self.git.init(target_dir, false)?;
                self.git.add_remote(target_dir, "origin", &mirror_url)
            }
        }
    }

    /// Returns whether the mirror was created from scratch
    fn prepare_locked(&self, dir: &Path, url: &str) -> Result<bool> {
        match self.store.state(dir) {
            MirrorState::Valid => Ok(false),
            MirrorState::Absent => {
                self.init_mirror(dir, url)?;
                Ok(true)
            }
            MirrorState::Invalid => {
                warn!(dir = %dir.display(), url, "mirror is not a valid repository, recreating");
                self.store.evict(dir);
                std::fs::remove_dir_all(dir)?;
                self.init_mirror(dir, url)?;
                Ok(true)
            }
        }
    }

    fn init_mirror(&self, dir: &Path, url: &str) -> Result<()> {
        info!(dir = %dir.display(), url, "initializing mirror");
        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.git.init(dir, true)?;
        self.git.add_remote(dir, "origin", url)
    }

    fn fetch_required(&self, repo: &Repository, full_ref: Option<&str>, wanted: Oid) -> Result<bool> {
        let outdated = remove_outdated_refs(repo)?;
        let repositories = self.store.repositories();
        if let Some(name) = full_ref {
            match repositories.resolve_ref(repo, name) {
                Some(local) if local == wanted => {}
                Some(_) => return Ok(true),
                None => {
                    debug!(reference = name, "no local ref, fetch required");
                    return Ok(true);
                }
            }
        }
        // A matching ref does not prove the object is there.
        Ok(outdated > 0 || !repositories.has_commit(repo, wanted))
    }

    fn contains_commit(&self, dir: &Path, wanted: Oid) -> Result<bool> {
        let repo = self.store.open(dir)?;
        let present = self.store.repositories().has_commit(&repo, wanted);
        self.store.close(dir, repo);
        Ok(present)
    }

    /// One fetch, retried once on a freshly recreated mirror
    fn fetch_with_recovery(&self, dir: &Path, url: &str, refspec: Option<&str>) -> Result<()> {
        remove_ref_locks(dir);
        let first = match self.git.fetch(dir, refspec, false) {
            Ok(()) => {
                self.store.evict(dir);
                info!(dir = %dir.display(), url, refspec = refspec.unwrap_or("<default>"), "fetched");
                return Ok(());
            }
            Err(e) => e,
        };

        warn!(
            dir = %dir.display(),
            url,
            error = %first,
            "fetch failed, recreating mirror and retrying"
        );
        let sync_error = |reason: &str, source: Error| Error::Sync {
            dir: dir.to_path_buf(),
            url: url.to_string(),
            reason: reason.to_string(),
            source: Some(Box::new(source)),
        };

        self.store.evict(dir);
        if dir.exists() {
            std::fs::remove_dir_all(dir)
                .map_err(|e| sync_error("cannot remove broken mirror", e.into()))?;
        }
        self.init_mirror(dir, url)
            .map_err(|e| sync_error("cannot recreate mirror", e))?;

        remove_ref_locks(dir);
        self.git
            .fetch(dir, refspec, false)
            .map_err(|e| sync_error("fetch failed on recreated mirror", e))?;
        self.store.evict(dir);
        info!(dir = %dir.display(), url, "fetched into recreated mirror");
        Ok(())
    }
}

/// Delete tag refs whose targets are missing from the object store.
///
/// Returns how many were removed; any removal means the ref set is stale.
pub fn remove_outdated_refs(repo: &Repository) -> Result<usize> {
    let odb = repo.odb().git_context(|| "opening object database")?;
    let mut outdated = Vec::new();
    for reference in repo
        .references_glob("refs/tags/*")
        .git_context(|| "listing tags")?
    {
        let reference = reference?;
        if let (Some(name), Some(target)) = (reference.name(), reference.target()) {
            if !odb.exists(target) {
                outdated.push(name.to_string());
            }
        }
    }
    for name in &outdated {
        debug!(reference = %name, "removing outdated ref");
        repo.find_reference(name)
            .and_then(|mut r| r.delete())
            .git_context(|| format!("deleting outdated ref {}", name))?;
    }
    Ok(outdated.len())
}

/// Delete `*.lock` files left under `refs/` and `packed-refs.lock`
pub fn remove_ref_locks(dir: &Path) -> usize {
    let mut removed = 0;
    let packed = dir.join("packed-refs.lock");
    let candidates = WalkDir::new(dir.join("refs"))
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "lock"))
        .chain(packed.is_file().then_some(packed));

    for lock in candidates {
        match std::fs::remove_file(&lock) {
            Ok(()) => {
                info!(lock = %lock.display(), "removed stale ref lock");
                removed += 1;
            }
            Err(e) => warn!(lock = %lock.display(), error = %e, "cannot remove ref lock"),
        }
    }
    removed
}
