//! Gitlink to submodule commit resolution
//!
//! A resolver is scoped to one commit of one repository. Nested submodules get
//! their own resolver through [`SubmoduleResolver::sub_resolver`], so no state
//! is shared between sibling paths or nesting levels.

use crate::context::OperationContext;
use crate::error::{Error, GitContext, Result};
use crate::git::Revision;
use crate::submodule::config::{resolve_submodule_url, SubmoduleEntry, SubmodulesConfig};
use git2::{ObjectType, Oid};
use std::cell::OnceCell;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const GITMODULES: &str = ".gitmodules";

/// A gitlink mapped onto a commit in the submodule's own mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubmodule {
    /// Path inside the parent tree
    pub path: String,
    /// Absolute fetch URL of the submodule
    pub url: String,
    /// Mirror directory of the submodule
    pub repository: PathBuf,
    /// Pinned commit, present in `repository`
    pub commit: Oid,
}

/// Resolves gitlinks of one commit
pub struct SubmoduleResolver<'c, 's> {
    ctx: &'c OperationContext<'s>,
    repo_dir: PathBuf,
    repo_url: String,
    commit: Oid,
    config: OnceCell<Option<SubmodulesConfig>>,
}

impl<'c, 's> SubmoduleResolver<'c, 's> {
    /// Resolver for `commit` of the repository at `repo_dir`
    pub fn new(
        ctx: &'c OperationContext<'s>,
        repo_dir: impl Into<PathBuf>,
        repo_url: impl Into<String>,
        commit: Oid,
    ) -> Self {
        Self {
            ctx,
            repo_dir: repo_dir.into(),
            repo_url: repo_url.into(),
            commit,
            config: OnceCell::new(),
        }
    }

    /// Commit this resolver reads `.gitmodules` from
    pub fn commit(&self) -> Oid {
        self.commit
    }

    /// Directory of the repository holding the gitlinks
    pub fn repository_dir(&self) -> &std::path::Path {
        &self.repo_dir
    }

    /// Fetch URL of the repository holding the gitlinks
    pub fn repository_url(&self) -> &str {
        &self.repo_url
    }

    /// `.gitmodules` of the commit, loaded on first use.
    ///
    /// A missing or unparsable file yields `None`; only failing to open the
    /// repository or commit is an error.
    pub fn config(&self) -> Result<Option<&SubmodulesConfig>> {
        if let Some(config) = self.config.get() {
            return Ok(config.as_ref());
        }
        let loaded = self.load_config()?;
        Ok(self.config.get_or_init(|| loaded).as_ref())
    }

    fn load_config(&self) -> Result<Option<SubmodulesConfig>> {
        let repo = self.ctx.repository_at(&self.repo_dir, &self.repo_url)?;
        let commit = repo
            .find_commit(self.commit)
            .git_context(|| format!("loading commit {} from {}", self.commit, self.repo_url))?;
        let tree = commit.tree()?;
        let entry = match tree.get_path(std::path::Path::new(GITMODULES)) {
            Ok(entry) if entry.kind() == Some(ObjectType::Blob) => entry,
            _ => {
                debug!(commit = %Revision::short(&self.commit), url = %self.repo_url, "no .gitmodules");
                return Ok(None);
            }
        };
        let blob = match repo.find_blob(entry.id()) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(commit = %self.commit, error = %e, "cannot read .gitmodules");
                return Ok(None);
            }
        };
        let text = String::from_utf8_lossy(blob.content());
        match SubmodulesConfig::parse(&text) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                warn!(commit = %self.commit, url = %self.repo_url, error = %e, "cannot parse .gitmodules");
                Ok(None)
            }
        }
    }

    fn entry(&self, path: &str) -> Result<&SubmoduleEntry> {
        let reason = match self.config()? {
            None => "no .gitmodules configuration found",
            Some(config) => match config.find(path) {
                Some(entry) => return Ok(entry),
                None => "no entry for this path in .gitmodules",
            },
        };
        Err(Error::SubmoduleConfig {
            path: path.to_string(),
            commit: self.commit.to_string(),
            repository: self.repo_url.clone(),
            reason: reason.to_string(),
        })
    }

    /// Absolute URL configured for the submodule at `path`
    pub fn submodule_url(&self, path: &str) -> Result<String> {
        let entry = self.entry(path)?;
        Ok(resolve_submodule_url(&self.repo_url, &entry.url))
    }

    /// Whether a submodule lives below the directory `path`
    pub fn contains_submodule(&self, path: &str) -> bool {
        matches!(self.config(), Ok(Some(config)) if config.is_submodule_prefix(path))
    }

    /// Map the gitlink at `path` pinned to `pinned` onto the submodule's mirror.
    ///
    /// The mirror is created when absent. If the commit is missing, every
    /// branch is fetched once per context before giving up with
    /// `Error::SubmoduleCommitMissing`.
    pub fn resolve_submodule_commit(&self, path: &str, pinned: Oid) -> Result<ResolvedSubmodule> {
        let url = self.submodule_url(path)?;
        let dir = self.ctx.mirror_dir(&url);
        let resolved = ResolvedSubmodule {
            path: path.to_string(),
            url,
            repository: dir,
            commit: pinned,
        };

        if self.has_commit(&resolved)? {
            return Ok(resolved);
        }

        if self.ctx.mark_fetched(&resolved.repository) {
            info!(
                path,
                url = %resolved.url,
                commit = %Revision::short(&pinned),
                "submodule commit not in mirror, fetching"
            );
            self.ctx
                .synchronizer()
                .fetch_all_branches(&resolved.repository, &resolved.url)?;
            self.ctx.discard(&resolved.repository);
            if self.has_commit(&resolved)? {
                return Ok(resolved);
            }
        }

        Err(Error::SubmoduleCommitMissing {
            parent_url: self.repo_url.clone(),
            parent_commit: self.commit.to_string(),
            path: path.to_string(),
            submodule_url: resolved.url,
            pinned: pinned.to_string(),
        })
    }

    fn has_commit(&self, resolved: &ResolvedSubmodule) -> Result<bool> {
        let repo = self.ctx.repository_at(&resolved.repository, &resolved.url)?;
        Ok(self
            .ctx
            .store()
            .repositories()
            .has_commit(&repo, resolved.commit))
    }

    /// Resolver for the submodule at `path`, scoped to its commit `commit`
    pub fn sub_resolver(&self, path: &str, commit: Oid) -> Result<SubmoduleResolver<'c, 's>> {
        let url = self.submodule_url(path)?;
        let dir = self.ctx.mirror_dir(&url);
        Ok(SubmoduleResolver::new(self.ctx, dir, url, commit))
    }

}
