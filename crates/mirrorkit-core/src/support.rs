//! Entry point tying configuration, mirror store and transport together
//!
//! A [`GitSupport`] lives for the whole process. Each public operation opens
//! an [`OperationContext`], runs inside it and closes it again, so repository
//! handles never outlive the call that opened them.

use crate::config::{PluginConfig, VcsRoot};
use crate::content;
use crate::context::OperationContext;
use crate::error::Result;
use crate::git::{self, Revision};
use crate::history::{ChangeComputer, ChangeWalker};
use crate::mirror::{store::store_for_capacity, MirrorLocator, MirrorStore, MirrorSynchronizer};
use crate::traits::GitExecutable;
use crate::types::{ChangeRecord, ModificationData};
use git2::Oid;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Process-wide git support: shared mirrors plus the fetch transport
pub struct GitSupport {
    config: PluginConfig,
    store: MirrorStore,
    git: Box<dyn GitExecutable>,
}

impl GitSupport {
    /// Support using the transport selected by `config`
    pub fn new(config: PluginConfig) -> Self {
        let git = git::transport_for(&config);
        Self::with_parts(config, git)
    }

    /// Support over an explicit transport
    pub fn with_parts(config: PluginConfig, git: Box<dyn GitExecutable>) -> Self {
        let store = MirrorStore::new(
            MirrorLocator::new(config.mirrors_dir.clone()),
            store_for_capacity(config.handle_cache_size),
        );
        debug!(
            mirrors_dir = %config.mirrors_dir.display(),
            cache = config.handle_cache_size,
            transport = ?config.transport,
            "git support ready"
        );
        Self { config, store, git }
    }

    /// Process-wide settings
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Shared mirror store
    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    /// Fetch transport
    pub fn git(&self) -> &dyn GitExecutable {
        self.git.as_ref()
    }

    /// Synchronizer over the shared store
    pub fn synchronizer(&self) -> MirrorSynchronizer<'_> {
        MirrorSynchronizer::new(&self.store, self.git.as_ref())
    }

    /// Open a scope for one operation on `root`
    pub fn create_context(&self, root: &VcsRoot, operation: &str) -> OperationContext<'_> {
        OperationContext::new(self, root, operation)
    }

    /// Directory holding the repository of `root`
    pub fn repository_dir(&self, root: &VcsRoot) -> PathBuf {
        self.store.locator().repository_dir(root)
    }

    /// Make `version` available in the mirror of `root`
    pub fn sync(&self, root: &VcsRoot, version: &str) -> Result<Oid> {
        self.run(root, "synchronizing mirror", |ctx| ctx.ensure_commit_loaded(version))
    }

    /// Bytes of `path` at `version`, read through flattened submodules
    pub fn get_content(&self, root: &VcsRoot, path: &str, version: &str) -> Result<Vec<u8>> {
        self.run(root, "retrieving content", |ctx| {
            content::get_content(ctx, path, version)
        })
    }

    /// Change batches reachable from `to`, newest first.
    ///
    /// Commits reachable from `from` are excluded. `limit` stops the walk after
    /// that many commits.
    pub fn collect_changes(
        &self,
        root: &VcsRoot,
        to: &str,
        from: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<ModificationData>> {
        self.run(root, "collecting changes", |ctx| {
            let to = ctx.ensure_commit_loaded(to)?;
            let from = from.map(|v| ctx.ensure_commit_loaded(v)).transpose()?;
            let repo = ctx.repository()?;
            let mut walker = ChangeWalker::new(ctx, &repo)?;
            walker.push(to)?;
            if let Some(from) = from {
                walker.hide(from)?;
            }
            if let Some(limit) = limit {
                walker.limit_by_number_of_commits(limit);
            }
            let batches = walker.collect::<Result<Vec<_>>>()?;
            info!(
                root = %root.name,
                to = %Revision::short(&to),
                batches = batches.len(),
                "collected changes"
            );
            Ok(batches)
        })
    }

    /// Changes between two commits, with `to` treated as the explicit target
    pub fn changes_between(&self, root: &VcsRoot, from: &str, to: &str) -> Result<Vec<ChangeRecord>> {
        self.run(root, "computing changes", |ctx| {
            let from = ctx.ensure_commit_loaded(from)?;
            let to = ctx.ensure_commit_loaded(to)?;
            ChangeComputer::new(ctx).changes_between(Some(from), to, true)
        })
    }

    /// Fetch the commit of `version` with depth 1 into `target_dir`,
    /// recorded as the remote-tracking ref of the root's branch
    pub fn shallow_fetch(&self, root: &VcsRoot, target_dir: &Path, version: &str) -> Result<Oid> {
        self.run(root, "shallow fetch", |ctx| {
            let commit = ctx.ensure_commit_loaded(version)?;
            ctx.discard(ctx.root_dir());
            ctx.synchronizer()
                .shallow_fetch_into(ctx.root_dir(), target_dir, &ctx.root().branch, commit)?;
            Ok(commit)
        })
    }

    /// Release every retained handle and fetch lock
    pub fn shutdown(&self) {
        info!("shutting down git support");
        self.store.shutdown();
    }

    fn run<T>(
        &self,
        root: &VcsRoot,
        operation: &str,
        f: impl FnOnce(&OperationContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let ctx = self.create_context(root, operation);
        let result = f(&ctx).map_err(|e| ctx.wrap_error(e));
        ctx.close();
        result
    }
}
