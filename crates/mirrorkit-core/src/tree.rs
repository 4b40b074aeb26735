//! Submodule-aware trees
//!
//! A commit's tree is flattened into a map of paths to leaf entries. Gitlinks
//! stay as single entries compared by their pinned commit unless the root's
//! policy flattens them, in which case the submodule's own tree is spliced in
//! below the gitlink path, read from the submodule's mirror.

use crate::config::SubmodulePolicy;
use crate::context::OperationContext;
use crate::error::{GitContext, Result};
use crate::git::Revision;
use crate::platform::PathUtil;
use crate::submodule::SubmoduleResolver;
use crate::types::EntryKind;
use git2::{ObjectType, Oid, TreeWalkMode, TreeWalkResult};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::warn;

/// A leaf of a flattened tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Blob id, or pinned commit for gitlinks
    pub id: Oid,
    /// Entry kind
    pub kind: EntryKind,
    /// Repository holding the object
    pub repository: PathBuf,
    /// Innermost submodule path containing the entry, `None` in the root repository
    pub submodule: Option<String>,
}

/// Flattened view of one commit
#[derive(Debug, Clone, Default)]
pub struct FlatTree {
    /// Commit of the root repository
    pub commit: Option<Oid>,
    /// Leaves by full path
    pub entries: BTreeMap<String, TreeEntry>,
    /// Gitlinks that could not be resolved, with the reason
    pub broken: BTreeMap<String, String>,
    /// Gitlinks that were flattened successfully
    pub resolved: BTreeSet<String>,
    /// Pinned commit of every gitlink met, flattened or not
    pub gitlinks: BTreeMap<String, Oid>,
}

impl FlatTree {
    /// Tree of a commit with no content, used as the parent of root commits
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace everything at and below `root` by the same subtree of `other`
    pub fn splice(&mut self, root: &str, other: &FlatTree) {
        self.entries.retain(|path, _| !PathUtil::is_within(path, root));
        self.broken.retain(|path, _| !PathUtil::is_within(path, root));
        self.resolved.retain(|path| !PathUtil::is_within(path, root));
        self.gitlinks.retain(|path, _| !PathUtil::is_within(path, root));
        for (path, entry) in &other.entries {
            if PathUtil::is_within(path, root) {
                self.entries.insert(path.clone(), entry.clone());
            }
        }
        for (path, reason) in &other.broken {
            if PathUtil::is_within(path, root) {
                self.broken.insert(path.clone(), reason.clone());
            }
        }
        for path in &other.resolved {
            if PathUtil::is_within(path, root) {
                self.resolved.insert(path.clone());
            }
        }
        for (path, pinned) in &other.gitlinks {
            if PathUtil::is_within(path, root) {
                self.gitlinks.insert(path.clone(), *pinned);
            }
        }
    }
}

/// Flatten `commit` of the context's root repository under `policy`.
///
/// Submodule errors are returned unless the policy ignores them, in which
/// case the raw gitlink is kept and recorded in [`FlatTree::broken`]
/// (logged when `log_errors` is set).
pub fn flatten(
    ctx: &OperationContext<'_>,
    commit: Oid,
    policy: SubmodulePolicy,
    log_errors: bool,
) -> Result<FlatTree> {
    let mut out = FlatTree {
        commit: Some(commit),
        ..FlatTree::default()
    };
    let root_dir = ctx.root_dir().to_path_buf();
    let root_url = ctx.root().fetch_url.clone();
    let resolver = SubmoduleResolver::new(ctx, root_dir, root_url, commit);
    collect(ctx, &resolver, "", None, 0, policy, log_errors, &mut out)?;
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn collect(
    ctx: &OperationContext<'_>,
    resolver: &SubmoduleResolver<'_, '_>,
    prefix: &str,
    submodule: Option<&str>,
    level: usize,
    policy: SubmodulePolicy,
    log_errors: bool,
    out: &mut FlatTree,
) -> Result<()> {
    let repo_dir = resolver.repository_dir().to_path_buf();
    let mut gitlinks = Vec::new();
    {
        let repo = ctx.repository_at(&repo_dir, resolver.repository_url())?;
        let commit = repo.find_commit(resolver.commit()).git_context(|| {
            format!(
                "loading commit {} from {}",
                resolver.commit(),
                resolver.repository_url()
            )
        })?;
        let tree = commit.tree()?;
        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            let Some(name) = entry.name() else {
                return TreeWalkResult::Skip;
            };
            let relative = format!("{}{}", dir, name);
            match (entry.kind(), EntryKind::from_mode(entry.filemode())) {
                (Some(ObjectType::Commit), _) => gitlinks.push((relative, entry.id())),
                (Some(ObjectType::Blob), Some(kind)) => {
                    out.entries.insert(
                        PathUtil::join(prefix, &relative),
                        TreeEntry {
                            id: entry.id(),
                            kind,
                            repository: repo_dir.clone(),
                            submodule: submodule.map(str::to_string),
                        },
                    );
                }
                _ => {}
            }
            TreeWalkResult::Ok
        })
        .git_context(|| format!("walking tree of {}", resolver.commit()))?;
    }

    for (relative, pinned) in gitlinks {
        let full = PathUtil::join(prefix, &relative);
        out.gitlinks.insert(full.clone(), pinned);
        let raw = TreeEntry {
            id: pinned,
            kind: EntryKind::Submodule,
            repository: repo_dir.clone(),
            submodule: submodule.map(str::to_string),
        };
        if !policy.flattens_level(level) {
            out.entries.insert(full, raw);
            continue;
        }

        let nested = resolver
            .resolve_submodule_commit(&relative, pinned)
            .and_then(|resolved| {
                let sub = resolver.sub_resolver(&relative, resolved.commit)?;
                collect(ctx, &sub, &full, Some(&full), level + 1, policy, log_errors, out)
            });
        match nested {
            Ok(()) => {
                out.resolved.insert(full);
            }
            Err(e) if policy.ignores_errors() && e.is_submodule_error() => {
                if log_errors {
                    warn!(
                        path = %full,
                        commit = %Revision::short(&resolver.commit()),
                        error = %e,
                        "cannot resolve submodule, keeping raw gitlink"
                    );
                }
                out.entries.retain(|path, _| !PathUtil::is_within(path, &full));
                out.entries.insert(full.clone(), raw);
                out.broken.insert(full, e.to_string());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// A blob located through gitlinks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedBlob {
    /// Repository holding the blob
    pub repository: PathBuf,
    /// Fetch URL of that repository
    pub url: String,
    /// Blob id
    pub id: Oid,
    /// Entry kind
    pub kind: EntryKind,
}

/// Find the blob at `path` in `commit`, descending into submodules the policy flattens.
///
/// Returns `None` when nothing readable exists at `path`. Submodule errors on
/// the way are returned.
pub fn lookup(
    ctx: &OperationContext<'_>,
    commit: Oid,
    path: &str,
    policy: SubmodulePolicy,
) -> Result<Option<LocatedBlob>> {
    let resolver = SubmoduleResolver::new(
        ctx,
        ctx.root_dir().to_path_buf(),
        ctx.root().fetch_url.clone(),
        commit,
    );
    let components: Vec<&str> = PathUtil::components(path).collect();
    lookup_in(ctx, &resolver, &components, 0, policy)
}

fn lookup_in(
    ctx: &OperationContext<'_>,
    resolver: &SubmoduleResolver<'_, '_>,
    components: &[&str],
    level: usize,
    policy: SubmodulePolicy,
) -> Result<Option<LocatedBlob>> {
    if components.is_empty() {
        return Ok(None);
    }
    let repo_dir = resolver.repository_dir().to_path_buf();
    let repo = ctx.repository_at(&repo_dir, resolver.repository_url())?;
    let commit = repo
        .find_commit(resolver.commit())
        .git_context(|| format!("loading commit {}", resolver.commit()))?;
    let tree = commit.tree()?;

    let mut prefix = PathBuf::new();
    for (i, component) in components.iter().enumerate() {
        prefix.push(component);
        let entry = match tree.get_path(&prefix) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let last = i + 1 == components.len();
        match entry.kind() {
            Some(ObjectType::Blob) if last => {
                let Some(kind) = EntryKind::from_mode(entry.filemode()) else {
                    return Ok(None);
                };
                return Ok(Some(LocatedBlob {
                    repository: repo_dir,
                    url: resolver.repository_url().to_string(),
                    id: entry.id(),
                    kind,
                }));
            }
            Some(ObjectType::Tree) if !last => continue,
            Some(ObjectType::Commit) if !last && policy.flattens_level(level) => {
                let relative = components[..=i].join("/");
                let resolved = resolver.resolve_submodule_commit(&relative, entry.id())?;
                let sub = resolver.sub_resolver(&relative, resolved.commit)?;
                return lookup_in(ctx, &sub, &components[i + 1..], level + 1, policy);
            }
            _ => return Ok(None),
        }
    }
    Ok(None)
}
