//! In-process transport over libgit2
//!
//! Built without network transports, so only local paths and `file://`
//! remotes can be fetched. Shallow fetches are performed as full fetches.

use crate::error::{GitContext, Result};
use crate::traits::GitExecutable;
use git2::{BranchType, FetchOptions, Repository};
use std::collections::BTreeMap;
use std::path::Path;

/// `GitExecutable` backed by libgit2
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedGit;

impl EmbeddedGit {
    /// New embedded transport
    pub fn new() -> Self {
        Self
    }

    fn open(dir: &Path) -> Result<Repository> {
        Repository::open(dir).git_context(|| format!("opening {}", dir.display()))
    }
}

impl GitExecutable for EmbeddedGit {
    fn init(&self, dir: &Path, bare: bool) -> Result<()> {
        let res = if bare {
            Repository::init_bare(dir)
        } else {
            Repository::init(dir)
        };
        res.map(drop)
            .git_context(|| format!("initializing {}", dir.display()))
    }

    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<()> {
        let repo = Self::open(dir)?;
        repo.remote(name, url)
            .map(drop)
            .git_context(|| format!("adding remote {} ({}) to {}", name, url, dir.display()))
    }

    fn fetch(&self, dir: &Path, refspec: Option<&str>, shallow: bool) -> Result<()> {
        if shallow {
            tracing::debug!(dir = %dir.display(), "embedded transport fetches full history");
        }
        let repo = Self::open(dir)?;
        let mut remote = repo
            .find_remote("origin")
            .git_context(|| format!("finding origin of {}", dir.display()))?;
        let refspecs: Vec<&str> = refspec.into_iter().collect();
        let mut opts = FetchOptions::new();
        opts.download_tags(git2::AutotagOption::None);
        remote
            .fetch(&refspecs, Some(&mut opts), None)
            .git_context(|| {
                format!(
                    "fetching {} into {}",
                    refspec.unwrap_or("default refspecs"),
                    dir.display()
                )
            })
    }

    fn delete_branch(&self, dir: &Path, name: &str) -> Result<()> {
        let repo = Self::open(dir)?;
        let mut branch = repo
            .find_branch(name, BranchType::Local)
            .git_context(|| format!("finding branch {} in {}", name, dir.display()))?;
        branch
            .delete()
            .git_context(|| format!("deleting branch {} in {}", name, dir.display()))
    }

    fn create_branch(&self, dir: &Path, name: &str, start_point: &str) -> Result<()> {
        let repo = Self::open(dir)?;
        let target = repo
            .revparse_single(start_point)
            .and_then(|obj| obj.peel_to_commit())
            .git_context(|| format!("resolving {} in {}", start_point, dir.display()))?;
        repo.branch(name, &target, false)
            .map(drop)
            .git_context(|| format!("creating branch {} in {}", name, dir.display()))
    }

    fn show_refs(&self, dir: &Path) -> Result<BTreeMap<String, String>> {
        let repo = Self::open(dir)?;
        let mut refs = BTreeMap::new();
        for reference in repo
            .references()
            .git_context(|| format!("listing refs of {}", dir.display()))?
        {
            let reference = reference?;
            if let (Some(name), Some(target)) = (reference.name(), reference.target()) {
                refs.insert(name.to_string(), target.to_string());
            }
        }
        Ok(refs)
    }
}
