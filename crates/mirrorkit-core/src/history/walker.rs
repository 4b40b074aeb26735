//! Lazy walk over commit ancestry yielding change sets

use crate::context::OperationContext;
use crate::error::{GitContext, Result};
use crate::git::Revision;
use crate::history::changes::ChangeComputer;
use crate::types::ModificationData;
use git2::{Oid, Repository, Revwalk, Sort};
use tracing::debug;

/// Topological walk from one or more starting commits.
///
/// The first commit produced is the caller's explicit target, so its
/// submodule errors are returned; later commits route them through the
/// fix-up search. An error ends the walk.
pub struct ChangeWalker<'r, 's> {
    repo: &'r Repository,
    revwalk: Revwalk<'r>,
    computer: ChangeComputer<'r, 's>,
    limit: Option<usize>,
    next_call_count: usize,
    done: bool,
}

impl<'r, 's> ChangeWalker<'r, 's> {
    /// Walker over the root repository of `ctx`; `repo` must be its handle
    pub fn new(ctx: &'r OperationContext<'s>, repo: &'r Repository) -> Result<Self> {
        let mut revwalk = repo.revwalk().git_context(|| "creating revision walk")?;
        revwalk.set_sorting(Sort::TOPOLOGICAL)?;
        Ok(Self {
            repo,
            revwalk,
            computer: ChangeComputer::new(ctx),
            limit: None,
            next_call_count: 0,
            done: false,
        })
    }

    /// Use a custom computer, e.g. one with another search depth
    pub fn with_computer(mut self, computer: ChangeComputer<'r, 's>) -> Self {
        self.computer = computer;
        self
    }

    /// Start the walk at `commit`
    pub fn push(&mut self, commit: Oid) -> Result<()> {
        self.revwalk
            .push(commit)
            .git_context(|| format!("starting walk at {}", commit))
    }

    /// Exclude `commit` and its ancestors
    pub fn hide(&mut self, commit: Oid) -> Result<()> {
        self.revwalk
            .hide(commit)
            .git_context(|| format!("hiding {} from walk", commit))
    }

    /// Stop after `limit` commits as if history ended there
    pub fn limit_by_number_of_commits(&mut self, limit: usize) {
        self.limit = Some(limit);
    }

    /// Commits produced so far
    pub fn visited(&self) -> usize {
        self.next_call_count
    }

    fn modification_data(&self, oid: Oid, first: bool) -> Result<ModificationData> {
        let commit = self
            .repo
            .find_commit(oid)
            .git_context(|| format!("loading commit {}", oid))?;
        let parents: Vec<Oid> = if commit.parent_count() == 0 {
            vec![Oid::zero()]
        } else {
            commit.parent_ids().collect()
        };
        let first_parent = commit.parent_id(0).ok();
        let changes = self.computer.changes_between(first_parent, oid, first)?;

        let author = commit.author();
        let time = chrono::DateTime::<chrono::Utc>::from_timestamp(author.when().seconds(), 0)
            .unwrap_or_default();
        debug!(
            commit = %Revision::short(&oid),
            changes = changes.len(),
            parents = parents.len(),
            "walked commit"
        );
        Ok(ModificationData {
            version: oid,
            parents,
            author: author.name().unwrap_or_default().to_string(),
            email: author.email().unwrap_or_default().to_string(),
            time,
            message: commit.message().unwrap_or_default().to_string(),
            changes,
        })
    }
}

impl Iterator for ChangeWalker<'_, '_> {
    type Item = Result<ModificationData>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(limit) = self.limit {
            if self.next_call_count >= limit {
                self.done = true;
                return None;
            }
        }
        let oid = match self.revwalk.next() {
            Some(Ok(oid)) => oid,
            Some(Err(e)) => {
                self.done = true;
                return Some(Err(e.into()));
            }
            None => {
                self.done = true;
                return None;
            }
        };
        self.next_call_count += 1;
        let first = self.next_call_count == 1;
        let data = self.modification_data(oid, first);
        if data.is_err() {
            self.done = true;
        }
        Some(data)
    }
}

impl std::iter::FusedIterator for ChangeWalker<'_, '_> {}
