//! Per-commit change computation across submodule boundaries

use crate::config::SubmodulePolicy;
use crate::context::OperationContext;
use crate::error::{GitContext, Result};
use crate::git::Revision;
use crate::platform::PathUtil;
use crate::tree::{self, FlatTree, TreeEntry};
use crate::types::{ChangeRecord, ChangeType, EntryKind, FixupSide, SubmoduleFixup};
use git2::{Oid, Sort};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Computes change sets between flattened trees of the root repository
pub struct ChangeComputer<'c, 's> {
    ctx: &'c OperationContext<'s>,
    policy: SubmodulePolicy,
    search_depth: u32,
    fixups: RefCell<HashMap<(Oid, String), Option<Oid>>>,
}

impl<'c, 's> ChangeComputer<'c, 's> {
    /// Computer using the root's policy and the configured search depth
    pub fn new(ctx: &'c OperationContext<'s>) -> Self {
        Self::with_search_depth(ctx, ctx.support().config().fixed_submodule_commit_search_depth)
    }

    /// Computer with an explicit fix-up search depth (0 disables the search)
    pub fn with_search_depth(ctx: &'c OperationContext<'s>, search_depth: u32) -> Self {
        Self {
            ctx,
            policy: ctx.root().submodule_policy,
            search_depth,
            fixups: RefCell::new(HashMap::new()),
        }
    }

    /// Changes from `before` (or an empty tree) to `after`.
    ///
    /// With `surface_errors`, submodule errors in `after` are returned instead
    /// of being routed through the fix-up search. The `before` side never
    /// surfaces them.
    pub fn changes_between(
        &self,
        before: Option<Oid>,
        after: Oid,
        surface_errors: bool,
    ) -> Result<Vec<ChangeRecord>> {
        let after_policy = if surface_errors {
            self.policy
        } else {
            self.policy.with_errors_ignored()
        };
        let mut cur = tree::flatten(self.ctx, after, after_policy, true)?;
        let mut par = match before {
            Some(before) => tree::flatten(self.ctx, before, self.policy.with_errors_ignored(), true)?,
            None => FlatTree::empty(),
        };

        let mut applied: BTreeMap<String, (SubmoduleFixup, (Option<Oid>, Option<Oid>))> =
            BTreeMap::new();
        for root in outermost(cur.broken.keys().chain(par.broken.keys())) {
            let broken_after = cur.broken.keys().any(|p| PathUtil::is_within(p, &root));
            let broken_before = par.broken.keys().any(|p| PathUtil::is_within(p, &root));
            let search_from = match (broken_after, before) {
                (true, _) => after,
                (false, Some(before)) => before,
                (false, None) => continue,
            };
            let Some(fix) = self.find_fixup(search_from, &root)? else {
                debug!(path = %root, commit = %Revision::short(&search_from), "no fix-up commit, keeping raw gitlink");
                continue;
            };
            let fix_tree = tree::flatten(self.ctx, fix, self.policy.with_errors_ignored(), false)?;
            let moved = (par.gitlinks.get(&root).copied(), cur.gitlinks.get(&root).copied());
            if broken_after {
                cur.splice(&root, &fix_tree);
            }
            if broken_before {
                par.splice(&root, &fix_tree);
            }
            debug!(path = %root, fixup = %Revision::short(&fix), "using fix-up commit for broken submodule");
            applied.insert(
                root.clone(),
                (
                    SubmoduleFixup {
                        submodule_path: root,
                        commit: fix,
                        side: if broken_after {
                            FixupSide::After
                        } else {
                            FixupSide::Before
                        },
                    },
                    moved,
                ),
            );
        }

        let before_rev = before.unwrap_or_else(Oid::zero);
        let mut records = diff_trees(&par, &cur, before_rev, after);
        for record in &mut records {
            let Some(fixup) = applied
                .iter()
                .find(|(root, _)| PathUtil::is_within(&record.path, root))
                .map(|(_, (fixup, _))| fixup.clone())
            else {
                continue;
            };
            match fixup.side {
                FixupSide::After => record.after_revision = fixup.commit,
                FixupSide::Before => record.before_revision = fixup.commit,
            }
            record.fixup = Some(fixup);
        }

        // The spliced subtree may equal the other side; the raw pointer move
        // is still reported against the fix-up commit.
        let mut moved_pointers = Vec::new();
        for (root, (fixup, (raw_before, raw_after))) in applied {
            if raw_before == raw_after
                || records.iter().any(|r| PathUtil::is_within(&r.path, &root))
            {
                continue;
            }
            let change_type = match (raw_before, raw_after) {
                (None, _) => ChangeType::Added,
                (_, None) => ChangeType::Deleted,
                _ => ChangeType::Modified,
            };
            let (before_revision, after_revision) = match fixup.side {
                FixupSide::After => (before_rev, fixup.commit),
                FixupSide::Before => (fixup.commit, after),
            };
            moved_pointers.push(ChangeRecord {
                path: root,
                change_type,
                entry_kind: EntryKind::Submodule,
                before_revision,
                after_revision,
                before_object: raw_before,
                after_object: raw_after,
                fixup: Some(fixup),
            });
        }
        if !moved_pointers.is_empty() {
            records.extend(moved_pointers);
            records.sort_by(|a, b| a.path.cmp(&b.path));
        }
        Ok(records)
    }

    /// Nearest ancestor of `commit` (excluding it) within the search depth
    /// whose gitlink at `path` resolves cleanly.
    pub fn find_fixup(&self, commit: Oid, path: &str) -> Result<Option<Oid>> {
        if self.search_depth == 0 {
            return Ok(None);
        }
        let key = (commit, path.to_string());
        if let Some(found) = self.fixups.borrow().get(&key) {
            return Ok(*found);
        }

        let candidates: Vec<Oid> = {
            let repo = self.ctx.repository()?;
            let mut walk = repo.revwalk()?;
            walk.set_sorting(Sort::TOPOLOGICAL)?;
            walk.push(commit)
                .git_context(|| format!("starting fix-up search at {}", commit))?;
            walk.skip(1)
                .take(self.search_depth as usize)
                .collect::<std::result::Result<Vec<Oid>, git2::Error>>()?
        };

        let mut found = None;
        for candidate in candidates {
            let flat = tree::flatten(self.ctx, candidate, self.policy.with_errors_ignored(), false)?;
            let clean = flat.resolved.contains(path)
                && !flat.broken.keys().any(|p| PathUtil::is_within(p, path));
            if clean {
                found = Some(candidate);
                break;
            }
        }
        self.fixups.borrow_mut().insert(key, found);
        Ok(found)
    }
}

/// Drop paths nested below another path of the set
fn outermost<'p>(paths: impl Iterator<Item = &'p String>) -> Vec<String> {
    let all: BTreeSet<&String> = paths.collect();
    all.iter()
        .filter(|p| !all.iter().any(|o| o != *p && PathUtil::is_within(p, o)))
        .map(|p| (*p).clone())
        .collect()
}

/// Compare two flattened trees path by path
pub fn diff_trees(
    before: &FlatTree,
    after: &FlatTree,
    before_rev: Oid,
    after_rev: Oid,
) -> Vec<ChangeRecord> {
    let paths: BTreeSet<&String> = before.entries.keys().chain(after.entries.keys()).collect();
    let mut records = Vec::new();
    for path in paths {
        let record = |change_type, kind, b: Option<&TreeEntry>, a: Option<&TreeEntry>| ChangeRecord {
            path: path.clone(),
            change_type,
            entry_kind: kind,
            before_revision: before_rev,
            after_revision: after_rev,
            before_object: b.map(|e| e.id),
            after_object: a.map(|e| e.id),
            fixup: None,
        };
        match (before.entries.get(path), after.entries.get(path)) {
            (None, Some(a)) => records.push(record(ChangeType::Added, a.kind, None, Some(a))),
            (Some(b), None) => records.push(record(ChangeType::Deleted, b.kind, Some(b), None)),
            (Some(b), Some(a)) if b.id != a.id || b.kind != a.kind => {
                let change_type = if b.kind == a.kind || (b.kind.is_blob_like() && a.kind.is_blob_like()) {
                    ChangeType::Modified
                } else {
                    ChangeType::TypeChanged
                };
                records.push(record(change_type, a.kind, Some(b), Some(a)));
            }
            _ => {}
        }
    }
    records
}
