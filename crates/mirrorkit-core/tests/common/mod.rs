//! Shared fixtures: upstream repositories built with git2 and a transport
//! that records every call.

#![allow(dead_code)]

use git2::{Oid, Repository, Signature, Time};
use mirrorkit_core::git::EmbeddedGit;
use mirrorkit_core::{Error, GitExecutable, GitSupport, PluginConfig, Transport};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const GITLINK_MODE: i32 = 0o160000;

/// A non-bare upstream repository acting as the remote
pub struct Upstream {
    pub dir: PathBuf,
    repo: Repository,
    ticks: AtomicUsize,
}

enum Node {
    Blob(Oid, i32),
    Dir(BTreeMap<String, Node>),
}

impl Upstream {
    pub fn init(dir: &Path) -> Self {
        let repo = Repository::init(dir).unwrap();
        Self {
            dir: dir.to_path_buf(),
            repo,
            ticks: AtomicUsize::new(0),
        }
    }

    pub fn url(&self) -> String {
        self.dir.to_str().unwrap().to_string()
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Commit `files` (nested paths allowed) and gitlinks on top of `parents`
    pub fn commit(
        &self,
        files: &[(&str, &str)],
        gitlinks: &[(&str, Oid)],
        parents: &[Oid],
        message: &str,
    ) -> Oid {
        let mut root = BTreeMap::new();
        for (path, content) in files {
            let blob = self.repo.blob(content.as_bytes()).unwrap();
            insert(&mut root, path, Node::Blob(blob, 0o100644));
        }
        for (path, pinned) in gitlinks {
            insert(&mut root, path, Node::Blob(*pinned, GITLINK_MODE));
        }
        let tree_id = write_tree(&self.repo, &root);
        let tree = self.repo.find_tree(tree_id).unwrap();

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) as i64;
        let sig = Signature::new("Test User", "test@example.com", &Time::new(1_700_000_000 + tick, 0))
            .unwrap();
        let parent_commits: Vec<git2::Commit<'_>> = parents
            .iter()
            .map(|p| self.repo.find_commit(*p).unwrap())
            .collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();
        self.repo
            .commit(None, &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    pub fn set_branch(&self, name: &str, commit: Oid) {
        self.repo
            .reference(&format!("refs/heads/{}", name), commit, true, "test")
            .unwrap();
    }

    /// Linear history of `count` commits on `main`, each changing `file.txt`
    pub fn linear(&self, count: usize) -> Vec<Oid> {
        let mut commits: Vec<Oid> = Vec::new();
        for i in 0..count {
            let content = format!("version {}\n", i);
            let parents: Vec<Oid> = commits.last().copied().into_iter().collect();
            let oid = self.commit(
                &[("file.txt", content.as_str()), ("static.txt", "unchanged\n")],
                &[],
                &parents,
                &format!("commit {}", i),
            );
            commits.push(oid);
        }
        self.set_branch("main", *commits.last().unwrap());
        commits
    }
}

fn insert(dir: &mut BTreeMap<String, Node>, path: &str, node: Node) {
    match path.split_once('/') {
        None => {
            dir.insert(path.to_string(), node);
        }
        Some((head, rest)) => {
            let child = dir
                .entry(head.to_string())
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            match child {
                Node::Dir(children) => insert(children, rest, node),
                Node::Blob(..) => panic!("{} is a file", head),
            }
        }
    }
}

fn write_tree(repo: &Repository, dir: &BTreeMap<String, Node>) -> Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    for (name, node) in dir {
        match node {
            Node::Blob(id, mode) => {
                builder.insert(name, *id, *mode).unwrap();
            }
            Node::Dir(children) => {
                let id = write_tree(repo, children);
                builder.insert(name, id, 0o040000).unwrap();
            }
        }
    }
    builder.write().unwrap()
}

/// `.gitmodules` text for `(path, url)` pairs
pub fn gitmodules(entries: &[(&str, &str)]) -> String {
    entries
        .iter()
        .map(|(path, url)| format!("[submodule \"{}\"]\n\tpath = {}\n\turl = {}\n", path, path, url))
        .collect()
}

/// A call observed by [`CountingGit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Init { bare: bool },
    AddRemote { name: String, url: String },
    Fetch { refspec: Option<String>, shallow: bool },
    DeleteBranch(String),
    CreateBranch(String),
    ShowRefs,
}

/// Embedded transport recording calls per directory, with injectable fetch failures
#[derive(Clone, Default)]
pub struct CountingGit {
    inner: EmbeddedGit,
    calls: Arc<Mutex<Vec<(PathBuf, GitCall)>>>,
    failing_fetches: Arc<AtomicUsize>,
}

impl CountingGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` fetches fail before reaching the remote
    pub fn fail_next_fetches(&self, n: usize) {
        self.failing_fetches.store(n, Ordering::SeqCst);
    }

    pub fn calls_for(&self, dir: &Path) -> Vec<GitCall> {
        self.calls
            .lock()
            .iter()
            .filter(|(d, _)| d == dir)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn fetches_for(&self, dir: &Path) -> usize {
        self.calls_for(dir)
            .iter()
            .filter(|c| matches!(c, GitCall::Fetch { .. }))
            .count()
    }

    pub fn inits_for(&self, dir: &Path) -> usize {
        self.calls_for(dir)
            .iter()
            .filter(|c| matches!(c, GitCall::Init { .. }))
            .count()
    }

    pub fn fetch_counts(&self) -> HashMap<PathBuf, usize> {
        let mut counts = HashMap::new();
        for (dir, call) in self.calls.lock().iter() {
            if matches!(call, GitCall::Fetch { .. }) {
                *counts.entry(dir.clone()).or_default() += 1;
            }
        }
        counts
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, dir: &Path, call: GitCall) {
        self.calls.lock().push((dir.to_path_buf(), call));
    }
}

impl GitExecutable for CountingGit {
    fn init(&self, dir: &Path, bare: bool) -> mirrorkit_core::Result<()> {
        self.record(dir, GitCall::Init { bare });
        self.inner.init(dir, bare)
    }

    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> mirrorkit_core::Result<()> {
        self.record(
            dir,
            GitCall::AddRemote {
                name: name.to_string(),
                url: url.to_string(),
            },
        );
        self.inner.add_remote(dir, name, url)
    }

    fn fetch(&self, dir: &Path, refspec: Option<&str>, shallow: bool) -> mirrorkit_core::Result<()> {
        self.record(
            dir,
            GitCall::Fetch {
                refspec: refspec.map(str::to_string),
                shallow,
            },
        );
        let failing = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Command {
                command: format!("git fetch origin {}", refspec.unwrap_or_default()),
                exit_code: Some(128),
                stderr: "fatal: unable to access remote".to_string(),
                stdout: String::new(),
            });
        }
        self.inner.fetch(dir, refspec, shallow)
    }

    fn delete_branch(&self, dir: &Path, name: &str) -> mirrorkit_core::Result<()> {
        self.record(dir, GitCall::DeleteBranch(name.to_string()));
        self.inner.delete_branch(dir, name)
    }

    fn create_branch(&self, dir: &Path, name: &str, start_point: &str) -> mirrorkit_core::Result<()> {
        self.record(dir, GitCall::CreateBranch(name.to_string()));
        self.inner.create_branch(dir, name, start_point)
    }

    fn show_refs(&self, dir: &Path) -> mirrorkit_core::Result<BTreeMap<String, String>> {
        self.record(dir, GitCall::ShowRefs);
        self.inner.show_refs(dir)
    }
}

/// Support over an embedded, counting transport
pub fn support(mirrors: &Path, git: &CountingGit) -> GitSupport {
    let config = PluginConfig {
        transport: Transport::Embedded,
        ..PluginConfig::with_mirrors_dir(mirrors)
    };
    GitSupport::with_parts(config, Box::new(git.clone()))
}
