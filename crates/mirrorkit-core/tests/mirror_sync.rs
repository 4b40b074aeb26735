//! Mirror creation, fetch skipping and recovery against local upstreams

mod common;

use assert_matches::assert_matches;
use common::{support, CountingGit, GitCall, Upstream};
use git2::Repository;
use mirrorkit_core::git::ALL_BRANCHES_REFSPEC;
use mirrorkit_core::{Error, RevisionRef, VcsRoot};
use tempfile::TempDir;

fn setup() -> (TempDir, Upstream) {
    let tmp = TempDir::new().unwrap();
    let upstream = Upstream::init(&tmp.path().join("upstream"));
    (tmp, upstream)
}

#[test]
fn test_absent_mirror_created_with_single_branch_fetch() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(2);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let root = VcsRoot::new("repo", upstream.url()).with_branch("main");

    let head = support.sync(&root, &commits[1].to_string()).unwrap();
    assert_eq!(head, commits[1]);

    let mirror = support.repository_dir(&root);
    assert_eq!(
        git.calls_for(&mirror),
        vec![
            GitCall::Init { bare: true },
            GitCall::AddRemote {
                name: "origin".to_string(),
                url: upstream.url(),
            },
            GitCall::Fetch {
                refspec: Some("+refs/heads/main:refs/heads/main".to_string()),
                shallow: false,
            },
        ]
    );
    let repo = Repository::open(&mirror).unwrap();
    assert!(repo.is_bare());
    assert_eq!(repo.refname_to_id("refs/heads/main").unwrap(), commits[1]);
}

#[test]
fn test_second_sync_does_not_fetch() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(3);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let root = VcsRoot::new("repo", upstream.url()).with_branch("main");
    let mirror = support.repository_dir(&root);

    support.sync(&root, &commits[2].to_string()).unwrap();
    support.sync(&root, &commits[2].to_string()).unwrap();
    // Older commits arrived with the first fetch
    support.sync(&root, &commits[0].to_string()).unwrap();
    assert_eq!(git.fetches_for(&mirror), 1);
}

#[test]
fn test_ensure_present_twice_skips_second_fetch() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(1);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let mirror = support.store().mirror_dir(&upstream.url());
    let sync = support.synchronizer();

    sync.ensure_present(&mirror, &upstream.url(), Some("main"), commits[0])
        .unwrap();
    sync.ensure_present(&mirror, &upstream.url(), Some("main"), commits[0])
        .unwrap();
    assert_eq!(git.fetches_for(&mirror), 1);
    assert_eq!(git.inits_for(&mirror), 1);
}

#[test]
fn test_new_upstream_commit_triggers_fetch() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(1);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let root = VcsRoot::new("repo", upstream.url()).with_branch("main");
    let mirror = support.repository_dir(&root);

    support.sync(&root, &commits[0].to_string()).unwrap();
    let next = upstream.commit(&[("file.txt", "next\n")], &[], &[commits[0]], "next");
    upstream.set_branch("main", next);
    support.sync(&root, &next.to_string()).unwrap();

    assert_eq!(git.fetches_for(&mirror), 2);
    assert_eq!(git.inits_for(&mirror), 1);
}

#[test]
fn test_corrupted_mirror_is_rebuilt() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(2);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let root = VcsRoot::new("repo", upstream.url()).with_branch("main");
    let mirror = support.repository_dir(&root);

    std::fs::create_dir_all(&mirror).unwrap();
    std::fs::write(mirror.join("junk"), b"not a repository").unwrap();

    support.sync(&root, &commits[1].to_string()).unwrap();

    assert!(!mirror.join("junk").exists());
    let repo = Repository::open(&mirror).unwrap();
    assert!(repo.find_commit(commits[1]).is_ok());
    assert_eq!(git.inits_for(&mirror), 1);
    assert_eq!(git.fetches_for(&mirror), 1);
}

#[test]
fn test_stale_ref_locks_removed_before_fetch() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(1);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let root = VcsRoot::new("repo", upstream.url()).with_branch("main");
    let mirror = support.repository_dir(&root);
    support.sync(&root, &commits[0].to_string()).unwrap();

    let branch_lock = mirror.join("refs").join("heads").join("main.lock");
    std::fs::create_dir_all(branch_lock.parent().unwrap()).unwrap();
    std::fs::write(&branch_lock, b"").unwrap();
    std::fs::write(mirror.join("packed-refs.lock"), b"").unwrap();

    let next = upstream.commit(&[("file.txt", "next\n")], &[], &[commits[0]], "next");
    upstream.set_branch("main", next);
    support.sync(&root, &next.to_string()).unwrap();

    assert!(!branch_lock.exists());
    assert!(!mirror.join("packed-refs.lock").exists());
    // Cleared in place, no recreation needed
    assert_eq!(git.inits_for(&mirror), 1);
    let repo = Repository::open(&mirror).unwrap();
    assert_eq!(repo.refname_to_id("refs/heads/main").unwrap(), next);
}

#[test]
fn test_lock_beside_dangling_tag_cleared_before_tag_cleanup() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(1);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let root = VcsRoot::new("repo", upstream.url()).with_branch("main");
    let mirror = support.repository_dir(&root);
    support.sync(&root, &commits[0].to_string()).unwrap();

    let tags = mirror.join("refs").join("tags");
    std::fs::create_dir_all(&tags).unwrap();
    std::fs::write(tags.join("v1"), "1111111111111111111111111111111111111111\n").unwrap();
    std::fs::write(tags.join("v1.lock"), b"").unwrap();

    let next = upstream.commit(&[("file.txt", "next\n")], &[], &[commits[0]], "next");
    upstream.set_branch("main", next);
    support.sync(&root, &next.to_string()).unwrap();

    assert!(!tags.join("v1.lock").exists());
    assert!(!tags.join("v1").exists());
    assert_eq!(git.inits_for(&mirror), 1);
    assert_eq!(git.fetches_for(&mirror), 2);
}

#[test]
fn test_failed_fetch_recreates_mirror_and_retries() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(2);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let root = VcsRoot::new("repo", upstream.url()).with_branch("main");
    let mirror = support.repository_dir(&root);

    git.fail_next_fetches(1);
    support.sync(&root, &commits[1].to_string()).unwrap();

    let calls = git.calls_for(&mirror);
    assert_eq!(git.inits_for(&mirror), 2);
    assert_eq!(git.fetches_for(&mirror), 2);
    assert_eq!(calls.last(), calls.get(2));
    let repo = Repository::open(&mirror).unwrap();
    assert!(repo.find_commit(commits[1]).is_ok());
}

#[test]
fn test_double_fetch_failure_is_sync_error() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(1);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let root = VcsRoot::new("repo", upstream.url()).with_branch("main");

    git.fail_next_fetches(2);
    let err = support.sync(&root, &commits[0].to_string()).unwrap_err();

    assert!(err.to_string().starts_with("Synchronizing mirror failed"));
    assert_matches!(err.innermost(), Error::Sync { url, source: Some(_), .. } if *url == upstream.url());
    assert_eq!(git.fetches_for(&support.repository_dir(&root)), 2);
}

#[test]
fn test_unknown_commit_fetches_all_branches_then_fails() {
    let (tmp, upstream) = setup();
    upstream.linear(1);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let root = VcsRoot::new("repo", upstream.url()).with_branch("main");
    let mirror = support.repository_dir(&root);

    let err = support
        .sync(&root, "0123456789abcdef0123456789abcdef01234567")
        .unwrap_err();

    assert_matches!(err.innermost(), Error::Sync { source: None, .. });
    let fetches: Vec<GitCall> = git
        .calls_for(&mirror)
        .into_iter()
        .filter(|c| matches!(c, GitCall::Fetch { .. }))
        .collect();
    assert_eq!(
        fetches,
        vec![
            GitCall::Fetch {
                refspec: Some("+refs/heads/main:refs/heads/main".to_string()),
                shallow: false,
            },
            GitCall::Fetch {
                refspec: Some(ALL_BRANCHES_REFSPEC.to_string()),
                shallow: false,
            },
        ]
    );
}

#[test]
fn test_commit_on_other_branch_found_by_full_fetch() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(1);
    let side = upstream.commit(&[("side.txt", "side\n")], &[], &[commits[0]], "side");
    upstream.set_branch("feature", side);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let root = VcsRoot::new("repo", upstream.url()).with_branch("main");
    let mirror = support.repository_dir(&root);

    support.sync(&root, &side.to_string()).unwrap();

    assert_eq!(git.fetches_for(&mirror), 2);
    let repo = Repository::open(&mirror).unwrap();
    assert_eq!(repo.refname_to_id("refs/heads/feature").unwrap(), side);
}

#[test]
fn test_url_spelling_variants_share_a_mirror() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(1);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let plain = VcsRoot::new("a", upstream.url()).with_branch("main");
    let slashed = VcsRoot::new("b", format!("{}/", upstream.url())).with_branch("main");

    assert_eq!(support.repository_dir(&plain), support.repository_dir(&slashed));
    support.sync(&plain, &commits[0].to_string()).unwrap();
    support.sync(&slashed, &commits[0].to_string()).unwrap();
    assert_eq!(git.fetches_for(&support.repository_dir(&plain)), 1);
}

#[test]
fn test_custom_relative_path_lives_under_mirrors_dir() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(1);
    let git = CountingGit::new();
    let mirrors = tmp.path().join("mirrors");
    let support = support(&mirrors, &git);
    let root = VcsRoot::new("repo", upstream.url())
        .with_branch("main")
        .with_path("custom/repo.git");

    support.sync(&root, &commits[0].to_string()).unwrap();
    assert_eq!(support.repository_dir(&root), mirrors.join("custom/repo.git"));
    assert!(Repository::open(mirrors.join("custom/repo.git")).is_ok());
}

#[test]
fn test_invalid_revision_rejected_before_any_fetch() {
    let (tmp, upstream) = setup();
    upstream.linear(1);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let root = VcsRoot::new("repo", upstream.url()).with_branch("main");

    let err = support.sync(&root, "main").unwrap_err();
    assert_matches!(err.innermost(), Error::InvalidRevision { .. });
    assert_eq!(git.fetches_for(&support.repository_dir(&root)), 0);
}

#[test]
fn test_ensure_revision_on_branch_matches_ensure_present() {
    let (tmp, upstream) = setup();
    let commits = upstream.linear(2);
    let git = CountingGit::new();
    let support = support(&tmp.path().join("mirrors"), &git);
    let mirror = support.store().mirror_dir(&upstream.url());
    let sync = support.synchronizer();

    sync.ensure_revision(&mirror, &upstream.url(), &RevisionRef::on_branch(commits[1], "main"))
        .unwrap();
    // Satisfied by the existing mirror
    sync.ensure_revision(&mirror, &upstream.url(), &RevisionRef::commit(commits[0]))
        .unwrap();
    assert_eq!(git.fetches_for(&mirror), 1);
    assert!(Repository::open(&mirror).unwrap().find_commit(commits[0]).is_ok());
}
