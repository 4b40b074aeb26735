//! Property-based tests using proptest

use mirrorkit_core::git::Revision;
use mirrorkit_core::mirror::MirrorLocator;
use mirrorkit_core::submodule::{resolve_submodule_url, SubmodulesConfig};
use proptest::prelude::*;

fn arb_remote() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("https"), Just("ssh"), Just("git")],
        "[a-z][a-z0-9-]{0,20}\\.(com|org|io)",
        prop::collection::vec("[A-Za-z0-9_-]{1,12}", 1..4),
    )
        .prop_map(|(scheme, host, segments)| format!("{}://{}/{}", scheme, host, segments.join("/")))
}

fn arb_path() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9_-]{1,10}", 1..4).prop_map(|parts| parts.join("/"))
}

proptest! {
    #[test]
    fn test_mirror_dir_is_pure(url in arb_remote()) {
        let locator = MirrorLocator::new("/cache");
        prop_assert_eq!(locator.mirror_dir(&url), locator.mirror_dir(&url));
        let name = MirrorLocator::dir_name(&url);
        prop_assert!(name.starts_with("git-"));
        prop_assert!(name.ends_with(".git"));
        prop_assert_eq!(name.len(), "git-".len() + 32 + ".git".len());
    }

    #[test]
    fn test_spelling_variants_share_a_mirror(url in arb_remote(), slashes in 0usize..3, dot_git in any::<bool>()) {
        let mut variant = url.clone();
        if dot_git {
            variant.push_str(".git");
        }
        variant.push_str(&"/".repeat(slashes));
        prop_assert_eq!(MirrorLocator::dir_name(&url), MirrorLocator::dir_name(&variant));
    }

    #[test]
    fn test_host_case_does_not_matter(url in arb_remote()) {
        let (scheme, rest) = url.split_once("://").unwrap();
        let (host, path) = rest.split_once('/').unwrap();
        let shouted = format!("{}://{}/{}", scheme.to_uppercase(), host.to_uppercase(), path);
        prop_assert_eq!(MirrorLocator::normalize_url(&url), MirrorLocator::normalize_url(&shouted));
    }

    #[test]
    fn test_normalize_is_idempotent(url in arb_remote()) {
        let once = MirrorLocator::normalize_url(&url);
        prop_assert_eq!(MirrorLocator::normalize_url(&once), once.clone());
    }

    #[test]
    fn test_gitmodules_entries_round_trip(
        entries in prop::collection::btree_map(arb_path(), arb_remote(), 1..5)
    ) {
        let text: String = entries
            .iter()
            .enumerate()
            .map(|(i, (path, url))| {
                format!("[submodule \"m{}\"]\n\tpath = {}\n\turl = {}\n", i, path, url)
            })
            .collect();
        let config = SubmodulesConfig::parse(&text).unwrap();
        prop_assert_eq!(config.entries().len(), entries.len());
        for (path, url) in &entries {
            let entry = config.find(path);
            prop_assert!(entry.is_some());
            prop_assert_eq!(&entry.unwrap().url, url);
        }
    }

    #[test]
    fn test_gitmodules_parse_never_panics(text in "\\PC{0,200}") {
        let _ = SubmodulesConfig::parse(&text);
    }

    #[test]
    fn test_relative_url_stays_on_host(url in arb_remote(), ups in 1usize..6, name in "[a-z]{1,8}") {
        let relative = format!("{}{}", "../".repeat(ups), name);
        let resolved = resolve_submodule_url(&url, &relative);
        let host = url.split("://").nth(1).unwrap().split('/').next().unwrap();
        prop_assert!(resolved.contains(host));
        prop_assert!(resolved.ends_with(&name));
    }

    #[test]
    fn test_revision_parse_accepts_any_full_sha(sha in "[0-9a-f]{40}", stamp in proptest::option::of(0u64..u64::MAX)) {
        let version = match stamp {
            Some(stamp) => format!("{}@{}", sha, stamp),
            None => sha.clone(),
        };
        let oid = Revision::parse(&version).unwrap();
        prop_assert_eq!(oid.to_string(), sha);
    }

    #[test]
    fn test_revision_parse_rejects_short_sha(sha in "[0-9a-f]{1,39}") {
        prop_assert!(Revision::parse(&sha).is_err());
    }
}
