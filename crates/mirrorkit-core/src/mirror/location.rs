//! Deterministic mirror directory naming
//!
//! A mirror's directory is a pure function of its normalized fetch URL, so
//! no index file is needed to find an existing mirror again.

use crate::config::VcsRoot;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Maps fetch URLs to directories under the mirrors root
#[derive(Debug, Clone)]
pub struct MirrorLocator {
    base: PathBuf,
}

impl MirrorLocator {
    /// Locator rooted at `base`
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base: base.into() }
    }

    /// Mirrors root
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Canonical form of a fetch URL.
    ///
    /// Trailing slashes and a `.git` suffix are dropped, and the scheme and
    /// host are lowercased, so spelling variants of one remote share a mirror.
    pub fn normalize_url(url: &str) -> String {
        let url = strip_suffixes(url);
        let lowered = Self::lowercase_host(url);
        strip_suffixes(&lowered).to_string()
    }

    fn lowercase_host(url: &str) -> String {
        if let Some(scheme_end) = url.find("://") {
            let (scheme, rest) = url.split_at(scheme_end);
            let rest = &rest[3..];
            let (authority, path) = match rest.find('/') {
                Some(slash) => rest.split_at(slash),
                None => (rest, ""),
            };
            let authority = match authority.rfind('@') {
                Some(at) => format!(
                    "{}@{}",
                    &authority[..at],
                    authority[at + 1..].to_ascii_lowercase()
                ),
                None => authority.to_ascii_lowercase(),
            };
            return format!("{}://{}{}", scheme.to_ascii_lowercase(), authority, path);
        }

        // scp-like `user@host:path`
        if let Some(colon) = url.find(':') {
            let host_part = &url[..colon];
            let looks_like_scp = !host_part.contains('/') && host_part.len() > 1;
            if looks_like_scp {
                let host = match host_part.rfind('@') {
                    Some(at) => format!(
                        "{}@{}",
                        &host_part[..at],
                        host_part[at + 1..].to_ascii_lowercase()
                    ),
                    None => host_part.to_ascii_lowercase(),
                };
                return format!("{}{}", host, &url[colon..]);
            }
        }

        url.to_string()
    }

    /// Directory name for a URL: `git-<128-bit sha256 prefix>.git`
    pub fn dir_name(url: &str) -> String {
        let digest = Sha256::digest(Self::normalize_url(url).as_bytes());
        format!("git-{}.git", hex::encode(&digest[..16]))
    }

    /// Mirror directory for a fetch URL
    pub fn mirror_dir(&self, url: &str) -> PathBuf {
        self.base.join(Self::dir_name(url))
    }

    /// Repository directory of a root: its override path, or the URL's mirror
    pub fn repository_dir(&self, root: &VcsRoot) -> PathBuf {
        match &root.path {
            Some(custom) if custom.is_absolute() => custom.clone(),
            Some(custom) => self.base.join(custom),
            None => self.mirror_dir(&root.fetch_url),
        }
    }
}

/// Drop surrounding whitespace, trailing slashes and `.git` suffixes
fn strip_suffixes(url: &str) -> &str {
    let mut url = url.trim();
    loop {
        let before = url.len();
        url = url.trim_end_matches('/').trim_end();
        if let Some(stripped) = url.strip_suffix(".git") {
            url = stripped;
        }
        if url.len() == before {
            return url;
        }
    }
}
