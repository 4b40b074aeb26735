//! Revision strings and ref names

use crate::error::{Error, Result};
use git2::Oid;

/// Refspec fetching every branch onto the same local name
pub const ALL_BRANCHES_REFSPEC: &str = "+refs/heads/*:refs/heads/*";

/// Parser for version strings handed in by callers
pub struct Revision;

impl Revision {
    /// Commit id of a version string.
    ///
    /// Versions may carry a `@timestamp` suffix (`sha@1700000000000`); only the
    /// part before `@` is significant.
    pub fn parse(version: &str) -> Result<Oid> {
        let sha = Self::version_revision(version);
        if sha.len() != 40 || !sha.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidRevision {
                revision: version.to_string(),
                reason: "expected a full 40-character commit id".to_string(),
            });
        }
        Oid::from_str(sha).map_err(|e| Error::InvalidRevision {
            revision: version.to_string(),
            reason: e.message().to_string(),
        })
    }

    /// Strip a trailing `@...` from a version string
    #[inline]
    pub fn version_revision(version: &str) -> &str {
        let version = version.trim();
        match memchr::memchr(b'@', version.as_bytes()) {
            Some(at) => &version[..at],
            None => version,
        }
    }

    /// Fully qualify a branch name; names under `refs/` are kept as given
    #[inline]
    pub fn expand_ref(name: &str) -> String {
        if name.starts_with("refs/") {
            name.to_string()
        } else {
            format!("refs/heads/{}", name)
        }
    }

    /// Force-update refspec mapping a branch onto the same local ref
    #[inline]
    pub fn branch_refspec(name: &str) -> String {
        let full = Self::expand_ref(name);
        format!("+{}:{}", full, full)
    }

    /// Short hex form for log lines
    #[inline]
    pub fn short(oid: &Oid) -> String {
        let mut hex = oid.to_string();
        hex.truncate(10);
        hex
    }
}
