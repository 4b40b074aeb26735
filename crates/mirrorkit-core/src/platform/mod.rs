//! Tree path utilities
//!
//! Paths inside trees are always `/`-separated, regardless of the host.

use std::borrow::Cow;

/// Helpers for `/`-separated tree paths
pub struct PathUtil;

impl PathUtil {
    /// Join a parent prefix and a child name
    #[inline]
    pub fn join(prefix: &str, name: &str) -> String {
        if prefix.is_empty() {
            name.to_string()
        } else {
            let mut joined = String::with_capacity(prefix.len() + 1 + name.len());
            joined.push_str(prefix.trim_end_matches('/'));
            joined.push('/');
            joined.push_str(name);
            joined
        }
    }

    /// Split path by any separator (zero-copy iterator)
    #[inline]
    pub fn components(path: &str) -> impl Iterator<Item = &str> {
        path.split(['/', '\\']).filter(|s| !s.is_empty())
    }

    /// Whether `path` is `root` itself or lies below it
    #[inline]
    pub fn is_within(path: &str, root: &str) -> bool {
        path == root
            || (path.len() > root.len()
                && path.starts_with(root)
                && path.as_bytes()[root.len()] == b'/')
    }

    /// Convert path to POSIX format (forward slashes), dropping leading `./` and `/`
    #[inline]
    pub fn to_posix(path: &str) -> Cow<'_, str> {
        let trimmed = path.trim_start_matches("./").trim_start_matches('/');
        if trimmed.contains('\\') {
            Cow::Owned(trimmed.replace('\\', "/"))
        } else {
            Cow::Borrowed(trimmed)
        }
    }
}
