//! File content retrieval at a revision

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::tree;
use memchr::memchr_iter;

/// Bytes inspected when deciding whether content is binary
const BINARY_PROBE: usize = 8000;

/// Content of `path` at `version` of the context's root.
///
/// Reads through submodules the root's policy flattens. Fails with
/// `Error::FileNotFound` when nothing readable exists at `path`.
pub fn get_content(ctx: &OperationContext<'_>, path: &str, version: &str) -> Result<Vec<u8>> {
    let commit = ctx.ensure_commit_loaded(version)?;
    let located = tree::lookup(ctx, commit, path, ctx.root().submodule_policy)?.ok_or_else(|| {
        Error::FileNotFound {
            path: path.to_string(),
            revision: version.to_string(),
            repository: ctx.root().debug_info(ctx.root_dir()),
        }
    })?;
    let repo = ctx.repository_at(&located.repository, &located.url)?;
    let bytes = ctx.store().repositories().read_blob(&repo, located.id)?;
    if ctx.root().auto_crlf {
        Ok(to_crlf(bytes))
    } else {
        Ok(bytes)
    }
}

/// Whether content looks binary (a NUL in the first 8000 bytes)
pub fn is_binary(bytes: &[u8]) -> bool {
    memchr::memchr(0, &bytes[..bytes.len().min(BINARY_PROBE)]).is_some()
}

/// Convert lone LF line endings to CRLF; binary content is returned as is
pub fn to_crlf(bytes: Vec<u8>) -> Vec<u8> {
    if is_binary(&bytes) {
        return bytes;
    }
    let lone = memchr_iter(b'\n', &bytes)
        .filter(|&i| i == 0 || bytes[i - 1] != b'\r')
        .count();
    if lone == 0 {
        return bytes;
    }
    let mut out = Vec::with_capacity(bytes.len() + lone);
    let mut start = 0;
    for i in memchr_iter(b'\n', &bytes) {
        if i == 0 || bytes[i - 1] != b'\r' {
            out.extend_from_slice(&bytes[start..i]);
            out.extend_from_slice(b"\r\n");
            start = i + 1;
        }
    }
    out.extend_from_slice(&bytes[start..]);
    out
}
