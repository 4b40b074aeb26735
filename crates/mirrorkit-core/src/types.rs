//! Core data types for change computation

use chrono::{DateTime, Utc};
use git2::Oid;
use serde::Serialize;

/// Change type for a single path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ChangeType {
    /// Path appeared
    Added = b'A',
    /// Path disappeared
    Deleted = b'D',
    /// Content or mode changed
    Modified = b'M',
    /// Entry kind changed (file, symlink, submodule)
    TypeChanged = b'T',
}

impl ChangeType {
    /// Parse from git diff-filter character - zero allocation
    #[inline]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'A' => Some(Self::Added),
            b'D' => Some(Self::Deleted),
            b'M' => Some(Self::Modified),
            b'T' => Some(Self::TypeChanged),
            _ => None,
        }
    }

    /// Get string representation
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Modified => "modified",
            Self::TypeChanged => "type_changed",
        }
    }
}

/// Kind of a tree entry, derived from its file mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Regular file (`100644`)
    File,
    /// Executable file (`100755`)
    Executable,
    /// Symbolic link (`120000`)
    Symlink,
    /// Gitlink pinning a commit of another repository (`160000`)
    Submodule,
}

impl EntryKind {
    /// Map a raw git file mode; trees yield `None`.
    #[inline]
    pub const fn from_mode(mode: i32) -> Option<Self> {
        match mode {
            0o100644 | 0o100664 => Some(Self::File),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Submodule),
            _ => None,
        }
    }

    /// File and executable differ only in mode; anything else is a type change.
    #[inline]
    pub const fn is_blob_like(&self) -> bool {
        matches!(self, Self::File | Self::Executable)
    }
}

/// A commit, optionally reached through a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRef {
    /// Wanted commit
    pub commit: Oid,
    /// Branch expected to point at it, short or fully qualified
    pub branch: Option<String>,
}

impl RevisionRef {
    /// Reference to a bare commit
    pub fn commit(commit: Oid) -> Self {
        Self {
            commit,
            branch: None,
        }
    }

    /// Reference to a commit on a branch
    pub fn on_branch(commit: Oid, branch: impl Into<String>) -> Self {
        Self {
            commit,
            branch: Some(branch.into()),
        }
    }
}

/// Which side of a change was replaced by a fix-up commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixupSide {
    /// The parent side was broken
    Before,
    /// The commit's own side was broken
    After,
}

/// Substitution applied for a broken submodule pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmoduleFixup {
    /// Path of the broken gitlink
    pub submodule_path: String,
    /// Ancestor commit whose pointer resolves cleanly
    #[serde(serialize_with = "oid_hex")]
    pub commit: Oid,
    /// Side that was replaced
    pub side: FixupSide,
}

/// A single changed path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    /// Path relative to the root repository, through submodules
    pub path: String,
    /// Change type
    pub change_type: ChangeType,
    /// Kind of the entry on the surviving side
    pub entry_kind: EntryKind,
    /// Commit of the root repository providing the "before" side
    #[serde(serialize_with = "oid_hex")]
    pub before_revision: Oid,
    /// Commit of the root repository providing the "after" side
    #[serde(serialize_with = "oid_hex")]
    pub after_revision: Oid,
    /// Object id before, absent for additions
    #[serde(serialize_with = "opt_oid_hex")]
    pub before_object: Option<Oid>,
    /// Object id after, absent for deletions
    #[serde(serialize_with = "opt_oid_hex")]
    pub after_object: Option<Oid>,
    /// Set when a side was taken from a fix-up commit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixup: Option<SubmoduleFixup>,
}

/// One commit of a change walk with its change set
#[derive(Debug, Clone, Serialize)]
pub struct ModificationData {
    /// Commit id
    #[serde(serialize_with = "oid_hex")]
    pub version: Oid,
    /// Parent ids; a single zero id for root commits
    #[serde(serialize_with = "oid_hex_vec")]
    pub parents: Vec<Oid>,
    /// Author name
    pub author: String,
    /// Author email
    pub email: String,
    /// Author time
    pub time: DateTime<Utc>,
    /// Full commit message
    pub message: String,
    /// Changes against the first parent
    pub changes: Vec<ChangeRecord>,
}

impl ModificationData {
    /// Whether the commit has no real parent
    pub fn is_root(&self) -> bool {
        self.parents.len() == 1 && self.parents[0].is_zero()
    }
}

fn oid_hex<S: serde::Serializer>(oid: &Oid, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(oid)
}

fn opt_oid_hex<S: serde::Serializer>(
    oid: &Option<Oid>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    match oid {
        Some(oid) => s.collect_str(oid),
        None => s.serialize_none(),
    }
}

fn oid_hex_vec<S: serde::Serializer>(oids: &[Oid], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_seq(oids.iter().map(|o| o.to_string()))
}
