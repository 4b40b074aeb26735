//! Error types for mirrorkit-core

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for mirrorkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mirrorkit operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Directory cannot be opened as a repository
    #[error("repository at {} is unusable: {source}", dir.display())]
    Structural {
        /// Repository directory
        dir: PathBuf,
        /// Failure reported by libgit2
        #[source]
        source: git2::Error,
    },

    /// Mirror could not be brought up to date, even after recreating it
    #[error("failed to synchronize mirror {} with {url}: {reason}", dir.display())]
    Sync {
        /// Mirror directory
        dir: PathBuf,
        /// Fetch URL of the mirror
        url: String,
        /// What went wrong
        reason: String,
        /// Last underlying failure, if any
        #[source]
        source: Option<Box<Error>>,
    },

    /// No usable `.gitmodules` entry for a submodule path
    #[error("{reason}: submodule '{path}' at commit {commit} of {repository}")]
    SubmoduleConfig {
        /// Submodule path inside the parent tree
        path: String,
        /// Parent commit
        commit: String,
        /// Parent repository URL
        repository: String,
        /// Why the entry is unusable
        reason: String,
    },

    /// Pinned submodule commit is absent from the submodule repository
    #[error(
        "cannot find commit {pinned} in repository {submodule_url} for submodule '{path}' \
         referenced by commit {parent_commit} of {parent_url}. Forget to push it?"
    )]
    SubmoduleCommitMissing {
        /// Parent repository URL
        parent_url: String,
        /// Parent commit containing the gitlink
        parent_commit: String,
        /// Submodule path inside the parent tree
        path: String,
        /// Resolved submodule fetch URL
        submodule_url: String,
        /// Commit recorded by the gitlink
        pinned: String,
    },

    /// Requested path does not exist at the requested revision
    #[error("file '{path}' not found at revision {revision}{repository}")]
    FileNotFound {
        /// Requested path
        path: String,
        /// Requested revision
        revision: String,
        /// Repository description, ` (dir, url#branch)`
        repository: String,
    },

    /// libgit2 failure with context
    #[error("{context}: {source}")]
    Git {
        /// What was being done
        context: String,
        /// Failure reported by libgit2
        #[source]
        source: git2::Error,
    },

    /// Native git process failed
    #[error("'{command}' command failed.\nexit code: {}\nstderr: {stderr}\nstdout: {stdout}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Command {
        /// Command line as executed
        command: String,
        /// Process exit code, `None` when killed or never started
        exit_code: Option<i32>,
        /// Trimmed stderr
        stderr: String,
        /// Trimmed stdout
        stdout: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Revision string is not a commit id
    #[error("invalid revision '{revision}': {reason}")]
    InvalidRevision {
        /// Revision as given
        revision: String,
        /// Why it was rejected
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking operation exceeded its time limit
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Operation name
        operation: String,
        /// Limit that was exceeded
        timeout: Duration,
    },

    /// Runtime error (Tokio, threading, etc.)
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Error raised inside an operation context
    #[error("{} failed: {source}", capitalize(operation))]
    Operation {
        /// Operation name, e.g. `retrieving content`
        operation: String,
        /// Original error
        #[source]
        source: Box<Error>,
    },
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Error::Git {
            context: "git operation failed".to_string(),
            source: err,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Attach context to libgit2 results.
pub(crate) trait GitContext<T> {
    fn git_context<S: Into<String>>(self, context: impl FnOnce() -> S) -> Result<T>;
}

impl<T> GitContext<T> for std::result::Result<T, git2::Error> {
    fn git_context<S: Into<String>>(self, context: impl FnOnce() -> S) -> Result<T> {
        self.map_err(|source| Error::Git {
            context: context().into(),
            source,
        })
    }
}

/// Fieldless error category for zero-cost pattern matching.
///
/// Single byte representation (`#[repr(u8)]`), `Copy`, no allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    /// Repository unusable
    Structural,
    /// Fetch failed twice
    Sync,
    /// Missing `.gitmodules` entry
    SubmoduleConfig,
    /// Pinned submodule commit absent
    SubmoduleCommitMissing,
    /// Path absent at revision
    FileNotFound,
    /// libgit2 error
    Git,
    /// Native git process error
    Command,
    /// Configuration error
    Config,
    /// Bad revision string
    InvalidRevision,
    /// I/O operation error
    Io,
    /// Time limit exceeded
    Timeout,
    /// Runtime error
    Runtime,
    /// Wrapped by an operation context
    Operation,
}

impl Error {
    /// Category of this error
    #[inline]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::Structural { .. } => ErrorKind::Structural,
            Error::Sync { .. } => ErrorKind::Sync,
            Error::SubmoduleConfig { .. } => ErrorKind::SubmoduleConfig,
            Error::SubmoduleCommitMissing { .. } => ErrorKind::SubmoduleCommitMissing,
            Error::FileNotFound { .. } => ErrorKind::FileNotFound,
            Error::Git { .. } => ErrorKind::Git,
            Error::Command { .. } => ErrorKind::Command,
            Error::Config(_) => ErrorKind::Config,
            Error::InvalidRevision { .. } => ErrorKind::InvalidRevision,
            Error::Io(_) => ErrorKind::Io,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Runtime(_) => ErrorKind::Runtime,
            Error::Operation { .. } => ErrorKind::Operation,
        }
    }

    /// The error beneath any operation-context wrapping.
    pub fn innermost(&self) -> &Error {
        let mut err = self;
        while let Error::Operation { source, .. } = err {
            err = source;
        }
        err
    }

    /// Whether this error is confined to a single submodule path.
    ///
    /// Such errors do not abort a change computation over sibling paths.
    pub fn is_submodule_error(&self) -> bool {
        matches!(
            self.innermost().kind(),
            ErrorKind::SubmoduleConfig | ErrorKind::SubmoduleCommitMissing | ErrorKind::Sync
        )
    }
}
