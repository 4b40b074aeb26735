//! # mirrorkit core
//!
//! Local mirror cache for remote git repositories, with submodule-aware
//! change computation and content retrieval.
//!
//! - **Mirrors**: one bare repository per fetch URL, fetched only when a
//!   wanted commit is missing and rebuilt from scratch when broken
//! - **Submodules**: gitlinks resolve to commits in their own mirrors and can
//!   be flattened into the parent tree
//! - **History**: lazy topological walks yield per-commit change sets, using
//!   a nearby ancestor when a submodule pointer is temporarily broken
//!
//! ## Example
//!
//! ```no_run
//! use mirrorkit_core::{GitSupport, PluginConfig, SubmodulePolicy, VcsRoot};
//!
//! # fn example() -> mirrorkit_core::Result<()> {
//! let support = GitSupport::new(PluginConfig::with_mirrors_dir("/var/cache/mirrors"));
//! let root = VcsRoot::new("app", "https://example.com/app.git")
//!     .with_branch("main")
//!     .with_submodule_policy(SubmodulePolicy::Checkout);
//!
//! let head = "0123456789abcdef0123456789abcdef01234567";
//! for batch in support.collect_changes(&root, head, None, Some(10))? {
//!     println!("{} changed {} files", batch.version, batch.changes.len());
//! }
//! let readme = support.get_content(&root, "README.md", head)?;
//! println!("{} bytes", readme.len());
//! support.shutdown();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod git;
pub mod history;
pub mod mirror;
pub mod platform;
pub mod runtime;
pub mod submodule;
pub mod support;
pub mod traits;
pub mod tree;
pub mod types;

pub use config::{PluginConfig, SubmodulePolicy, Transport, VcsRoot};
pub use context::OperationContext;
pub use error::{Error, ErrorKind, Result};
pub use mirror::{MirrorLocator, MirrorState, MirrorStore, MirrorSynchronizer};
pub use runtime::run_blocking;
pub use support::GitSupport;
pub use traits::{GitExecutable, RepositoryStore};
pub use types::{
    ChangeRecord, ChangeType, EntryKind, FixupSide, ModificationData, RevisionRef, SubmoduleFixup,
};
