//! Process-wide and per-root configuration, loadable from YAML

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How mirrors are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Spawn the native `git` executable
    #[default]
    Native,
    /// libgit2 in-process; local and `file://` remotes only
    Embedded,
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "embedded" => Ok(Self::Embedded),
            other => Err(Error::Config(format!(
                "unknown transport '{}', expected native or embedded",
                other
            ))),
        }
    }
}

/// Process-wide settings
///
/// YAML format:
/// ```yaml
/// mirrors_dir: /var/cache/mirrors
/// fixed_submodule_commit_search_depth: 100
/// handle_cache_size: 64
/// git_path: git
/// transport: native
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    /// Root directory holding one bare repository per fetch URL
    pub mirrors_dir: PathBuf,
    /// How many ancestors to inspect for a clean submodule pointer (0 disables)
    pub fixed_submodule_commit_search_depth: u32,
    /// Capacity of the shared handle cache (0 opens a fresh handle every time)
    pub handle_cache_size: usize,
    /// Native git executable
    pub git_path: PathBuf,
    /// Fetch transport
    pub transport: Transport,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            mirrors_dir: PathBuf::from("mirrors"),
            fixed_submodule_commit_search_depth: 100,
            handle_cache_size: 64,
            git_path: PathBuf::from("git"),
            transport: Transport::Native,
        }
    }
}

impl PluginConfig {
    /// Settings with every default except the mirrors root
    pub fn with_mirrors_dir(mirrors_dir: impl Into<PathBuf>) -> Self {
        Self {
            mirrors_dir: mirrors_dir.into(),
            ..Self::default()
        }
    }

    /// Parse settings from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read settings from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }
}

/// How gitlinks are treated when building trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmodulePolicy {
    /// Gitlinks are compared by their recorded commit id
    #[default]
    Ignore,
    /// Submodule trees are flattened recursively
    Checkout,
    /// Only first-level submodules are flattened
    NonRecursiveCheckout,
    /// Like `Checkout`, unresolvable submodules are kept as raw gitlinks
    CheckoutIgnoringErrors,
    /// Like `NonRecursiveCheckout`, unresolvable submodules are kept as raw gitlinks
    NonRecursiveCheckoutIgnoringErrors,
}

impl SubmodulePolicy {
    /// Whether submodule trees are flattened at all
    #[inline]
    pub const fn is_checkout(&self) -> bool {
        !matches!(self, Self::Ignore)
    }

    /// Whether flattening continues below the first level
    #[inline]
    pub const fn is_recursive(&self) -> bool {
        matches!(self, Self::Checkout | Self::CheckoutIgnoringErrors)
    }

    /// Whether submodule resolution errors are swallowed
    #[inline]
    pub const fn ignores_errors(&self) -> bool {
        matches!(
            self,
            Self::CheckoutIgnoringErrors | Self::NonRecursiveCheckoutIgnoringErrors
        )
    }

    /// Same flattening, errors swallowed
    #[inline]
    pub const fn with_errors_ignored(self) -> Self {
        match self {
            Self::Checkout => Self::CheckoutIgnoringErrors,
            Self::NonRecursiveCheckout => Self::NonRecursiveCheckoutIgnoringErrors,
            other => other,
        }
    }

    /// Whether a gitlink at nesting `level` (0 = root repository) gets flattened
    #[inline]
    pub const fn flattens_level(&self, level: usize) -> bool {
        self.is_checkout() && (self.is_recursive() || level == 0)
    }
}

impl FromStr for SubmodulePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "ignore" => Ok(Self::Ignore),
            "checkout" => Ok(Self::Checkout),
            "non_recursive_checkout" => Ok(Self::NonRecursiveCheckout),
            "checkout_ignoring_errors" => Ok(Self::CheckoutIgnoringErrors),
            "non_recursive_checkout_ignoring_errors" => Ok(Self::NonRecursiveCheckoutIgnoringErrors),
            other => Err(Error::Config(format!("unknown submodule policy '{}'", other))),
        }
    }
}

fn default_branch() -> String {
    "master".to_string()
}

/// One logical repository root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsRoot {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Remote the mirror fetches from
    pub fetch_url: String,
    /// Branch tracked by the root
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Gitlink handling
    #[serde(default)]
    pub submodule_policy: SubmodulePolicy,
    /// Convert LF to CRLF in returned content
    #[serde(default)]
    pub auto_crlf: bool,
    /// Mirror directory override; relative paths resolve under the mirrors root
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl VcsRoot {
    /// Root tracking `master` with default policies
    pub fn new(name: impl Into<String>, fetch_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fetch_url: fetch_url.into(),
            branch: default_branch(),
            submodule_policy: SubmodulePolicy::default(),
            auto_crlf: false,
            path: None,
        }
    }

    /// Track another branch
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Use another gitlink policy
    pub fn with_submodule_policy(mut self, policy: SubmodulePolicy) -> Self {
        self.submodule_policy = policy;
        self
    }

    /// Toggle CRLF output conversion
    pub fn with_auto_crlf(mut self, auto_crlf: bool) -> Self {
        self.auto_crlf = auto_crlf;
        self
    }

    /// Override the mirror directory
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Parse a root from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let root: Self = serde_yaml::from_str(yaml)?;
        if root.fetch_url.trim().is_empty() {
            return Err(Error::Config("fetch_url must not be empty".to_string()));
        }
        Ok(root)
    }

    /// ` (dir, url#branch)` suffix for diagnostics
    pub fn debug_info(&self, dir: &Path) -> String {
        format!(" ({}, {}#{})", dir.display(), self.fetch_url, self.branch)
    }
}
