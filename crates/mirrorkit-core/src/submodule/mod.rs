//! Submodule configuration and resolution

pub mod config;
pub mod resolver;

pub use config::{resolve_submodule_url, SubmoduleEntry, SubmodulesConfig};
pub use resolver::{ResolvedSubmodule, SubmoduleResolver};
