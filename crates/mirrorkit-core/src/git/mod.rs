//! Git transports and revision helpers

pub mod embedded;
pub mod native;
pub mod revision;

pub use embedded::EmbeddedGit;
pub use native::NativeGit;
pub use revision::{Revision, ALL_BRANCHES_REFSPEC};

use crate::config::{PluginConfig, Transport};
use crate::traits::GitExecutable;

/// Build the transport selected by the configuration
pub fn transport_for(config: &PluginConfig) -> Box<dyn GitExecutable> {
    match config.transport {
        Transport::Native => Box::new(NativeGit::new(config.git_path.clone())),
        Transport::Embedded => Box::new(EmbeddedGit::new()),
    }
}
