//! The node's configuration file.

use crate::{
    traits::{ConfigFmt, ConfigTrait},
    DirectoryConfig, NetworkConfig, RendezvousConfig, TokensConfig, TransferConfig,
};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};
use tracing::debug;

/// The configuration for every stylenet role.
///
/// Every section is optional in the file. Missing sections and fields use their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Transport settings.
    pub network: NetworkConfig,
    /// Peer directory settings (rendezvous node only).
    pub directory: DirectoryConfig,
    /// Frame limits.
    pub transfer: TransferConfig,
    /// Processor worker settings.
    pub processor: ProcessorConfig,
    /// How the external style engine is invoked.
    pub engine: EngineConfig,
    /// Rendezvous node settings.
    pub rendezvous: RendezvousConfig,
    /// Token accounts enforced by the rendezvous node.
    pub tokens: TokensConfig,
}

impl ConfigTrait for NodeConfig {}

impl NodeConfig {
    /// Load the config at `path`, or use defaults if the file does not exist.
    ///
    /// A missing file is not written back.
    pub fn load_or_default(path: &Path) -> eyre::Result<Self> {
        if path.exists() {
            Self::load_from_path(path, ConfigFmt::from_path(path))
        } else {
            debug!(target: "config", ?path, "no config file - using defaults");
            Ok(Self::default())
        }
    }
}

/// Settings for the processor role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// The number of style engine invocations allowed to run at once.
    pub max_concurrent_jobs: usize,
    /// How long a content job waits for the first style artifact.
    #[serde(with = "humantime_serde")]
    pub style_wait_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { max_concurrent_jobs: 4, style_wait_timeout: Duration::from_secs(30) }
    }
}

/// The external style engine command line.
///
/// Operations are run as `<program> <script> <operation> <paths..>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The interpreter or executable.
    pub program: String,
    /// The script passed as the first argument.
    pub script: PathBuf,
    /// The operation name for style extraction.
    pub extract_operation: String,
    /// The operation name for stylizing a content image.
    pub stylize_operation: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let program = if cfg!(windows) { "python" } else { "python3" };
        Self {
            program: program.to_string(),
            script: PathBuf::from("style_transfer.py"),
            extract_operation: "extract-style".to_string(),
            stylize_operation: "stylize".to_string(),
        }
    }
}
