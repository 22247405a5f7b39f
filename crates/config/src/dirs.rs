//! The data directory layout.

use std::{
    fmt::Debug,
    path::{Path, PathBuf},
};

/// Directory for results received by an initiator.
pub const RESULTS_DIR: &str = "processed_images";
/// Processor staging area for incoming content.
pub const STAGING_DIR: &str = "received_images";
/// Style artifacts received by a processor.
pub const STYLES_DIR: &str = "received_styles";
/// The initiator's extracted style artifact.
pub const STYLE_ARTIFACT_FILE: &str = "style.pt";
/// The persisted identity key.
pub const NODE_KEY_FILE: &str = "node.key";
/// The rendezvous bootstrap descriptor.
pub const BOOTSTRAP_FILE: &str = "bootstrap.txt";
/// The optional node config.
pub const CONFIG_FILE: &str = "stylenet.yaml";

/// The default data directory: `<platform data dir>/stylenet`, or the working directory if the
/// platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs_next::data_dir().map(|dir| dir.join("stylenet")).unwrap_or_else(|| PathBuf::from("."))
}

/// Every path a node reads or writes, derived from one root.
pub trait StyleNetDirs: Debug + Send + Sync + 'static {
    /// The data directory.
    fn root(&self) -> &Path;

    /// Where an initiator writes styled results.
    fn results_dir(&self) -> PathBuf {
        self.root().join(RESULTS_DIR)
    }

    /// Where a processor stages incoming content.
    fn staging_dir(&self) -> PathBuf {
        self.root().join(STAGING_DIR)
    }

    /// Where a processor keeps received style artifacts.
    fn styles_dir(&self) -> PathBuf {
        self.root().join(STYLES_DIR)
    }

    /// The initiator's extracted style artifact.
    fn style_artifact_path(&self) -> PathBuf {
        self.root().join(STYLE_ARTIFACT_FILE)
    }

    /// The persisted identity key.
    fn key_path(&self) -> PathBuf {
        self.root().join(NODE_KEY_FILE)
    }

    /// The rendezvous bootstrap descriptor.
    fn bootstrap_path(&self) -> PathBuf {
        self.root().join(BOOTSTRAP_FILE)
    }

    /// The default config file.
    fn config_path(&self) -> PathBuf {
        self.root().join(CONFIG_FILE)
    }

    /// Create the root and every working directory.
    fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [self.results_dir(), self.staging_dir(), self.styles_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

impl StyleNetDirs for PathBuf {
    fn root(&self) -> &Path {
        self.as_path()
    }
}
