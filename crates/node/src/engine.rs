//! The external style engine.
//!
//! Extraction turns a style image into a style artifact. Stylizing applies an artifact to a
//! content image. Both are opaque to the node: paths in, a file or a failure out.

use async_trait::async_trait;
use sn_config::EngineConfig;
use std::{
    path::{Path, PathBuf},
    process::ExitStatus,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Style engine failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The os error.
        #[source]
        source: std::io::Error,
    },
    /// The engine ran and reported failure.
    #[error("{operation} exited with {status}")]
    Failed {
        /// The engine operation.
        operation: String,
        /// The exit status.
        status: ExitStatus,
    },
}

/// The style-transfer computation.
#[async_trait]
pub trait StyleEngine: Send + Sync + 'static {
    /// Extract the style of `style_image` into a new artifact at `output`.
    async fn extract(&self, style_image: &Path, output: &Path) -> Result<(), EngineError>;

    /// Apply the artifact at `style` to `content` and write the styled image to `output`.
    async fn stylize(&self, content: &Path, style: &Path, output: &Path)
        -> Result<(), EngineError>;
}

/// Runs the engine as a child process.
///
/// Invoked as `<program> <script> <operation> <paths..>`. Output streams are inherited and a
/// non-zero exit status is a failure.
#[derive(Debug, Clone)]
pub struct CommandStyleEngine {
    /// The interpreter or executable.
    program: String,
    /// The engine script.
    script: PathBuf,
    /// Operation name for extraction.
    extract_operation: String,
    /// Operation name for stylizing.
    stylize_operation: String,
}

impl CommandStyleEngine {
    /// Create a new instance of Self.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            program: config.program.clone(),
            script: config.script.clone(),
            extract_operation: config.extract_operation.clone(),
            stylize_operation: config.stylize_operation.clone(),
        }
    }

    /// Run one operation to completion.
    async fn run(&self, operation: &str, paths: &[&Path]) -> Result<(), EngineError> {
        let mut command = Command::new(&self.program);
        command.arg(&self.script).arg(operation).args(paths);
        debug!(target: "engine", ?command, "running style engine");

        let status = command.status().await.map_err(|source| EngineError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !status.success() {
            return Err(EngineError::Failed { operation: operation.to_string(), status });
        }

        info!(target: "engine", operation, "style engine finished");
        Ok(())
    }
}

#[async_trait]
impl StyleEngine for CommandStyleEngine {
    async fn extract(&self, style_image: &Path, output: &Path) -> Result<(), EngineError> {
        self.run(&self.extract_operation, &[style_image, output]).await
    }

    async fn stylize(
        &self,
        content: &Path,
        style: &Path,
        output: &Path,
    ) -> Result<(), EngineError> {
        self.run(&self.stylize_operation, &[content, style, output]).await
    }
}
