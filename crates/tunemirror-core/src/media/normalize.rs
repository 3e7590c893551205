//! Loudness normalization of destination files.

use crate::config::ToolCommand;
use crate::error::{MirrorError, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Adjusts the loudness of a destination file in place.
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, path: &Path) -> Result<()>;
}

/// Runs an external program with the file path appended to its arguments.
///
/// The default is `nice aacgain -r -k -s r -d 9 <path>`: track gain, clipping
/// prevention, no tag recalculation, +9dB target offset.
#[derive(Debug, Clone)]
pub struct CommandNormalizer {
    command: ToolCommand,
}

impl CommandNormalizer {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &ToolCommand {
        &self.command
    }
}

impl Default for CommandNormalizer {
    fn default() -> Self {
        Self::new(ToolCommand::default_normalizer())
    }
}

#[async_trait]
impl Normalizer for CommandNormalizer {
    async fn normalize(&self, path: &Path) -> Result<()> {
        debug!("Normalizing {}", path.display());
        let output = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(path)
            .output()
            .await
            .map_err(|e| MirrorError::Normalization {
                path: path.to_path_buf(),
                message: format!("failed to run {}: {}", self.command.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MirrorError::Normalization {
                path: path.to_path_buf(),
                message: format!(
                    "{} exited with {}: {}",
                    self.command.program,
                    output.status,
                    stderr.trim()
                ),
            });
        }
        Ok(())
    }
}
