//! Playlist origins.

use super::{m3u, Playlist};
use crate::config::{CaseMode, PathsConfig, ToolCommand, ToolsConfig};
use crate::error::{MirrorError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Supplies the playlists that define what gets mirrored.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Playlist>>;
}

/// Reads every `.m3u` file below a directory.
#[derive(Debug, Clone)]
pub struct M3uDirectory {
    dir: PathBuf,
    case_mode: CaseMode,
}

impl M3uDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            case_mode: CaseMode::default(),
        }
    }

    /// How playlist names are compared when looking for duplicates.
    pub fn with_case_mode(mut self, case_mode: CaseMode) -> Self {
        self.case_mode = case_mode;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Synchronous variant of [`PlaylistSource::load`].
    ///
    /// Playlists are returned sorted by file name. Two files whose names
    /// compare equal under the case mode are rejected: both would be written
    /// to the same destination file.
    pub fn load_blocking(&self) -> Result<Vec<Playlist>> {
        if !self.dir.is_dir() {
            return Err(MirrorError::Config {
                message: format!("Playlist directory does not exist: {}", self.dir.display()),
            });
        }

        let mut playlists: BTreeMap<String, Playlist> = BTreeMap::new();
        for entry in WalkDir::new(&self.dir).min_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() || !is_playlist_file(entry.path()) {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let bytes =
                std::fs::read(entry.path()).map_err(|e| MirrorError::io_with_path(e, entry.path()))?;
            let playlist = m3u::parse(&name, &String::from_utf8_lossy(&bytes));
            debug!("Read playlist {} ({} entries)", name, playlist.entries.len());

            if playlists.insert(self.case_mode.key(&name), playlist).is_some() {
                return Err(MirrorError::Playlist {
                    name,
                    message: "more than one playlist file has this name".to_string(),
                });
            }
        }

        Ok(playlists.into_values().collect())
    }
}

fn is_playlist_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(PathsConfig::PLAYLIST_EXTENSION))
        .unwrap_or(false)
}

#[async_trait]
impl PlaylistSource for M3uDirectory {
    async fn load(&self) -> Result<Vec<Playlist>> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.load_blocking())
            .await
            .map_err(|e| MirrorError::Other(format!("Playlist loading task failed: {}", e)))?
    }
}

/// Runs an external exporter that writes `.m3u` files, then reads them.
///
/// `{output}` in the arguments is replaced with a fresh temporary directory;
/// if no argument contains it, the directory is appended as last argument.
#[derive(Debug, Clone)]
pub struct ExporterCommand {
    command: ToolCommand,
    case_mode: CaseMode,
}

impl ExporterCommand {
    pub fn new(command: ToolCommand) -> Self {
        Self {
            command,
            case_mode: CaseMode::default(),
        }
    }

    pub fn with_case_mode(mut self, case_mode: CaseMode) -> Self {
        self.case_mode = case_mode;
        self
    }

    fn arguments(&self, output_dir: &Path) -> Vec<String> {
        let output = output_dir.to_string_lossy();
        let mut args: Vec<String> = self
            .command
            .args
            .iter()
            .map(|arg| arg.replace(ToolsConfig::OUTPUT_PLACEHOLDER, &output))
            .collect();
        if !self
            .command
            .args
            .iter()
            .any(|arg| arg.contains(ToolsConfig::OUTPUT_PLACEHOLDER))
        {
            args.push(output.into_owned());
        }
        args
    }
}

#[async_trait]
impl PlaylistSource for ExporterCommand {
    async fn load(&self) -> Result<Vec<Playlist>> {
        let export_dir = TempDir::new().map_err(|e| MirrorError::Export {
            message: format!("Failed to create export directory: {}", e),
        })?;

        info!("Exporting playlists with {}", self.command.program);
        let output = Command::new(&self.command.program)
            .args(self.arguments(export_dir.path()))
            .output()
            .await
            .map_err(|e| MirrorError::Export {
                message: format!("failed to run {}: {}", self.command.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MirrorError::Export {
                message: format!(
                    "{} exited with {}: {}",
                    self.command.program,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        M3uDirectory::new(export_dir.path())
            .with_case_mode(self.case_mode)
            .load()
            .await
    }
}
