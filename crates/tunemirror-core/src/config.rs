//! Configuration for tunemirror.
//!
//! Fixed parameters live in the `*Config` unit structs. Everything an operator
//! chooses per installation lives in [`MirrorConfig`], which is read from a
//! JSON file and then overridden by command-line flags.

use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sync engine parameters.
pub struct SyncConfig;

impl SyncConfig {
    /// Extended attribute holding a destination file's fingerprint.
    pub const FINGERPRINT_ATTRIBUTE: &'static str = "user.tunemirror.fingerprint";
    /// Chunk size for hashing and copying (1MB).
    pub const IO_CHUNK_SIZE: usize = 1024 * 1024;
    /// Prefix of in-progress copies inside the destination tree.
    pub const TEMP_PREFIX: &'static str = ".tunemirror-";
    /// Unix mode of mirrored tracks and playlists.
    pub const FILE_MODE: u32 = 0o644;
    /// Concurrency used when the host parallelism cannot be determined.
    pub const FALLBACK_CONCURRENCY: usize = 4;
}

/// Names and locations.
pub struct PathsConfig;

impl PathsConfig {
    pub const CONFIG_DIR_NAME: &'static str = "tunemirror";
    pub const CONFIG_FILENAME: &'static str = "config.json";
    pub const PLAYLIST_EXTENSION: &'static str = "m3u";
    /// OS-generated files ignored when comparing trees.
    pub const HOUSEKEEPING_FILES: &'static [&'static str] = &[".DS_Store"];
}

/// External tool defaults.
pub struct ToolsConfig;

impl ToolsConfig {
    pub const MP3_PROBE: &'static str = "mp3info";
    pub const MP4_PROBE: &'static str = "mp4info";
    pub const NORMALIZER_PROGRAM: &'static str = "nice";
    pub const NORMALIZER_ARGS: &'static [&'static str] =
        &["aacgain", "-r", "-k", "-s", "r", "-d", "9"];
    /// Placeholder replaced with the export directory in exporter arguments.
    pub const OUTPUT_PLACEHOLDER: &'static str = "{output}";
}

/// Returns the host's available parallelism.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(SyncConfig::FALLBACK_CONCURRENCY)
}

/// How destination paths are compared during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    /// Paths differing only in case name the same entry (macOS, FAT, NTFS).
    #[default]
    Insensitive,
    /// Paths are compared byte for byte.
    Sensitive,
}

impl CaseMode {
    /// Normalize a relative path string into a comparison key.
    pub fn key(&self, path: &str) -> String {
        match self {
            CaseMode::Insensitive => path.to_lowercase(),
            CaseMode::Sensitive => path.to_string(),
        }
    }
}

/// An external program and its leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The default loudness normalizer (`nice aacgain ...`).
    pub fn default_normalizer() -> Self {
        Self {
            program: ToolsConfig::NORMALIZER_PROGRAM.to_string(),
            args: ToolsConfig::NORMALIZER_ARGS
                .iter()
                .map(|a| a.to_string())
                .collect(),
        }
    }
}

/// Operator configuration for a mirror run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Root of the source media tree; destination paths are relative to it.
    pub source_root: PathBuf,
    /// Root of the mirrored tree.
    pub dest_root: PathBuf,
    /// Directory holding already exported `.m3u` playlists.
    #[serde(default)]
    pub playlists_dir: Option<PathBuf>,
    /// Program exporting playlists into `{output}`.
    #[serde(default)]
    pub exporter: Option<ToolCommand>,
    /// Playlist names (without extension) to mirror; empty mirrors all.
    #[serde(default)]
    pub include_playlists: Vec<String>,
    /// Ceiling on concurrent work items. Defaults to host parallelism.
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default = "default_attribute")]
    pub attribute_name: String,
    #[serde(default)]
    pub case_mode: CaseMode,
    #[serde(default = "default_housekeeping")]
    pub housekeeping_files: Vec<String>,
    #[serde(default = "ToolCommand::default_normalizer")]
    pub normalizer: ToolCommand,
    /// Program inspecting `.mp3` files.
    #[serde(default = "default_mp3_probe")]
    pub mp3_probe: String,
    /// Program inspecting `.m4a` files.
    #[serde(default = "default_mp4_probe")]
    pub mp4_probe: String,
    /// Remove leftovers after syncing.
    #[serde(default = "default_true")]
    pub reconcile: bool,
}

fn default_attribute() -> String {
    SyncConfig::FINGERPRINT_ATTRIBUTE.to_string()
}

fn default_housekeeping() -> Vec<String> {
    PathsConfig::HOUSEKEEPING_FILES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_mp3_probe() -> String {
    ToolsConfig::MP3_PROBE.to_string()
}

fn default_mp4_probe() -> String {
    ToolsConfig::MP4_PROBE.to_string()
}

fn default_true() -> bool {
    true
}

impl MirrorConfig {
    /// Create a configuration with defaults for everything but the roots.
    pub fn new(source_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
            playlists_dir: None,
            exporter: None,
            include_playlists: Vec::new(),
            concurrency: None,
            attribute_name: default_attribute(),
            case_mode: CaseMode::default(),
            housekeeping_files: default_housekeeping(),
            normalizer: ToolCommand::default_normalizer(),
            mp3_probe: default_mp3_probe(),
            mp4_probe: default_mp4_probe(),
            reconcile: true,
        }
    }

    /// Default configuration file location (`<config dir>/tunemirror/config.json`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(PathsConfig::CONFIG_DIR_NAME)
                .join(PathsConfig::CONFIG_FILENAME)
        })
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| MirrorError::io_with_path(e, path))?;
        serde_json::from_str(&contents).map_err(|e| MirrorError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })
    }

    /// Effective concurrency ceiling.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(default_concurrency).max(1)
    }

    /// Check that the configuration can drive a run.
    ///
    /// The playlist origin is checked by the engine builder.
    pub fn validate(&self) -> Result<()> {
        if self.source_root.as_os_str().is_empty() {
            return Err(MirrorError::Config {
                message: "source_root is not set".to_string(),
            });
        }
        if self.dest_root.as_os_str().is_empty() {
            return Err(MirrorError::Config {
                message: "dest_root is not set".to_string(),
            });
        }
        if self.attribute_name.is_empty() {
            return Err(MirrorError::Config {
                message: "attribute_name must not be empty".to_string(),
            });
        }
        // Reconciliation removes unreferenced entries under dest_root.
        if self.dest_root.starts_with(&self.source_root)
            || self.source_root.starts_with(&self.dest_root)
        {
            return Err(MirrorError::Config {
                message: format!(
                    "source_root {} and dest_root {} must not contain each other",
                    self.source_root.display(),
                    self.dest_root.display()
                ),
            });
        }
        Ok(())
    }
}
