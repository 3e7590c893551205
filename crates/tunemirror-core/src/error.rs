//! Error types for the mirroring engine.
//!
//! Every failure carries enough context (usually the path involved) to be
//! reported to the operator without further lookup.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for tunemirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to walk {path:?}: {message}")]
    Walk {
        message: String,
        path: Option<PathBuf>,
    },

    // Fingerprint errors
    #[error("Failed to read fingerprint of {path}: {source}")]
    FingerprintRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write fingerprint of {path}: {source}")]
    FingerprintWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Track errors
    #[error("Track {path} is outside the source root {root}")]
    SourceOutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Tracks {first} and {second} both map to destination {destination}")]
    DestinationCollision {
        first: PathBuf,
        second: PathBuf,
        destination: String,
    },

    #[error("Codec probe failed for {path}: {message}")]
    Probe { path: PathBuf, message: String },

    #[error("Loudness normalization failed for {path}: {message}")]
    Normalization { path: PathBuf, message: String },

    // Playlist errors
    #[error("Playlist export failed: {message}")]
    Export { message: String },

    #[error("Invalid playlist {name}: {message}")]
    Playlist { name: String, message: String },

    // Reconciliation errors
    #[error("Failed to remove leftover {path}: {source}")]
    Reconcile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation was cancelled")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for tunemirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Where an error stops the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Scoped to a single source item; other items are unaffected.
    Item,
    /// Raised before any work starts.
    Setup,
    /// Raised while removing leftovers.
    Reconcile,
}

impl ErrorScope {
    /// What a rerun will find, for operator-facing reports.
    pub fn describe(&self) -> &'static str {
        match self {
            ErrorScope::Item => "tracks synced before the failure are kept; rerun to resume",
            ErrorScope::Setup => "nothing was synced",
            ErrorScope::Reconcile => "leftovers not yet removed are still in place",
        }
    }
}

impl From<std::io::Error> for MirrorError {
    fn from(err: std::io::Error) -> Self {
        MirrorError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<walkdir::Error> for MirrorError {
    fn from(err: walkdir::Error) -> Self {
        MirrorError::Walk {
            message: err.to_string(),
            path: err.path().map(|p| p.to_path_buf()),
        }
    }
}

impl MirrorError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        MirrorError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Classify where this error stops the run.
    pub fn scope(&self) -> ErrorScope {
        match self {
            MirrorError::Io { .. }
            | MirrorError::FingerprintRead { .. }
            | MirrorError::FingerprintWrite { .. }
            | MirrorError::SourceOutsideRoot { .. }
            | MirrorError::UnsupportedFormat(_)
            | MirrorError::Probe { .. }
            | MirrorError::Normalization { .. }
            | MirrorError::Other(_) => ErrorScope::Item,

            MirrorError::Reconcile { .. } | MirrorError::Walk { .. } => ErrorScope::Reconcile,

            MirrorError::Export { .. }
            | MirrorError::DestinationCollision { .. }
            | MirrorError::Playlist { .. }
            | MirrorError::Config { .. }
            | MirrorError::Cancelled => ErrorScope::Setup,
        }
    }
}
