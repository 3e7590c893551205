//! Content fingerprints and their out-of-band storage on destination files.
//!
//! A fingerprint is the SHA-256 of a source file's bytes. After a destination
//! file has been fully written and normalized, the fingerprint of the source
//! it came from is attached to it, so later runs can skip the copy when the
//! source is unchanged.

use crate::config::SyncConfig;
use crate::error::{MirrorError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// SHA-256 of a file's content, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_lowercase())
    }

    /// Parse a stored attribute value. Returns `None` for non-UTF-8 or empty values.
    pub fn from_stored(bytes: &[u8]) -> Option<Self> {
        let value = std::str::from_utf8(bytes).ok()?.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self::from_hex(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a file by streaming its content.
pub fn compute_fingerprint(path: impl AsRef<Path>) -> Result<Fingerprint> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| MirrorError::io_with_path(e, path))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; SyncConfig::IO_CHUNK_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| MirrorError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Fingerprint(hex::encode(hasher.finalize())))
}

/// Persistent per-file fingerprint storage.
///
/// Implementations must be safe to call concurrently for different paths.
pub trait FingerprintStore: Send + Sync {
    /// Read the stored fingerprint. Absence is `Ok(None)`, never an error.
    fn read(&self, path: &Path) -> Result<Option<Fingerprint>>;

    /// Attach a fingerprint to `path`, replacing any previous value.
    fn write(&self, path: &Path, fingerprint: &Fingerprint) -> Result<()>;
}

/// Stores fingerprints in a named extended attribute of the destination file.
#[derive(Debug, Clone)]
pub struct XattrFingerprintStore {
    attribute: String,
}

impl XattrFingerprintStore {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Whether the platform build of `xattr` supports extended attributes at all.
    pub fn is_supported() -> bool {
        xattr::SUPPORTED_PLATFORM
    }
}

impl Default for XattrFingerprintStore {
    fn default() -> Self {
        Self::new(SyncConfig::FINGERPRINT_ATTRIBUTE)
    }
}

/// Faults that mean the disk or its permissions are broken, as opposed to
/// the attribute simply not being there.
fn is_hard_fault(err: &std::io::Error) -> bool {
    if err.kind() == ErrorKind::PermissionDenied {
        return true;
    }
    #[cfg(unix)]
    {
        if err.raw_os_error() == Some(libc::EIO) {
            return true;
        }
    }
    false
}

/// Apply the read policy to a raw attribute lookup on `path`.
///
/// Missing files, missing attributes, unsupported filesystems and malformed
/// values read as absent. Hard faults are errors.
fn interpret_read(
    path: &Path,
    lookup: std::io::Result<Option<Vec<u8>>>,
) -> Result<Option<Fingerprint>> {
    match lookup {
        Ok(Some(bytes)) => {
            let fingerprint = Fingerprint::from_stored(&bytes);
            if fingerprint.is_none() {
                warn!("Ignoring malformed fingerprint on {}", path.display());
            }
            Ok(fingerprint)
        }
        Ok(None) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) if is_hard_fault(&e) => Err(MirrorError::FingerprintRead {
            path: path.to_path_buf(),
            source: e,
        }),
        Err(e) => {
            warn!(
                "Treating unreadable fingerprint on {} as absent: {}",
                path.display(),
                e
            );
            Ok(None)
        }
    }
}

impl FingerprintStore for XattrFingerprintStore {
    fn read(&self, path: &Path) -> Result<Option<Fingerprint>> {
        interpret_read(path, xattr::get(path, &self.attribute))
    }

    fn write(&self, path: &Path, fingerprint: &Fingerprint) -> Result<()> {
        xattr::set(path, &self.attribute, fingerprint.as_str().as_bytes()).map_err(|e| {
            MirrorError::FingerprintWrite {
                path: path.to_path_buf(),
                source: e,
            }
        })
    }
}

/// In-process fingerprint store.
///
/// Records do not survive the process, so every run against a fresh store
/// copies everything once. Useful on destinations without extended attribute
/// support and in tests.
#[derive(Debug, Default)]
pub struct MemoryFingerprintStore {
    records: Mutex<HashMap<PathBuf, Fingerprint>>,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().expect("fingerprint lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FingerprintStore for MemoryFingerprintStore {
    fn read(&self, path: &Path) -> Result<Option<Fingerprint>> {
        let records = self.records.lock().expect("fingerprint lock poisoned");
        Ok(records.get(path).cloned())
    }

    fn write(&self, path: &Path, fingerprint: &Fingerprint) -> Result<()> {
        let mut records = self.records.lock().expect("fingerprint lock poisoned");
        records.insert(path.to_path_buf(), fingerprint.clone());
        Ok(())
    }
}
