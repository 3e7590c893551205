//! Copy-or-skip decision for a single destination file.

use crate::error::Result;
use crate::fingerprint::{Fingerprint, FingerprintStore};
use std::path::Path;

/// Whether `dest_path` must be (re)written from a source with `source_fingerprint`.
///
/// A missing destination, a missing or unreadable-as-absent record, or a
/// different record all require a copy. Only hard read faults are returned
/// as errors. Has no side effects.
pub fn needs_sync(
    store: &dyn FingerprintStore,
    dest_path: &Path,
    source_fingerprint: &Fingerprint,
) -> Result<bool> {
    if !dest_path.exists() {
        return Ok(true);
    }

    match store.read(dest_path)? {
        Some(stored) => Ok(&stored != source_fingerprint),
        None => Ok(true),
    }
}
