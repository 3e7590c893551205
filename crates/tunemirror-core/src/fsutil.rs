//! Atomic file operations for the destination tree.
//!
//! Files are staged next to their final location:
//! 1. Write to a hidden temp file in the destination directory
//! 2. fsync so the data reaches disk
//! 3. Atomically rename onto the target path
//!
//! A reader never observes a partially written file under its final name. A
//! staged file left behind by a crash is an ordinary leftover and is removed
//! by the next reconciliation.

use crate::config::SyncConfig;
use crate::error::{MirrorError, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Create `dir` and all its ancestors if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| MirrorError::Io {
        message: format!("Failed to create directory {}", dir.display()),
        path: Some(dir.to_path_buf()),
        source: Some(e),
    })
}

/// Create an empty staging file in the directory of `target`.
///
/// The staging file keeps the target's extension so external tools can
/// recognize the format. On Unix it is created world-readable
/// ([`SyncConfig::FILE_MODE`]) instead of tempfile's owner-only default, and
/// the rename keeps that mode.
pub fn staging_file(target: &Path) -> Result<NamedTempFile> {
    let parent = target.parent().ok_or_else(|| MirrorError::Other(format!(
        "Target has no parent directory: {}",
        target.display()
    )))?;
    let suffix = target
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let staged = tempfile::Builder::new()
        .prefix(SyncConfig::TEMP_PREFIX)
        .suffix(&suffix)
        .tempfile_in(parent)
        .map_err(|e| MirrorError::Io {
            message: format!("Failed to create staging file in {}", parent.display()),
            path: Some(parent.to_path_buf()),
            source: Some(e),
        })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        staged
            .as_file()
            .set_permissions(fs::Permissions::from_mode(SyncConfig::FILE_MODE))
            .map_err(|e| MirrorError::io_with_path(e, staged.path()))?;
    }

    Ok(staged)
}

/// Copy `source` into a synced staging file next to `target`.
pub fn copy_to_staging(source: &Path, target: &Path) -> Result<NamedTempFile> {
    let mut input = File::open(source).map_err(|e| MirrorError::io_with_path(e, source))?;
    let mut staged = staging_file(target)?;

    io::copy(&mut input, staged.as_file_mut()).map_err(|e| MirrorError::Io {
        message: format!("Failed to copy {} to {}", source.display(), target.display()),
        path: Some(target.to_path_buf()),
        source: Some(e),
    })?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| MirrorError::io_with_path(e, staged.path()))?;

    Ok(staged)
}

/// Flush a file that was modified in place by another process.
pub fn sync_path(path: &Path) -> Result<()> {
    File::open(path)
        .and_then(|f| f.sync_all())
        .map_err(|e| MirrorError::io_with_path(e, path))
}

/// Atomically move a staged file onto `target`, replacing any existing file.
pub fn commit(staged: NamedTempFile, target: &Path) -> Result<()> {
    staged.persist(target).map_err(|e| MirrorError::Io {
        message: format!("Failed to rename staged file onto {}", target.display()),
        path: Some(target.to_path_buf()),
        source: Some(e.error),
    })?;
    Ok(())
}

/// Write `data` to `path` atomically.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let mut staged = staging_file(path)?;
    staged
        .write_all(data)
        .and_then(|_| staged.flush())
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| MirrorError::Io {
            message: format!("Failed to write staging file for {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })?;

    commit(staged, path)?;
    debug!("Atomically wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_atomic_write_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("BEST.m3u");

        atomic_write(&path, b"#EXTM3U\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"#EXTM3U\n");
        assert_eq!(entries(path.parent().unwrap()), vec!["BEST.m3u"]);
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("BEST.m3u");
        fs::write(&path, b"old").unwrap();

        atomic_write(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_staging_file_keeps_extension() {
        let temp_dir = TempDir::new().unwrap();
        let staged = staging_file(&temp_dir.path().join("song.m4a")).unwrap();
        let name = staged.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(SyncConfig::TEMP_PREFIX));
        assert!(name.ends_with(".m4a"));
    }

    #[test]
    fn test_copy_and_commit() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.mp3");
        fs::write(&source, b"audio bytes").unwrap();
        let target_dir = temp_dir.path().join("out");
        ensure_dir(&target_dir).unwrap();
        let target = target_dir.join("song.mp3");

        let staged = copy_to_staging(&source, &target).unwrap();
        assert!(!target.exists());
        commit(staged, &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"audio bytes");
        assert_eq!(entries(&target_dir), vec!["song.mp3"]);
    }

    #[test]
    fn test_dropped_staging_file_is_removed() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.mp3");
        fs::write(&source, b"audio").unwrap();
        let target_dir = temp_dir.path().join("out");
        ensure_dir(&target_dir).unwrap();

        let staged = copy_to_staging(&source, &target_dir.join("song.mp3")).unwrap();
        drop(staged);
        assert!(entries(&target_dir).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_committed_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.mp3");
        fs::write(&source, b"audio").unwrap();
        let track = temp_dir.path().join("song.mp3");
        let playlist = temp_dir.path().join("BEST.m3u");

        commit(copy_to_staging(&source, &track).unwrap(), &track).unwrap();
        atomic_write(&playlist, b"#EXTM3U\n").unwrap();

        for path in [&track, &playlist] {
            let mode = fs::metadata(path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, SyncConfig::FILE_MODE, "{}", path.display());
        }
    }

    #[test]
    fn test_copy_missing_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = copy_to_staging(
            &temp_dir.path().join("missing.mp3"),
            &temp_dir.path().join("song.mp3"),
        );
        assert!(matches!(result, Err(MirrorError::Io { .. })));
    }
}
