//! Per-item sync workflow.
//!
//! For one [`SourceItem`]:
//! 1. Skip if the destination's fingerprint matches the source
//! 2. Create the destination directory chain
//! 3. Copy the source into a staging file next to the destination and fsync
//! 4. Normalize loudness on the staged copy unless the format is exempt
//! 5. Rename the staged copy onto the destination
//! 6. Record the fingerprint
//!
//! A failure at any step leaves the previous destination file (if any) and
//! its fingerprint untouched, so the item is retried on the next run.

use crate::detect::needs_sync;
use crate::error::{MirrorError, Result};
use crate::fingerprint::FingerprintStore;
use crate::fsutil::{commit, copy_to_staging, ensure_dir, sync_path};
use crate::manifest::SourceItem;
use crate::media::Normalizer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// What [`SyncExecutor::sync_item`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Copied,
    Skipped,
}

/// Syncs source items into a destination root.
#[derive(Clone)]
pub struct SyncExecutor {
    dest_root: PathBuf,
    store: Arc<dyn FingerprintStore>,
    normalizer: Arc<dyn Normalizer>,
}

impl std::fmt::Debug for SyncExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncExecutor")
            .field("dest_root", &self.dest_root)
            .finish_non_exhaustive()
    }
}

impl SyncExecutor {
    pub fn new(
        dest_root: impl Into<PathBuf>,
        store: Arc<dyn FingerprintStore>,
        normalizer: Arc<dyn Normalizer>,
    ) -> Self {
        Self {
            dest_root: dest_root.into(),
            store,
            normalizer,
        }
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// Bring the destination copy of `item` up to date.
    pub async fn sync_item(&self, item: &SourceItem) -> Result<SyncOutcome> {
        let target = item.dest_path(&self.dest_root);

        let store = Arc::clone(&self.store);
        let (check_target, fingerprint) = (target.clone(), item.fingerprint.clone());
        let needed =
            blocking(move || needs_sync(store.as_ref(), &check_target, &fingerprint)).await?;
        if !needed {
            debug!("Up to date: {}", item.relative_path);
            return Ok(SyncOutcome::Skipped);
        }

        let (source, staging_target) = (item.source_path.clone(), target.clone());
        let staged = blocking(move || {
            if let Some(parent) = staging_target.parent() {
                ensure_dir(parent)?;
            }
            copy_to_staging(&source, &staging_target)
        })
        .await?;

        if item.format().requires_normalization() {
            self.normalizer.normalize(staged.path()).await?;
            let staged_path = staged.path().to_path_buf();
            blocking(move || sync_path(&staged_path)).await?;
        } else {
            debug!("Skipping normalization of {} ({})", item.relative_path, item.format());
        }

        let store = Arc::clone(&self.store);
        let fingerprint = item.fingerprint.clone();
        blocking(move || {
            commit(staged, &target)?;
            store.write(&target, &fingerprint)
        })
        .await?;

        info!("Copied: {}", item.relative_path);
        Ok(SyncOutcome::Copied)
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MirrorError::Other(format!("Blocking sync task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{Fingerprint, MemoryFingerprintStore};
    use crate::media::{AudioFormat, TrackInfo};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingNormalizer {
        calls: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl RecordingNormalizer {
        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Normalizer for RecordingNormalizer {
        async fn normalize(&self, path: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(path.to_path_buf());
            if self.fail {
                return Err(MirrorError::Normalization {
                    path: path.to_path_buf(),
                    message: "exit status: 1".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        _temp: TempDir,
        source_root: PathBuf,
        dest_root: PathBuf,
        store: Arc<MemoryFingerprintStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let source_root = temp.path().join("music");
            let dest_root = temp.path().join("mirror");
            std::fs::create_dir_all(&source_root).unwrap();
            std::fs::create_dir_all(&dest_root).unwrap();
            Self {
                _temp: temp,
                source_root,
                dest_root,
                store: Arc::new(MemoryFingerprintStore::new()),
            }
        }

        fn item(&self, relative: &str, format: AudioFormat, content: &[u8]) -> SourceItem {
            let source_path = self.source_root.join(relative);
            std::fs::create_dir_all(source_path.parent().unwrap()).unwrap();
            std::fs::write(&source_path, content).unwrap();
            SourceItem {
                fingerprint: crate::fingerprint::compute_fingerprint(&source_path).unwrap(),
                source_path,
                relative_path: relative.to_string(),
                info: TrackInfo::new(format),
            }
        }

        fn executor(&self, normalizer: Arc<RecordingNormalizer>) -> SyncExecutor {
            SyncExecutor::new(&self.dest_root, self.store.clone(), normalizer)
        }
    }

    #[tokio::test]
    async fn test_copies_normalizes_and_records() {
        let fixture = Fixture::new();
        let normalizer = Arc::new(RecordingNormalizer::default());
        let executor = fixture.executor(normalizer.clone());
        let item = fixture.item("Artist/A.mp3", AudioFormat::Mp3, b"mp3 data");

        let outcome = executor.sync_item(&item).await.unwrap();

        let dest = fixture.dest_root.join("Artist").join("A.mp3");
        assert_eq!(outcome, SyncOutcome::Copied);
        assert_eq!(std::fs::read(&dest).unwrap(), b"mp3 data");
        assert_eq!(normalizer.count(), 1);
        assert_eq!(fixture.store.read(&dest).unwrap(), Some(item.fingerprint.clone()));
    }

    #[tokio::test]
    async fn test_alac_is_not_normalized() {
        let fixture = Fixture::new();
        let normalizer = Arc::new(RecordingNormalizer::default());
        let executor = fixture.executor(normalizer.clone());
        let item = fixture.item("B.m4a", AudioFormat::Alac, b"alac data");

        assert_eq!(executor.sync_item(&item).await.unwrap(), SyncOutcome::Copied);
        assert_eq!(normalizer.count(), 0);
        assert!(fixture.dest_root.join("B.m4a").exists());
    }

    #[tokio::test]
    async fn test_unchanged_item_is_skipped() {
        let fixture = Fixture::new();
        let normalizer = Arc::new(RecordingNormalizer::default());
        let executor = fixture.executor(normalizer.clone());
        let item = fixture.item("A.mp3", AudioFormat::Mp3, b"mp3 data");

        executor.sync_item(&item).await.unwrap();
        let outcome = executor.sync_item(&item).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(normalizer.count(), 1);
    }

    #[tokio::test]
    async fn test_changed_source_is_recopied() {
        let fixture = Fixture::new();
        let normalizer = Arc::new(RecordingNormalizer::default());
        let executor = fixture.executor(normalizer.clone());
        let item = fixture.item("A.mp3", AudioFormat::Mp3, b"first");
        executor.sync_item(&item).await.unwrap();

        let changed = fixture.item("A.mp3", AudioFormat::Mp3, b"second");
        assert_eq!(executor.sync_item(&changed).await.unwrap(), SyncOutcome::Copied);
        assert_eq!(
            std::fs::read(fixture.dest_root.join("A.mp3")).unwrap(),
            b"second"
        );
        assert_eq!(normalizer.count(), 2);
    }

    #[tokio::test]
    async fn test_failed_normalization_leaves_no_trace() {
        let fixture = Fixture::new();
        let executor = fixture.executor(Arc::new(RecordingNormalizer::failing()));
        let item = fixture.item("Artist/A.mp3", AudioFormat::Mp3, b"mp3 data");

        let result = executor.sync_item(&item).await;

        assert!(matches!(result, Err(MirrorError::Normalization { .. })));
        let dest_dir = fixture.dest_root.join("Artist");
        assert_eq!(std::fs::read_dir(&dest_dir).unwrap().count(), 0);
        assert!(fixture.store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_normalization_keeps_previous_copy() {
        let fixture = Fixture::new();
        let item = fixture.item("A.mp3", AudioFormat::Mp3, b"first");
        fixture
            .executor(Arc::new(RecordingNormalizer::default()))
            .sync_item(&item)
            .await
            .unwrap();

        let changed = fixture.item("A.mp3", AudioFormat::Mp3, b"second");
        let result = fixture
            .executor(Arc::new(RecordingNormalizer::failing()))
            .sync_item(&changed)
            .await;

        assert!(result.is_err());
        let dest = fixture.dest_root.join("A.mp3");
        assert_eq!(std::fs::read(&dest).unwrap(), b"first");
        assert_eq!(fixture.store.read(&dest).unwrap(), Some(item.fingerprint));
        assert_ne!(Some(changed.fingerprint), fixture.store.read(&dest).unwrap());
    }

    #[tokio::test]
    async fn test_missing_source_fails_item() {
        let fixture = Fixture::new();
        let executor = fixture.executor(Arc::new(RecordingNormalizer::default()));
        let item = SourceItem {
            source_path: fixture.source_root.join("gone.mp3"),
            relative_path: "gone.mp3".to_string(),
            fingerprint: Fingerprint::from_hex("h1"),
            info: TrackInfo::new(AudioFormat::Mp3),
        };

        assert!(matches!(
            executor.sync_item(&item).await,
            Err(MirrorError::Io { .. })
        ));
        assert!(!fixture.dest_root.join("gone.mp3").exists());
    }

    struct UnreadableStore;

    impl FingerprintStore for UnreadableStore {
        fn read(&self, path: &Path) -> Result<Option<Fingerprint>> {
            Err(MirrorError::FingerprintRead {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }

        fn write(&self, _path: &Path, _fingerprint: &Fingerprint) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fingerprint_read_fault_fails_item() {
        let fixture = Fixture::new();
        let item = fixture.item("A.mp3", AudioFormat::Mp3, b"new");
        let dest = fixture.dest_root.join("A.mp3");
        std::fs::write(&dest, b"old").unwrap();
        let normalizer = Arc::new(RecordingNormalizer::default());
        let executor = SyncExecutor::new(
            &fixture.dest_root,
            Arc::new(UnreadableStore),
            normalizer.clone(),
        );

        let result = executor.sync_item(&item).await;

        assert!(matches!(result, Err(MirrorError::FingerprintRead { .. })));
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
        assert_eq!(normalizer.count(), 0);
    }
}
