//! The set of source tracks a run mirrors.
//!
//! A [`Manifest`] is built once per run from the union of all loaded
//! playlists. Every source path appears exactly once, no matter how many
//! playlists reference it, and its [`SourceItem`] is immutable afterwards.

use crate::config::CaseMode;
use crate::error::{MirrorError, Result};
use crate::fingerprint::{compute_fingerprint, Fingerprint};
use crate::media::{AudioFormat, CodecProbe, TrackInfo};
use crate::naming::{sanitize_path, to_slash_path};
use crate::playlist::Playlist;
use crate::scheduler::Scheduler;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// One media file to mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    /// Absolute path of the source file.
    pub source_path: PathBuf,
    /// Sanitized, `/`-separated path relative to the destination root.
    pub relative_path: String,
    pub fingerprint: Fingerprint,
    pub info: TrackInfo,
}

impl SourceItem {
    pub fn format(&self) -> AudioFormat {
        self.info.format
    }

    /// Absolute destination path under `dest_root`.
    pub fn dest_path(&self, dest_root: &Path) -> PathBuf {
        self.relative_path
            .split('/')
            .fold(dest_root.to_path_buf(), |path, part| path.join(part))
    }
}

/// Sanitized destination-relative path of `source` below `source_root`.
pub fn relative_destination(source_root: &Path, source: &Path) -> Result<String> {
    let outside = || MirrorError::SourceOutsideRoot {
        path: source.to_path_buf(),
        root: source_root.to_path_buf(),
    };

    let relative = source.strip_prefix(source_root).map_err(|_| outside())?;
    let slashed = to_slash_path(relative).ok_or_else(outside)?;
    if slashed.is_empty() {
        return Err(outside());
    }
    Ok(sanitize_path(&slashed))
}

/// Build the [`SourceItem`] for one source file: destination path, probe, fingerprint.
pub async fn describe_source(
    source_root: &Path,
    source: PathBuf,
    probe: &dyn CodecProbe,
) -> Result<SourceItem> {
    let relative_path = relative_destination(source_root, &source)?;
    let info = probe.probe(&source).await?;

    let hashed = source.clone();
    let fingerprint = tokio::task::spawn_blocking(move || compute_fingerprint(&hashed))
        .await
        .map_err(|e| MirrorError::Other(format!("Fingerprint task failed: {}", e)))??;

    debug!(
        "{} -> {} ({}, {})",
        source.display(),
        relative_path,
        info.format,
        fingerprint
    );
    Ok(SourceItem {
        source_path: source,
        relative_path,
        fingerprint,
        info,
    })
}

/// Deduplicated source items of a run, keyed by source path.
#[derive(Debug, Default, Clone)]
pub struct Manifest {
    items: BTreeMap<PathBuf, Arc<SourceItem>>,
}

impl Manifest {
    /// Every distinct source path referenced by `playlists`, sorted.
    pub fn unique_sources(playlists: &[Playlist]) -> Vec<PathBuf> {
        playlists
            .iter()
            .flat_map(|playlist| playlist.entries.iter().map(|entry| entry.path.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Assemble a manifest from already described items.
    pub fn from_items(items: impl IntoIterator<Item = SourceItem>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| (item.source_path.clone(), Arc::new(item)))
                .collect(),
        }
    }

    /// Describe every source referenced by `playlists`, through `scheduler`.
    ///
    /// Returns [`MirrorError::Cancelled`] when the scheduler was cancelled
    /// before every source was described; a partial manifest is never
    /// returned.
    pub async fn build(
        playlists: &[Playlist],
        source_root: &Path,
        probe: Arc<dyn CodecProbe>,
        scheduler: &Scheduler,
        case_mode: CaseMode,
    ) -> Result<Self> {
        let sources = Self::unique_sources(playlists);
        info!(
            "Scanning {} tracks from {} playlists",
            sources.len(),
            playlists.len()
        );

        let collected: Arc<Mutex<BTreeMap<PathBuf, Arc<SourceItem>>>> =
            Arc::new(Mutex::new(BTreeMap::new()));
        let root = source_root.to_path_buf();
        let sink = Arc::clone(&collected);
        let summary = scheduler
            .run(sources, move |source: PathBuf| {
                let root = root.clone();
                let probe = Arc::clone(&probe);
                let sink = Arc::clone(&sink);
                async move {
                    let item = describe_source(&root, source, probe.as_ref()).await?;
                    sink.lock()
                        .expect("manifest lock poisoned")
                        .insert(item.source_path.clone(), Arc::new(item));
                    Ok::<(), MirrorError>(())
                }
            })
            .await?;

        if !summary.is_complete() {
            return Err(MirrorError::Cancelled);
        }

        let items = std::mem::take(&mut *collected.lock().expect("manifest lock poisoned"));
        let manifest = Self { items };
        manifest.check_destinations(case_mode)?;
        Ok(manifest)
    }

    /// Fail if two sources map to the same destination under `case_mode`.
    pub fn check_destinations(&self, case_mode: CaseMode) -> Result<()> {
        let mut seen: HashMap<String, &SourceItem> = HashMap::with_capacity(self.items.len());
        for item in self.items.values() {
            let item: &SourceItem = item;
            if let Some(first) = seen.insert(case_mode.key(&item.relative_path), item) {
                return Err(MirrorError::DestinationCollision {
                    first: first.source_path.clone(),
                    second: item.source_path.clone(),
                    destination: item.relative_path.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, source_path: &Path) -> Option<&SourceItem> {
        self.items.get(source_path).map(Arc::as_ref)
    }

    /// Items in source path order.
    pub fn items(&self) -> impl Iterator<Item = &Arc<SourceItem>> {
        self.items.values()
    }

    /// Shared handles to every item, for handing to the scheduler.
    pub fn work_items(&self) -> Vec<Arc<SourceItem>> {
        self.items.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
