//! Run orchestration.
//!
//! ```text
//! ensure dest root
//!   -> load playlists -> filter
//!   -> build manifest (probe + fingerprint, bounded)
//!   -> sync items (bounded, cancellable)
//!   -> write playlists -> reconcile
//! ```
//!
//! The last two phases run only when the sync was not cancelled; they
//! reason about a fully synced destination.

use crate::cancel::CancellationToken;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::executor::{SyncExecutor, SyncOutcome};
use crate::fingerprint::{FingerprintStore, XattrFingerprintStore};
use crate::fsutil::ensure_dir;
use crate::manifest::{Manifest, SourceItem};
use crate::media::{CodecProbe, CommandNormalizer, Normalizer, ToolProbe};
use crate::playlist::{
    filter_playlists, write_playlists, ExporterCommand, M3uDirectory, PlaylistSource,
};
use crate::reconcile::Reconciler;
use crate::scheduler::{Scheduler, WorkProgress};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Unique tracks in the manifest.
    pub items: usize,
    pub copied: usize,
    pub skipped: usize,
    pub playlists_written: usize,
    /// Removed leftovers, relative to the destination root, in removal order.
    pub removed: Vec<String>,
    pub cancelled: bool,
}

/// Builder for [`MirrorEngine`].
///
/// Every collaborator defaults to the one described by the configuration.
///
/// # Example
///
/// ```rust,ignore
/// let engine = MirrorEngine::builder(config)
///     .with_cancellation(token.clone())
///     .with_progress(progress_tx)
///     .build()?;
/// let report = engine.run().await?;
/// ```
pub struct MirrorEngineBuilder {
    config: MirrorConfig,
    playlists: Option<Arc<dyn PlaylistSource>>,
    probe: Option<Arc<dyn CodecProbe>>,
    normalizer: Option<Arc<dyn Normalizer>>,
    store: Option<Arc<dyn FingerprintStore>>,
    cancel: CancellationToken,
    progress_tx: Option<mpsc::Sender<WorkProgress>>,
}

impl MirrorEngineBuilder {
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            config,
            playlists: None,
            probe: None,
            normalizer: None,
            store: None,
            cancel: CancellationToken::new(),
            progress_tx: None,
        }
    }

    /// Use `source` instead of the configured exporter or playlist directory.
    pub fn with_playlist_source(mut self, source: Arc<dyn PlaylistSource>) -> Self {
        self.playlists = Some(source);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn CodecProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Default: extended attribute named by `attribute_name`.
    pub fn with_fingerprint_store(mut self, store: Arc<dyn FingerprintStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Receive a [`WorkProgress`] after every synced track.
    pub fn with_progress(mut self, tx: mpsc::Sender<WorkProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    fn configured_playlist_source(config: &MirrorConfig) -> Result<Arc<dyn PlaylistSource>> {
        if let Some(exporter) = &config.exporter {
            return Ok(Arc::new(
                ExporterCommand::new(exporter.clone()).with_case_mode(config.case_mode),
            ));
        }
        if let Some(dir) = &config.playlists_dir {
            return Ok(Arc::new(M3uDirectory::new(dir).with_case_mode(config.case_mode)));
        }
        Err(MirrorError::Config {
            message: "either playlists_dir or exporter must be set".to_string(),
        })
    }

    pub fn build(self) -> Result<MirrorEngine> {
        self.config.validate()?;

        let playlists = match self.playlists {
            Some(source) => source,
            None => Self::configured_playlist_source(&self.config)?,
        };
        let probe = self.probe.unwrap_or_else(|| {
            Arc::new(ToolProbe::new(
                self.config.mp3_probe.clone(),
                self.config.mp4_probe.clone(),
            ))
        });
        let normalizer = self
            .normalizer
            .unwrap_or_else(|| Arc::new(CommandNormalizer::new(self.config.normalizer.clone())));
        let store = self.store.unwrap_or_else(|| {
            Arc::new(XattrFingerprintStore::new(self.config.attribute_name.clone()))
        });

        Ok(MirrorEngine {
            config: self.config,
            playlists,
            probe,
            normalizer,
            store,
            cancel: self.cancel,
            progress_tx: self.progress_tx,
        })
    }
}

/// Mirrors the configured playlists into the destination root.
pub struct MirrorEngine {
    config: MirrorConfig,
    playlists: Arc<dyn PlaylistSource>,
    probe: Arc<dyn CodecProbe>,
    normalizer: Arc<dyn Normalizer>,
    store: Arc<dyn FingerprintStore>,
    cancel: CancellationToken,
    progress_tx: Option<mpsc::Sender<WorkProgress>>,
}

impl MirrorEngine {
    pub fn builder(config: MirrorConfig) -> MirrorEngineBuilder {
        MirrorEngineBuilder::new(config)
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Token that stops the run from starting further work.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute one mirror run.
    ///
    /// Returns the first error. A cancelled run is not an error; its report
    /// has `cancelled` set and no playlists or removals.
    pub async fn run(&self) -> Result<RunReport> {
        let config = &self.config;
        ensure_dir(&config.dest_root).map_err(|e| MirrorError::Config {
            message: format!(
                "Cannot create destination root {}: {}",
                config.dest_root.display(),
                e
            ),
        })?;

        let playlists = filter_playlists(self.playlists.load().await?, &config.include_playlists);
        if playlists.is_empty() {
            return Err(MirrorError::Config {
                message: "no playlists to mirror".to_string(),
            });
        }
        info!("Mirroring {} playlists", playlists.len());

        let scheduler = Scheduler::new(config.effective_concurrency())
            .with_cancellation(self.cancel.clone());
        let manifest = match Manifest::build(
            &playlists,
            &config.source_root,
            Arc::clone(&self.probe),
            &scheduler,
            config.case_mode,
        )
        .await
        {
            Ok(manifest) => manifest,
            Err(MirrorError::Cancelled) => {
                warn!("Cancelled while scanning tracks");
                return Ok(RunReport {
                    cancelled: true,
                    ..RunReport::default()
                });
            }
            Err(e) => return Err(e),
        };

        let mut report = RunReport {
            items: manifest.len(),
            ..RunReport::default()
        };

        info!(
            "Syncing {} tracks to {} ({} at a time)",
            manifest.len(),
            config.dest_root.display(),
            scheduler.concurrency()
        );
        let copied = Arc::new(AtomicUsize::new(0));
        let executor = Arc::new(SyncExecutor::new(
            &config.dest_root,
            Arc::clone(&self.store),
            Arc::clone(&self.normalizer),
        ));
        let sync_scheduler = match &self.progress_tx {
            Some(tx) => scheduler.clone().with_progress(tx.clone()),
            None => scheduler.clone(),
        };
        let counter = Arc::clone(&copied);
        let summary = sync_scheduler
            .run(manifest.work_items(), move |item: Arc<SourceItem>| {
                let executor = Arc::clone(&executor);
                let counter = Arc::clone(&counter);
                async move {
                    if executor.sync_item(&item).await? == SyncOutcome::Copied {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok::<(), MirrorError>(())
                }
            })
            .await?;

        report.copied = copied.load(Ordering::Relaxed);
        report.skipped = summary.completed - report.copied;
        if summary.cancelled {
            warn!(
                "Sync cancelled after {} of {} tracks; playlists and cleanup skipped",
                summary.completed, summary.total
            );
            report.cancelled = true;
            return Ok(report);
        }
        info!("Synced: {} copied, {} up to date", report.copied, report.skipped);

        let dest_root = config.dest_root.clone();
        let reconciler = config.reconcile.then(|| {
            let reconciler = Reconciler::new(&config.dest_root)
                .case_mode(config.case_mode)
                .housekeeping(config.housekeeping_files.clone())
                .protect(&config.source_root);
            match &config.playlists_dir {
                Some(dir) => reconciler.protect(dir),
                None => reconciler,
            }
        });
        let (written, removed) = tokio::task::spawn_blocking(move || -> Result<(usize, Vec<String>)> {
            let written = write_playlists(&dest_root, &playlists, &manifest)?;
            let removed = match reconciler {
                Some(reconciler) => {
                    let names: Vec<&str> = playlists.iter().map(|p| p.name.as_str()).collect();
                    reconciler.reconcile(
                        manifest.items().map(|item| item.relative_path.as_str()),
                        &names,
                    )?
                }
                None => Vec::new(),
            };
            Ok((written, removed))
        })
        .await
        .map_err(|e| MirrorError::Other(format!("Finalization task failed: {}", e)))??;

        report.playlists_written = written;
        report.removed = removed;
        info!(
            "Wrote {} playlists, removed {} leftovers",
            report.playlists_written,
            report.removed.len()
        );
        Ok(report)
    }
}
