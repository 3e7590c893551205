//! Tunemirror Core - incremental playlist mirroring engine.
//!
//! Mirrors the tracks referenced by a set of playlists from a source media
//! tree into a destination tree (typically a portable player or a synced
//! folder), rewriting file names to a portable character set, normalizing
//! loudness of lossy files, and removing destination entries that no
//! playlist references anymore.
//!
//! Copies are incremental: each destination file carries the SHA-256 of the
//! source it was produced from in an extended attribute, and unchanged
//! sources are skipped on later runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use tunemirror_core::{MirrorConfig, MirrorEngine};
//!
//! #[tokio::main]
//! async fn main() -> tunemirror_core::Result<()> {
//!     let mut config = MirrorConfig::new("/Volumes/Music", "/Volumes/Player/Music");
//!     config.playlists_dir = Some("/Users/me/Playlists".into());
//!
//!     let report = MirrorEngine::builder(config).build()?.run().await?;
//!     println!("{} copied, {} removed", report.copied, report.removed.len());
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod fsutil;
pub mod manifest;
pub mod media;
pub mod naming;
pub mod playlist;
pub mod reconcile;
pub mod scheduler;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use config::{CaseMode, MirrorConfig, ToolCommand};
pub use detect::needs_sync;
pub use engine::{MirrorEngine, MirrorEngineBuilder, RunReport};
pub use error::{ErrorScope, MirrorError, Result};
pub use executor::{SyncExecutor, SyncOutcome};
pub use fingerprint::{
    compute_fingerprint, Fingerprint, FingerprintStore, MemoryFingerprintStore,
    XattrFingerprintStore,
};
pub use manifest::{Manifest, SourceItem};
pub use media::{AudioFormat, CodecProbe, CommandNormalizer, Normalizer, ToolProbe, TrackInfo};
pub use playlist::{Playlist, PlaylistEntry, PlaylistSource};
pub use reconcile::Reconciler;
pub use scheduler::{RunSummary, Scheduler, WorkProgress};
