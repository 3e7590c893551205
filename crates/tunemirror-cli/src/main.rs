//! Tunemirror - mirror playlists into a portable music tree.
//!
//! Reads a JSON configuration (default `<config dir>/tunemirror/config.json`)
//! and applies command-line overrides on top of it.
//!
//! Exit codes: `0` on success, `1` on error, `130` when interrupted.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use tunemirror_core::{
    CancellationToken, CaseMode, ErrorScope, MirrorConfig, MirrorEngine, MirrorError, RunReport,
    WorkProgress,
};

const EXIT_ERROR: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;
/// Log progress every this many tracks.
const PROGRESS_INTERVAL: usize = 50;

#[derive(Parser, Debug)]
#[command(name = "tunemirror", version)]
#[command(about = "Mirror playlists into a portable music tree")]
struct Args {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root of the source media tree
    #[arg(long)]
    source_root: Option<PathBuf>,

    /// Root of the mirrored tree
    #[arg(long)]
    dest: Option<PathBuf>,

    /// Directory of exported .m3u playlists
    #[arg(long)]
    playlists_dir: Option<PathBuf>,

    /// Only mirror this playlist (name without extension); repeatable
    #[arg(short = 'p', long = "playlist")]
    playlists: Vec<String>,

    /// Maximum tracks processed at once (default: available cores)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Compare destination paths case-sensitively
    #[arg(long)]
    case_sensitive: bool,

    /// Keep leftovers in the destination
    #[arg(long)]
    no_reconcile: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn load_config(args: &Args) -> Result<MirrorConfig> {
    let file = args
        .config
        .clone()
        .or_else(|| MirrorConfig::default_path().filter(|path| path.is_file()));

    let mut config = match file {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            MirrorConfig::load(&path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?
        }
        None => {
            let (Some(source_root), Some(dest)) = (&args.source_root, &args.dest) else {
                bail!("--source-root and --dest are required when no configuration file exists");
            };
            MirrorConfig::new(source_root, dest)
        }
    };

    if let Some(source_root) = &args.source_root {
        config.source_root = source_root.clone();
    }
    if let Some(dest) = &args.dest {
        config.dest_root = dest.clone();
    }
    if let Some(dir) = &args.playlists_dir {
        config.playlists_dir = Some(dir.clone());
        config.exporter = None;
    }
    if !args.playlists.is_empty() {
        config.include_playlists = args.playlists.clone();
    }
    if let Some(jobs) = args.jobs {
        config.concurrency = Some(jobs);
    }
    if args.case_sensitive {
        config.case_mode = CaseMode::Sensitive;
    }
    if args.no_reconcile {
        config.reconcile = false;
    }
    Ok(config)
}

fn install_interrupt_handler(token: CancellationToken) {
    let result = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            // Second interrupt: give up on in-flight tracks.
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
        warn!("Interrupted; finishing tracks in progress (press Ctrl-C again to abort)");
        token.cancel();
    });
    if let Err(e) = result {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }
}

async fn log_progress(mut rx: mpsc::Receiver<WorkProgress>) {
    while let Some(progress) = rx.recv().await {
        if progress.completed % PROGRESS_INTERVAL == 0 || progress.completed == progress.total {
            info!("Progress: {}/{}", progress.completed, progress.total);
        }
    }
}

/// Scope of the engine error that ended the run, if any.
fn failure_scope(err: &anyhow::Error) -> Option<ErrorScope> {
    err.downcast_ref::<MirrorError>().map(MirrorError::scope)
}

async fn run(args: Args) -> Result<RunReport> {
    let config = load_config(&args)?;
    info!(
        "Mirroring {} -> {}",
        config.source_root.display(),
        config.dest_root.display()
    );

    let token = CancellationToken::new();
    install_interrupt_handler(token.clone());

    let (progress_tx, progress_rx) = mpsc::channel(64);
    let progress_task = tokio::spawn(log_progress(progress_rx));

    let engine = MirrorEngine::builder(config)
        .with_cancellation(token)
        .with_progress(progress_tx)
        .build()
        .context("Invalid configuration")?;
    let report = engine.run().await;

    // Dropping the engine closes the progress channel.
    drop(engine);
    let _ = progress_task.await;

    Ok(report?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging; RUST_LOG overrides --debug.
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(args).await {
        Ok(report) => {
            info!(
                "Done: {} tracks, {} copied, {} up to date, {} playlists, {} removed",
                report.items,
                report.copied,
                report.skipped,
                report.playlists_written,
                report.removed.len()
            );
            if report.cancelled {
                warn!("Run was interrupted; rerun to finish");
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{:#}", e);
            if let Some(scope) = failure_scope(&e) {
                error!("Run stopped ({:?} error): {}", scope, scope.describe());
            }
            ExitCode::from(EXIT_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("tunemirror").chain(argv.iter().copied()))
    }

    #[test]
    fn test_flags_build_config() {
        let args = parse(&[
            "--source-root",
            "/music",
            "--dest",
            "/mirror",
            "--playlists-dir",
            "/lists",
            "-p",
            "BEST",
            "--jobs",
            "2",
            "--case-sensitive",
            "--no-reconcile",
        ]);
        assert!(args.config.is_none());

        let config = load_config(&args).unwrap();
        assert_eq!(config.source_root, PathBuf::from("/music"));
        assert_eq!(config.dest_root, PathBuf::from("/mirror"));
        assert_eq!(config.playlists_dir, Some(PathBuf::from("/lists")));
        assert_eq!(config.include_playlists, vec!["BEST".to_string()]);
        assert_eq!(config.concurrency, Some(2));
        assert_eq!(config.case_mode, CaseMode::Sensitive);
        assert!(!config.reconcile);
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"source_root": "/music", "dest_root": "/mirror",
                "exporter": {"program": "export-playlists"}}"#,
        )
        .unwrap();

        let args = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--dest",
            "/other",
            "--playlists-dir",
            "/lists",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.source_root, PathBuf::from("/music"));
        assert_eq!(config.dest_root, PathBuf::from("/other"));
        assert!(config.exporter.is_none());
        assert_eq!(config.case_mode, CaseMode::Insensitive);
    }

    #[test]
    fn test_failure_scope_sees_through_context() {
        let err = anyhow::Error::new(MirrorError::Config {
            message: "no playlists to mirror".to_string(),
        })
        .context("Invalid configuration");
        assert_eq!(failure_scope(&err), Some(ErrorScope::Setup));

        let err: anyhow::Error = MirrorError::Reconcile {
            path: PathBuf::from("/mirror/old"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert_eq!(failure_scope(&err), Some(ErrorScope::Reconcile));

        assert_eq!(failure_scope(&anyhow::anyhow!("bad flag")), None);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = parse(&["--config", "/nonexistent/tunemirror.json"]);
        assert!(load_config(&args).is_err());
    }
}
