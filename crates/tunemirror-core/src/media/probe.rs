//! Codec inspection through `mp3info` / `mp4info`.

use super::{AudioFormat, Container};
use crate::config::ToolsConfig;
use crate::error::{MirrorError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::debug;

/// `mp3info` format string: artist, title, length in seconds, tab separated.
const MP3INFO_FORMAT: &str = r"%a\t%t\t%S";

static MP4_AUDIO_TRACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"audio\s+([^,\n]+),\s*(\d+(?:\.\d+)?) secs").expect("valid mp4 track regex")
});
static MP4_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*Name:\s*(.*?)\s*$").expect("valid mp4 name regex"));
static MP4_ARTIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*Artist:\s*(.*?)\s*$").expect("valid mp4 artist regex"));

/// What a probe learned about a track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub format: AudioFormat,
    pub artist: Option<String>,
    pub title: Option<String>,
    /// Length in seconds.
    pub duration: Option<f64>,
}

impl TrackInfo {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            artist: None,
            title: None,
            duration: None,
        }
    }

    pub fn with_tags(mut self, artist: impl Into<String>, title: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self.title = Some(title.into());
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// `Artist - Title`, when both tags are known.
    pub fn display_title(&self) -> Option<String> {
        match (&self.artist, &self.title) {
            (Some(artist), Some(title)) => Some(format!("{} - {}", artist, title)),
            (None, Some(title)) => Some(title.clone()),
            _ => None,
        }
    }
}

/// Inspects a source track.
#[async_trait]
pub trait CodecProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<TrackInfo>;
}

/// Probe backed by the `mp3info` and `mp4info` command-line tools.
#[derive(Debug, Clone)]
pub struct ToolProbe {
    mp3_program: String,
    mp4_program: String,
}

impl Default for ToolProbe {
    fn default() -> Self {
        Self {
            mp3_program: ToolsConfig::MP3_PROBE.to_string(),
            mp4_program: ToolsConfig::MP4_PROBE.to_string(),
        }
    }
}

impl ToolProbe {
    pub fn new(mp3_program: impl Into<String>, mp4_program: impl Into<String>) -> Self {
        Self {
            mp3_program: mp3_program.into(),
            mp4_program: mp4_program.into(),
        }
    }

    async fn run(&self, program: &str, args: &[&str], path: &Path) -> Result<String> {
        let output = Command::new(program)
            .args(args)
            .arg(path)
            .output()
            .await
            .map_err(|e| MirrorError::Probe {
                path: path.to_path_buf(),
                message: format!("failed to run {program}: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MirrorError::Probe {
                path: path.to_path_buf(),
                message: format!("{program} exited with {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl CodecProbe for ToolProbe {
    async fn probe(&self, path: &Path) -> Result<TrackInfo> {
        let container = Container::from_path(path)
            .ok_or_else(|| MirrorError::UnsupportedFormat(path.to_path_buf()))?;

        let (output, parsed) = match container {
            Container::Mp3 => {
                let output = self
                    .run(&self.mp3_program, &["-p", MP3INFO_FORMAT], path)
                    .await?;
                let parsed = parse_mp3info_output(&output);
                (output, parsed)
            }
            Container::Mp4 => {
                let output = self.run(&self.mp4_program, &[], path).await?;
                let parsed = parse_mp4info_output(&output);
                (output, parsed)
            }
        };

        let info = parsed.ok_or_else(|| MirrorError::Probe {
            path: path.to_path_buf(),
            message: format!("unrecognized output: {}", output.trim()),
        })?;
        debug!("Probed {} as {}", path.display(), info.format);
        Ok(info)
    }
}

/// Parse `mp3info -p "%a\t%t\t%S"` output.
pub fn parse_mp3info_output(output: &str) -> Option<TrackInfo> {
    let mut fields = output.split('\t');
    let artist = fields.next()?.trim();
    let title = fields.next()?.trim();
    let seconds: f64 = fields.next()?.trim().parse().ok()?;

    Some(
        TrackInfo::new(AudioFormat::Mp3)
            .with_tags(artist, title)
            .with_duration(seconds),
    )
}

/// Parse `mp4info` output: the first audio track line plus the Name/Artist tags.
pub fn parse_mp4info_output(output: &str) -> Option<TrackInfo> {
    let track = MP4_AUDIO_TRACK.captures(output)?;
    let format = AudioFormat::from_mp4_codec(&track[1]);
    let seconds: f64 = track[2].parse().ok()?;

    let mut info = TrackInfo::new(format).with_duration(seconds);
    info.title = MP4_NAME.captures(output).map(|c| c[1].to_string());
    info.artist = MP4_ARTIST.captures(output).map(|c| c[1].to_string());
    Some(info)
}
